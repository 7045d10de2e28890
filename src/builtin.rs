use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::engine::JobControl;
use crate::env::Environment;
use crate::interpreter::Factory;
use anyhow::Result;
use argh::{EarlyExit, FromArgs};
use nix::sys::termios::{LocalFlags, SetArg, SpecialCharacterIndices, tcgetattr, tcsetattr};
use nix::unistd::{Pid, read};
use std::io::Write;
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed
/// directly in-process. They never become jobs and never appear in the job
/// table.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "print" or "cd".
    fn name() -> &'static str;

    /// Executes the command using the provided output stream, environment,
    /// and job-control engine.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdout: &mut dyn Write,
        env: &mut Environment,
        engine: &mut JobControl,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment,
        engine: &mut JobControl,
    ) -> Result<ExitCode> {
        match BuiltinCommand::execute(*self, stdout, env, engine) {
            Ok(code) => Ok(code),
            Err(e) => {
                writeln!(stdout, "{e}")?;
                Ok(1)
            }
        }
    }
}

/// Carries argh's own usage/error output back through the normal execution
/// path when argument parsing stopped early.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        _env: &mut Environment,
        _engine: &mut JobControl,
    ) -> Result<ExitCode> {
        stdout.write_all(self.output.as_bytes())?;
        Ok(if self.is_error { 1 } else { 0 })
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdout: &mut dyn Write,
        env: &mut Environment,
        _engine: &mut JobControl,
    ) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => {
                if let Some(home) = env.get_var("HOME") {
                    PathBuf::from(home)
                } else {
                    return Err(anyhow::anyhow!("cd: no target and HOME not set"));
                }
            }
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        env.set_current_dir(&new_dir)
            .map_err(|e| anyhow::anyhow!("cd: can't change directory to {}: {e}", new_dir.display()))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Set or create the specified environment variable.
pub struct EnvSet {
    #[argh(positional)]
    /// variable name
    pub name: String,
    #[argh(positional)]
    /// value to assign
    pub value: String,
}

impl BuiltinCommand for EnvSet {
    fn name() -> &'static str {
        "envset"
    }

    fn execute(
        self,
        _stdout: &mut dyn Write,
        env: &mut Environment,
        _engine: &mut JobControl,
    ) -> Result<ExitCode> {
        env.set_var(&self.name, &self.value);
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Clear the specified environment variable.
pub struct EnvUnset {
    #[argh(positional)]
    /// variable name
    pub name: String,
}

impl BuiltinCommand for EnvUnset {
    fn name() -> &'static str {
        "envunset"
    }

    fn execute(
        self,
        stdout: &mut dyn Write,
        env: &mut Environment,
        _engine: &mut JobControl,
    ) -> Result<ExitCode> {
        if env.get_var(&self.name).is_none() {
            writeln!(stdout, "Variable does not exist.")?;
            return Ok(1);
        }
        env.unset_var(&self.name);
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print the provided text.
pub struct Print {
    #[argh(positional, greedy)]
    /// words to print
    pub words: Vec<String>,
}

impl BuiltinCommand for Print {
    fn name() -> &'static str {
        "print"
    }

    fn execute(
        self,
        stdout: &mut dyn Write,
        _env: &mut Environment,
        _engine: &mut JobControl,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.words.join(" "))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdout: &mut dyn Write,
        env: &mut Environment,
        _engine: &mut JobControl,
    ) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Pause the shell until ENTER is pressed.
pub struct Pause {}

impl BuiltinCommand for Pause {
    fn name() -> &'static str {
        "pause"
    }

    fn execute(
        self,
        stdout: &mut dyn Write,
        _env: &mut Environment,
        engine: &mut JobControl,
    ) -> Result<ExitCode> {
        let terminal = engine.session.terminal;
        let saved = tcgetattr(terminal)?;

        // Non-canonical, no-echo reading: one byte at a time, no timeout.
        let mut tattr = saved.clone();
        tattr.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
        tattr.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        tattr.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        tcsetattr(terminal, SetArg::TCSAFLUSH, &tattr)?;

        writeln!(stdout, "Please press ENTER to continue")?;
        stdout.flush()?;

        let mut byte = [0u8; 1];
        loop {
            match read(terminal, &mut byte) {
                Ok(0) => break,
                Ok(_) if byte[0] == b'\n' => break,
                Ok(_) => continue,
                Err(err) => {
                    tcsetattr(terminal, SetArg::TCSANOW, &saved)?;
                    return Err(err.into());
                }
            }
        }

        tcsetattr(terminal, SetArg::TCSANOW, &saved)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Move a stopped job to the foreground and resume it.
pub struct Rfg {
    #[argh(positional)]
    /// process group id of the job, as printed when it was launched
    pub pgid: i32,
}

impl BuiltinCommand for Rfg {
    fn name() -> &'static str {
        "rfg"
    }

    fn execute(
        self,
        stdout: &mut dyn Write,
        _env: &mut Environment,
        engine: &mut JobControl,
    ) -> Result<ExitCode> {
        match engine.resume_in_foreground(Pid::from_raw(self.pgid)) {
            Ok(()) => Ok(0),
            Err(err) => {
                writeln!(stdout, "{err}")?;
                Ok(1)
            }
        }
    }
}

#[derive(FromArgs)]
/// Move a job to the background and resume it.
pub struct Rbg {
    #[argh(positional)]
    /// process group id of the job, as printed when it was launched
    pub pgid: i32,
}

impl BuiltinCommand for Rbg {
    fn name() -> &'static str {
        "rbg"
    }

    fn execute(
        self,
        stdout: &mut dyn Write,
        _env: &mut Environment,
        engine: &mut JobControl,
    ) -> Result<ExitCode> {
        match engine.resume_in_background(Pid::from_raw(self.pgid)) {
            Ok(()) => Ok(0),
            Err(err) => {
                writeln!(stdout, "{err}")?;
                Ok(1)
            }
        }
    }
}
