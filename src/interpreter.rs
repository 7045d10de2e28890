use crate::builtin::*;
use crate::command::CommandFactory;
use crate::engine::{EngineError, JobControl};
use crate::env::Environment;
use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Write;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports commands defined in this crate, i.e. the built-ins.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// The interactive shell: a prompt loop over the job-control engine.
///
/// Each line is split on whitespace into an argument vector. If the first
/// token names a built-in, the built-in runs in-process; anything else is
/// submitted to the engine as a pipeline of external programs. Before each
/// prompt the engine reconciles child statuses and reports job transitions.
pub struct Interpreter {
    env: Environment,
    engine: JobControl,
    commands: Vec<Box<dyn CommandFactory>>,
}

impl Interpreter {
    /// Set up terminal session state and the built-in command set. Fails
    /// when no controlling terminal is available.
    pub fn new() -> Result<Self> {
        Ok(Self {
            env: Environment::new(),
            engine: JobControl::new()?,
            commands: vec![
                Box::new(Factory::<Cd>::default()),
                Box::new(Factory::<EnvSet>::default()),
                Box::new(Factory::<EnvUnset>::default()),
                Box::new(Factory::<Print>::default()),
                Box::new(Factory::<Pause>::default()),
                Box::new(Factory::<Exit>::default()),
                Box::new(Factory::<Rfg>::default()),
                Box::new(Factory::<Rbg>::default()),
            ],
        })
    }

    /// The read-eval loop. Returns on `exit` or end of input.
    pub fn repl(&mut self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;

        while !self.env.should_exit {
            self.engine.reconcile_and_notify();

            let prompt = format!("{} ==> ", self.pwd());
            match rl.readline(&prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    self.dispatch(&line);
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }

    fn pwd(&self) -> String {
        self.env
            .get_var("PWD")
            .unwrap_or_else(|| self.env.current_dir.to_string_lossy().into_owned())
    }

    /// Run one command line: built-in dispatch first, engine submission
    /// otherwise.
    fn dispatch(&mut self, line: &str) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = tokens.split_first() else {
            return;
        };

        let mut stdout = std::io::stdout();
        for factory in &self.commands {
            if let Some(cmd) = factory.try_create(name, args) {
                if let Err(err) = cmd.execute(&mut stdout, &mut self.env, &mut self.engine) {
                    eprintln!("{name}: {err}");
                }
                let _ = stdout.flush();
                return;
            }
        }

        match self.engine.submit(line, &tokens) {
            Ok(_) => {}
            Err(err @ EngineError::Fatal(_)) => {
                // Pipe or fork failure: nothing sensible left to do.
                eprintln!("shell_jobs: {err}");
                std::process::exit(1);
            }
            Err(err) => eprintln!("{err}"),
        }
    }
}
