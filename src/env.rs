use std::env as stdenv;
use std::io;
use std::path::{Path, PathBuf};

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// Unlike a snapshot map, this view writes through to the real process
/// environment: jobs are launched with exec and must inherit whatever
/// `envset` put there. The shell is single-threaded, which is what makes
/// the write-through mutation safe.
#[derive(Debug, Clone)]
pub struct Environment {
    /// The current working directory, mirrored into `PWD`.
    pub current_dir: PathBuf,
    /// When set to true, indicates that the interactive loop should exit.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let env = Self {
            current_dir,
            should_exit: false,
        };
        env.set_var("PWD", env.current_dir.to_string_lossy());
        env
    }

    /// Get the value of an environment variable.
    pub fn get_var(&self, key: &str) -> Option<String> {
        stdenv::var(key).ok()
    }

    /// Set or override an environment variable for the shell and every
    /// child it execs from now on.
    pub fn set_var(&self, key: impl AsRef<str>, val: impl AsRef<str>) {
        // Safety: the shell is single-threaded.
        unsafe { stdenv::set_var(key.as_ref(), val.as_ref()) };
    }

    /// Remove an environment variable.
    pub fn unset_var(&self, key: &str) {
        // Safety: the shell is single-threaded.
        unsafe { stdenv::remove_var(key) };
    }

    /// Change the working directory, keeping `current_dir` and `PWD` in sync.
    pub fn set_current_dir(&mut self, target: &Path) -> io::Result<()> {
        stdenv::set_current_dir(target)?;
        self.current_dir = stdenv::current_dir()?;
        self.set_var("PWD", self.current_dir.to_string_lossy());
        Ok(())
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::env::Environment;

    #[test]
    fn test_env_set_get_and_unset_var() {
        let env = Environment::new();
        let key = "SHELL_JOBS_TEST_VAR_93412";

        // initially absent
        assert_eq!(env.get_var(key), None);

        env.set_var(key, "VALUE");
        assert_eq!(env.get_var(key), Some("VALUE".to_string()));

        env.unset_var(key);
        assert_eq!(env.get_var(key), None);
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
    }

    #[test]
    fn test_pwd_is_populated() {
        let env = Environment::new();
        assert_eq!(
            env.get_var("PWD"),
            Some(env.current_dir.to_string_lossy().into_owned())
        );
    }
}
