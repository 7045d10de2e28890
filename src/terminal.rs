//! Controlling-terminal and session setup.
//!
//! The terminal is a single exclusive resource: exactly one process group
//! receives keystrokes and keyboard signals at a time. Ownership is only
//! ever transferred explicitly, here and in the engine's foreground handoff.

use anyhow::{Context, bail};
use nix::sys::signal::{SigHandler, Signal, killpg, signal};
use nix::sys::termios::{Termios, tcgetattr};
use nix::unistd::{Pid, getpgrp, getpid, isatty, setpgid, tcgetpgrp, tcsetpgrp};
use std::os::unix::io::RawFd;

/// Job-control signals. The shell ignores them for itself; forked children
/// restore the default dispositions before exec.
pub(crate) const JOB_CONTROL_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

/// The shell's own session state: which terminal it controls, its process
/// group, and the baseline terminal modes restored after every foreground
/// job.
#[derive(Debug, Clone)]
pub struct Session {
    /// Descriptor of the controlling terminal.
    pub terminal: RawFd,
    /// The shell's own process group id.
    pub pgid: Pid,
    /// Terminal modes saved at start-up.
    pub tmodes: Option<Termios>,
    /// Whether the shell runs interactively on a real terminal.
    pub interactive: bool,
}

impl Session {
    /// Prepare the shell for job control on `terminal`.
    ///
    /// Only interactive use is supported: a non-tty input is a fatal error.
    /// The shell waits until it is in the foreground of the terminal, puts
    /// itself into its own process group, claims the terminal for it, and
    /// saves the current terminal modes as the baseline.
    pub fn init(terminal: RawFd) -> anyhow::Result<Self> {
        let interactive = isatty(terminal).unwrap_or(false);
        if !interactive {
            bail!("standard input is not a terminal; only interactive use is supported");
        }

        // If another group currently owns the terminal (we were started in
        // the background), SIGTTIN stops us until we are foregrounded.
        loop {
            let pgrp = getpgrp();
            let owner = tcgetpgrp(terminal).context("unable to read the terminal's owner")?;
            if owner == pgrp {
                break;
            }
            killpg(pgrp, Signal::SIGTTIN).context("unable to wait for terminal ownership")?;
        }

        // The shell must not be killed or stopped by keyboard signals meant
        // for its foreground job. SIGCHLD keeps its default: ignoring it
        // would break waitpid.
        for sig in JOB_CONTROL_SIGNALS {
            // Safety: replacing dispositions with SIG_IGN installs no handler
            // that could run re-entrant code.
            unsafe { signal(sig, SigHandler::SigIgn) }
                .with_context(|| format!("unable to ignore {sig}"))?;
        }

        let pgid = getpid();
        setpgid(pgid, pgid).context("unable to put the shell in its own process group")?;
        tcsetpgrp(terminal, pgid).context("unable to claim the terminal")?;

        let tmodes = Some(tcgetattr(terminal).context("unable to read terminal modes")?);

        Ok(Self {
            terminal,
            pgid,
            tmodes,
            interactive,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::{close, pipe};

    #[test]
    fn init_refuses_a_non_terminal_input() {
        let (read_end, write_end) = pipe().expect("pipe");
        let result = Session::init(read_end);
        assert!(result.is_err(), "a pipe is not a controlling terminal");
        let _ = close(read_end);
        let _ = close(write_end);
    }
}
