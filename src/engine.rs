//! The job-control engine: one context object owning the job table and the
//! terminal session, exposing the operations the read-eval loop calls.

use crate::job::{JobTable, Process};
use crate::launch::launch_job;
use crate::notify;
use crate::status::wait_for_job;
use crate::terminal::Session;
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::sys::termios::{SetArg, tcgetattr, tcsetattr};
use nix::unistd::{Pid, tcsetpgrp};
use thiserror::Error;
use tracing::warn;

/// Outcomes of engine operations that the prompt loop reports to the user,
/// plus the one unrecoverable case.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The token sequence does not form a valid pipeline. Rejected before
    /// any process record or child exists.
    #[error("malformed command: check background symbols and pipes")]
    MalformedPipeline,
    /// No active job has the requested process group id.
    #[error("no job with process group {0}")]
    NoSuchJob(Pid),
    /// Foreground resume was requested for a job that is not stopped.
    #[error("job {0} is already running")]
    AlreadyRunning(Pid),
    /// Pipe creation or fork failed. Resource exhaustion is unrecoverable
    /// at this layer; the caller aborts the shell with a diagnostic.
    #[error("unable to launch job: {0}")]
    Fatal(#[source] Errno),
}

/// Whether a validated pipeline should own the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Foreground,
    Background,
}

/// Split a token sequence into per-stage argument vectors.
///
/// A trailing `&` is the only way to request background execution; `|`
/// must sit between two non-empty stages. Anything else is rejected before
/// a single process record is built.
fn parse_pipeline(tokens: &[&str]) -> Result<(Vec<Vec<String>>, Disposition), EngineError> {
    let mut disposition = Disposition::Foreground;
    let mut body = tokens;

    if let Some((&last, rest)) = tokens.split_last() {
        if last == "&" {
            disposition = Disposition::Background;
            body = rest;
        }
    }

    let mut stages = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for &token in body {
        match token {
            // An interior `&` (or a second trailing one) is malformed.
            "&" => return Err(EngineError::MalformedPipeline),
            "|" => {
                if current.is_empty() {
                    return Err(EngineError::MalformedPipeline);
                }
                stages.push(std::mem::take(&mut current));
            }
            word => current.push(word.to_string()),
        }
    }
    if current.is_empty() {
        // Catches empty input, a trailing `|`, and a bare `&`.
        return Err(EngineError::MalformedPipeline);
    }
    stages.push(current);

    Ok((stages, disposition))
}

/// Process-wide job-control state, initialized once at start-up and passed
/// to every engine operation. There is no teardown: the table lives for
/// the process lifetime.
pub struct JobControl {
    pub jobs: JobTable,
    pub session: Session,
}

impl JobControl {
    /// Set up the terminal session and an empty job table. Fails fatally
    /// when not running on a terminal.
    pub fn new() -> anyhow::Result<Self> {
        let session = Session::init(libc::STDIN_FILENO)?;
        Ok(Self {
            jobs: JobTable::new(),
            session,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_session(session: Session) -> Self {
        Self {
            jobs: JobTable::new(),
            session,
        }
    }

    /// Validate `tokens`, build a job from them, launch it, and either wait
    /// for it in the foreground or leave it running in the background.
    /// Returns the new job's process group id.
    pub fn submit(&mut self, command_line: &str, tokens: &[&str]) -> Result<Pid, EngineError> {
        let (stages, disposition) = parse_pipeline(tokens)?;
        let foreground = disposition == Disposition::Foreground;

        // Snapshot the terminal modes at creation time so the job has a
        // sane baseline even before it first owns the terminal.
        let tmodes = tcgetattr(self.session.terminal).ok();
        let job = self.jobs.create(command_line.trim(), tmodes);
        for argv in stages {
            job.add_process(Process::new(argv));
        }

        let pgid = launch_job(job, &self.session, foreground)?;

        if !self.session.interactive {
            wait_for_job(&mut self.jobs, pgid);
        } else if foreground {
            self.put_job_in_foreground(pgid, false);
        } else {
            self.put_job_in_background(pgid, false);
        }
        Ok(pgid)
    }

    /// Resume a stopped job in the foreground. Refuses a job that is not
    /// currently stopped.
    pub fn resume_in_foreground(&mut self, pgid: Pid) -> Result<(), EngineError> {
        let job = self
            .jobs
            .find_by_pgid(pgid)
            .ok_or(EngineError::NoSuchJob(pgid))?;
        if !job.is_stopped() {
            return Err(EngineError::AlreadyRunning(pgid));
        }
        self.put_job_in_foreground(pgid, true);
        Ok(())
    }

    /// Resume a job in the background. Works on stopped jobs; on a running
    /// job the continue signal is a harmless no-op.
    pub fn resume_in_background(&mut self, pgid: Pid) -> Result<(), EngineError> {
        if self.jobs.find_by_pgid(pgid).is_none() {
            return Err(EngineError::NoSuchJob(pgid));
        }
        self.put_job_in_background(pgid, true);
        Ok(())
    }

    /// Report completed and newly stopped jobs, pruning the completed ones.
    /// Called before each prompt.
    pub fn reconcile_and_notify(&mut self) {
        notify::reconcile_and_notify(&mut self.jobs);
    }

    /// Hand the terminal to `pgid` and block until that job stops or
    /// completes, then take the terminal back.
    ///
    /// When `resume` is set the job's saved terminal modes are restored and
    /// the whole group is continued before the wait.
    fn put_job_in_foreground(&mut self, pgid: Pid, resume: bool) {
        let terminal = self.session.terminal;
        if let Some(job) = self.jobs.find_by_pgid_mut(pgid) {
            job.prepare_for_resume();
            let _ = tcsetpgrp(terminal, pgid);
            if resume {
                if let Some(modes) = &job.tmodes {
                    let _ = tcsetattr(terminal, SetArg::TCSADRAIN, modes);
                }
                if let Err(err) = killpg(pgid, Signal::SIGCONT) {
                    warn!("kill (SIGCONT) {pgid}: {err}");
                }
            }
        } else {
            return;
        }

        wait_for_job(&mut self.jobs, pgid);

        // Take the terminal back, remember what the job did to it, and
        // restore the shell's own modes.
        let _ = tcsetpgrp(terminal, self.session.pgid);
        if let Some(job) = self.jobs.find_by_pgid_mut(pgid) {
            job.tmodes = tcgetattr(terminal).ok();
        }
        if let Some(modes) = &self.session.tmodes {
            let _ = tcsetattr(terminal, SetArg::TCSADRAIN, modes);
        }
    }

    /// Let `pgid` run without the terminal. When `resume` is set the group
    /// is sent a continue signal; otherwise there is nothing to do beyond
    /// clearing stale status flags.
    fn put_job_in_background(&mut self, pgid: Pid, resume: bool) {
        if let Some(job) = self.jobs.find_by_pgid_mut(pgid) {
            job.prepare_for_resume();
            if resume {
                if let Err(err) = killpg(pgid, Signal::SIGCONT) {
                    warn!("kill (SIGCONT) {pgid}: {err}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Process;
    use nix::unistd::getpid;

    fn stub_engine() -> JobControl {
        JobControl::with_session(Session {
            terminal: -1,
            pgid: getpid(),
            tmodes: None,
            interactive: true,
        })
    }

    fn stages_of(tokens: &[&str]) -> Vec<Vec<String>> {
        parse_pipeline(tokens).expect("valid pipeline").0
    }

    #[test]
    fn three_stage_pipeline_splits_in_order() {
        let stages = stages_of(&["a", "|", "b", "-x", "|", "c"]);
        assert_eq!(
            stages,
            vec![
                vec!["a".to_string()],
                vec!["b".to_string(), "-x".to_string()],
                vec!["c".to_string()],
            ]
        );
    }

    #[test]
    fn trailing_ampersand_requests_background() {
        let (stages, disposition) = parse_pipeline(&["sleep", "10", "&"]).unwrap();
        assert_eq!(disposition, Disposition::Background);
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0], vec!["sleep".to_string(), "10".to_string()]);

        let (_, disposition) = parse_pipeline(&["sleep", "10"]).unwrap();
        assert_eq!(disposition, Disposition::Foreground);
    }

    #[test]
    fn background_pipeline_is_accepted() {
        let (stages, disposition) = parse_pipeline(&["a", "|", "b", "&"]).unwrap();
        assert_eq!(disposition, Disposition::Background);
        assert_eq!(stages.len(), 2);
    }

    #[test]
    fn malformed_pipelines_are_rejected() {
        for tokens in [
            &["|", "a"][..],
            &["a", "|"][..],
            &["a", "&", "b"][..],
            &["a", "|", "|", "b"][..],
            &["a", "|", "&"][..],
            &["&"][..],
            &[][..],
        ] {
            assert!(
                matches!(parse_pipeline(tokens), Err(EngineError::MalformedPipeline)),
                "expected rejection of {tokens:?}"
            );
        }
    }

    #[test]
    fn submit_rejects_malformed_input_without_creating_a_job() {
        let mut engine = stub_engine();
        let result = engine.submit("| a", &["|", "a"]);
        assert!(matches!(result, Err(EngineError::MalformedPipeline)));
        assert!(engine.jobs.is_empty(), "no job record may exist");
    }

    #[test]
    fn resume_of_unknown_group_has_no_side_effects() {
        let mut engine = stub_engine();
        let missing = Pid::from_raw(424_242);

        assert!(matches!(
            engine.resume_in_foreground(missing),
            Err(EngineError::NoSuchJob(_))
        ));
        assert!(matches!(
            engine.resume_in_background(missing),
            Err(EngineError::NoSuchJob(_))
        ));
        assert!(engine.jobs.is_empty());
    }

    #[test]
    fn foreground_resume_refuses_a_running_job() {
        let mut engine = stub_engine();
        let pgid = Pid::from_raw(777);
        let job = engine.jobs.create("sleep 100", None);
        job.pgid = Some(pgid);
        let mut p = Process::new(vec!["sleep".into(), "100".into()]);
        p.pid = Some(Pid::from_raw(777));
        job.add_process(p);

        assert!(matches!(
            engine.resume_in_foreground(pgid),
            Err(EngineError::AlreadyRunning(_))
        ));
        // The check happens before any flag reset or signal.
        let job = engine.jobs.find_by_pgid(pgid).unwrap();
        assert!(!job.processes[0].completed);
        assert!(!job.processes[0].stopped);
    }
}
