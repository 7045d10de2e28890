use nix::sys::termios::Termios;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use std::os::unix::io::RawFd;

/// One OS-level execution unit: a single stage of a pipeline.
///
/// A `Process` is created when the command line is parsed, before any child
/// is forked; `pid` is filled in by the launcher and the status flags are
/// mutated only by the status tracker.
#[derive(Debug, Clone)]
pub struct Process {
    /// Program name and arguments, in exec order (`argv[0]` is the program).
    pub argv: Vec<String>,
    /// Child process id, populated after fork.
    pub pid: Option<Pid>,
    /// True once the process has exited or was killed by a signal.
    pub completed: bool,
    /// True while the process is suspended by a job-control stop.
    pub stopped: bool,
    /// Last wait status reported for this process.
    pub status: Option<WaitStatus>,
}

impl Process {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            pid: None,
            completed: false,
            stopped: false,
            status: None,
        }
    }

    /// Forget any previously reported status, e.g. when the owning job is
    /// resumed and will report fresh statuses.
    pub fn clear_status(&mut self) {
        self.completed = false;
        self.stopped = false;
        self.status = None;
    }
}

/// One user-submitted pipeline, tracked as a unit for foreground/background
/// control.
///
/// Every process of a job shares the job's process group, which equals the
/// pid of the first-forked stage. The job also remembers the terminal modes
/// in effect when it last owned the terminal, so a resumed job gets its own
/// modes back (it may have disabled echo, for instance).
#[derive(Debug, Clone)]
pub struct Job {
    /// Process group id; `None` until the first child is forked.
    pub pgid: Option<Pid>,
    /// Original command line, kept for user-facing reports.
    pub command: String,
    /// Pipeline stages in execution order (stdin-to-stdout chaining).
    pub processes: Vec<Process>,
    /// True once the user has been told the job is stopped.
    pub notified: bool,
    /// Terminal modes to restore when the job returns to the foreground.
    pub tmodes: Option<Termios>,
    /// Standard i/o channels for the pipeline as a whole.
    pub stdin: RawFd,
    pub stdout: RawFd,
    pub stderr: RawFd,
}

impl Job {
    /// Create a job with no stages yet, inheriting the shell's own stdio.
    pub fn new(command: impl Into<String>, tmodes: Option<Termios>) -> Self {
        Self {
            pgid: None,
            command: command.into(),
            processes: Vec::new(),
            notified: false,
            tmodes,
            stdin: libc::STDIN_FILENO,
            stdout: libc::STDOUT_FILENO,
            stderr: libc::STDERR_FILENO,
        }
    }

    /// Append a stage, preserving pipeline order.
    pub fn add_process(&mut self, process: Process) {
        self.processes.push(process);
    }

    /// A job is completed when every stage has completed.
    pub fn is_completed(&self) -> bool {
        self.processes.iter().all(|p| p.completed)
    }

    /// A job is stopped when every stage is completed or stopped and at
    /// least one stage is actually stopped.
    pub fn is_stopped(&self) -> bool {
        self.processes.iter().all(|p| p.completed || p.stopped)
            && self.processes.iter().any(|p| p.stopped)
    }

    /// Reset per-process flags and notification state before the job runs
    /// again. Stale stopped/completed flags from the previous run must not
    /// leak into the new one.
    pub fn prepare_for_resume(&mut self) {
        self.notified = false;
        for p in &mut self.processes {
            p.clear_status();
        }
    }

    pub fn find_process_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.processes.iter_mut().find(|p| p.pid == Some(pid))
    }
}

/// Process-wide collection of active jobs.
///
/// Jobs are kept in submission order. The order carries no semantics, but
/// it must stay stable while the notification scan removes completed
/// entries mid-iteration, which is why removal is index based.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    /// Allocate a new job and append it to the table. Returns the index of
    /// the new entry so the caller can populate its stages.
    pub fn create(&mut self, command: &str, tmodes: Option<Termios>) -> &mut Job {
        self.jobs.push(Job::new(command, tmodes));
        let last = self.jobs.len() - 1;
        &mut self.jobs[last]
    }

    pub fn find_by_pgid(&self, pgid: Pid) -> Option<&Job> {
        self.jobs.iter().find(|j| j.pgid == Some(pgid))
    }

    pub fn find_by_pgid_mut(&mut self, pgid: Pid) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.pgid == Some(pgid))
    }

    /// Locate the process record for a reaped pid across all jobs. Pids are
    /// unique among unreaped children, so at most one record matches.
    pub fn find_process_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.jobs.iter_mut().find_map(|j| j.find_process_mut(pid))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Job> {
        self.jobs.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Job> {
        self.jobs.get_mut(index)
    }

    /// Unlink the job at `index`. Only valid once the job is confirmed
    /// completed; the record and its stages are dropped.
    pub fn remove(&mut self, index: usize) -> Job {
        self.jobs.remove(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with_flags(flags: &[(bool, bool)]) -> Job {
        let mut job = Job::new("test", None);
        for &(completed, stopped) in flags {
            let mut p = Process::new(vec!["prog".to_string()]);
            p.completed = completed;
            p.stopped = stopped;
            job.add_process(p);
        }
        job
    }

    #[test]
    fn job_completed_only_when_every_stage_completed() {
        let job = job_with_flags(&[(true, false), (true, false)]);
        assert!(job.is_completed());
        assert!(!job.is_stopped(), "no stage is stopped");

        let job = job_with_flags(&[(true, false), (false, false)]);
        assert!(!job.is_completed());
        assert!(!job.is_stopped());
    }

    #[test]
    fn job_stopped_requires_all_settled_and_one_stopped() {
        // One stage exited, the other hit a stop signal: the job counts as
        // stopped, never as completed.
        let job = job_with_flags(&[(true, false), (false, true)]);
        assert!(job.is_stopped());
        assert!(!job.is_completed());

        // A stage still running keeps the job running.
        let job = job_with_flags(&[(false, true), (false, false)]);
        assert!(!job.is_stopped());
    }

    #[test]
    fn prepare_for_resume_clears_flags_and_notification() {
        let mut job = job_with_flags(&[(false, true)]);
        job.notified = true;
        job.processes[0].status = Some(WaitStatus::StillAlive);

        job.prepare_for_resume();

        assert!(!job.notified);
        assert!(!job.processes[0].completed);
        assert!(!job.processes[0].stopped);
        assert!(job.processes[0].status.is_none());
    }

    #[test]
    fn table_appends_in_submission_order() {
        let mut table = JobTable::new();
        table.create("first", None).pgid = Some(Pid::from_raw(100));
        table.create("second", None).pgid = Some(Pid::from_raw(200));
        table.create("third", None).pgid = Some(Pid::from_raw(300));

        let commands: Vec<&str> = table.iter().map(|j| j.command.as_str()).collect();
        assert_eq!(commands, vec!["first", "second", "third"]);
    }

    #[test]
    fn table_lookup_by_group_and_by_pid() {
        let mut table = JobTable::new();
        let job = table.create("sleep 10", None);
        job.pgid = Some(Pid::from_raw(500));
        let mut p = Process::new(vec!["sleep".into(), "10".into()]);
        p.pid = Some(Pid::from_raw(501));
        job.add_process(p);

        assert!(table.find_by_pgid(Pid::from_raw(500)).is_some());
        assert!(table.find_by_pgid(Pid::from_raw(999)).is_none());
        assert!(table.find_process_mut(Pid::from_raw(501)).is_some());
        assert!(table.find_process_mut(Pid::from_raw(500)).is_none());
    }

    #[test]
    fn remove_keeps_remaining_order_stable() {
        let mut table = JobTable::new();
        table.create("a", None);
        table.create("b", None);
        table.create("c", None);

        table.remove(1);

        let commands: Vec<&str> = table.iter().map(|j| j.command.as_str()).collect();
        assert_eq!(commands, vec!["a", "c"]);
    }
}
