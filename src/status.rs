//! Reconciliation of asynchronous child-state changes with the job table.
//!
//! Children stop and exit at arbitrary times relative to the shell's single
//! thread. Rather than reacting from a signal handler, the shell observes
//! those changes at defined points through `waitpid` and folds each reported
//! status into the matching process record.

use crate::job::JobTable;
use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tracing::warn;

/// Fold one reported wait status into the matching process record.
///
/// Returns false when there was nothing to record: the status carries no
/// pid, or no tracked job owns that pid. An unknown pid is an anomaly
/// (logged), not an error; the shell keeps going.
pub fn mark_process_status(table: &mut JobTable, status: WaitStatus) -> bool {
    let Some(pid) = status.pid() else {
        return false;
    };

    let Some(process) = table.find_process_mut(pid) else {
        warn!(pid = pid.as_raw(), "wait reported a pid no job is tracking");
        return false;
    };

    process.status = Some(status);
    match status {
        WaitStatus::Stopped(_, _) => process.stopped = true,
        WaitStatus::Signaled(_, signal, _) => {
            process.completed = true;
            eprintln!("{}: terminated by signal {}", pid, signal);
        }
        _ => process.completed = true,
    }
    true
}

/// Non-blocking check for one available status change. Returns false when
/// no child has anything to report (or the report matched no record).
pub fn poll_once(table: &mut JobTable) -> bool {
    match waitpid(None, Some(WaitPidFlag::WUNTRACED | WaitPidFlag::WNOHANG)) {
        Ok(status) => mark_process_status(table, status),
        Err(Errno::ECHILD) => false,
        Err(err) => {
            warn!("waitpid: {err}");
            false
        }
    }
}

/// Drain every currently available status change without blocking.
pub fn update_status(table: &mut JobTable) {
    while poll_once(table) {}
}

/// Block until the job owning `pgid` is stopped or completed, reconciling
/// every status the kernel reports for that process group along the way.
/// Also returns when the group has no more waitable children.
pub fn wait_for_job(table: &mut JobTable, pgid: Pid) {
    loop {
        let status = match waitpid(
            Pid::from_raw(-pgid.as_raw()),
            Some(WaitPidFlag::WUNTRACED),
        ) {
            Ok(status) => status,
            Err(Errno::ECHILD) => break,
            Err(err) => {
                warn!("waitpid({pgid}): {err}");
                break;
            }
        };

        if !mark_process_status(table, status) {
            break;
        }

        match table.find_by_pgid(pgid) {
            Some(job) if !job.is_stopped() && !job.is_completed() => continue,
            _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, Process};
    use nix::sys::signal::Signal;
    use std::os::unix::process::CommandExt;
    use std::process::{Command, Stdio};

    fn table_with_one_process(pid: i32) -> JobTable {
        let mut table = JobTable::new();
        let job = table.create("prog", None);
        job.pgid = Some(Pid::from_raw(pid));
        let mut p = Process::new(vec!["prog".to_string()]);
        p.pid = Some(Pid::from_raw(pid));
        job.add_process(p);
        table
    }

    #[test]
    fn stop_status_marks_stopped_not_completed() {
        let mut table = table_with_one_process(4242);
        let marked =
            mark_process_status(&mut table, WaitStatus::Stopped(Pid::from_raw(4242), Signal::SIGTSTP));
        assert!(marked);
        let job = table.get(0).unwrap();
        assert!(job.processes[0].stopped);
        assert!(!job.processes[0].completed);
    }

    #[test]
    fn exit_and_signal_statuses_mark_completed() {
        let mut table = table_with_one_process(4242);
        assert!(mark_process_status(
            &mut table,
            WaitStatus::Exited(Pid::from_raw(4242), 0)
        ));
        assert!(table.get(0).unwrap().processes[0].completed);

        let mut table = table_with_one_process(4343);
        assert!(mark_process_status(
            &mut table,
            WaitStatus::Signaled(Pid::from_raw(4343), Signal::SIGKILL, false)
        ));
        assert!(table.get(0).unwrap().processes[0].completed);
    }

    #[test]
    fn unknown_pid_is_tolerated() {
        let mut table = table_with_one_process(4242);
        let marked =
            mark_process_status(&mut table, WaitStatus::Exited(Pid::from_raw(999_999), 0));
        assert!(!marked);
        // Existing records are untouched.
        let job = table.get(0).unwrap();
        assert!(!job.processes[0].completed);
        assert!(!job.processes[0].stopped);
    }

    #[test]
    fn blocking_group_wait_drives_a_real_child_to_completion() {
        // Single test that touches waitpid, so a drain here cannot steal
        // another test's child. Spawn into a fresh process group so the
        // group-restricted wait only ever sees this child.
        let mut empty = JobTable::new();
        assert!(!poll_once(&mut empty), "no tracked children yet");

        let child = Command::new("true")
            .process_group(0)
            .stdin(Stdio::null())
            .spawn()
            .expect("spawn true");
        let pid = Pid::from_raw(child.id() as i32);

        let mut table = table_with_one_process(pid.as_raw());
        wait_for_job(&mut table, pid);

        let job = table.find_by_pgid(pid).unwrap();
        assert!(job.is_completed(), "child should have been reaped and marked");
    }
}
