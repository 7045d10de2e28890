//! Reporting job transitions to the user and pruning finished jobs.

use crate::job::JobTable;
use crate::status::update_status;
use nix::unistd::Pid;
use tracing::debug;

/// A single user-visible job transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub pgid: Pid,
    pub command: String,
    pub kind: NotificationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Completed,
    Stopped,
}

impl NotificationKind {
    fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Completed => "completed",
            NotificationKind::Stopped => "stopped",
        }
    }
}

/// Drain all available status changes, then report and prune.
pub fn reconcile_and_notify(table: &mut JobTable) {
    update_status(table);
    for notification in scan(table) {
        report_job(
            notification.pgid,
            notification.kind.as_str(),
            &notification.command,
        );
    }
}

/// One pass over the job table.
///
/// Completed jobs are reported and removed; jobs that have newly stopped
/// are reported once and marked notified. Each transition is reported
/// exactly once: completion removes the job, and `notified` suppresses
/// repeat stop reports on later scans.
pub(crate) fn scan(table: &mut JobTable) -> Vec<Notification> {
    let mut notifications = Vec::new();
    let mut index = 0;
    while index < table.len() {
        let job = match table.get_mut(index) {
            Some(job) => job,
            None => break,
        };

        if job.is_completed() {
            let job = table.remove(index);
            debug!(command = %job.command, "job completed, pruned from table");
            if let Some(pgid) = job.pgid {
                notifications.push(Notification {
                    pgid,
                    command: job.command,
                    kind: NotificationKind::Completed,
                });
            }
            // Do not advance: the next job slid into this index.
        } else if job.is_stopped() && !job.notified {
            job.notified = true;
            if let Some(pgid) = job.pgid {
                notifications.push(Notification {
                    pgid,
                    command: job.command.clone(),
                    kind: NotificationKind::Stopped,
                });
            }
            index += 1;
        } else {
            index += 1;
        }
    }
    notifications
}

/// Fixed report format shared by launch and notification output.
pub(crate) fn report_job(pgid: Pid, state: &str, command: &str) {
    eprintln!("{} ({}): {}", pgid, state, command);
}
