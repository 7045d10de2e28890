//! Forking and wiring a job's pipeline.

use crate::engine::EngineError;
use crate::job::Job;
use crate::notify::report_job;
use crate::terminal::{JOB_CONTROL_SIGNALS, Session};
use nix::sys::signal::{SigHandler, signal};
use nix::unistd::{ForkResult, Pid, close, dup2, execvp, fork, getpid, pipe, setpgid, tcsetpgrp};
use std::ffi::CString;
use std::os::unix::io::RawFd;
use tracing::debug;

/// Fork and exec every stage of `job`, chaining each stage's stdout to the
/// next stage's stdin. Returns the job's process group id once all stages
/// are launched.
///
/// Pipe or fork failure is unrecoverable resource exhaustion and surfaces
/// as [`EngineError::Fatal`]; a stage that cannot exec terminates only that
/// child. The caller decides whether to wait (foreground) or not.
pub fn launch_job(job: &mut Job, session: &Session, foreground: bool) -> Result<Pid, EngineError> {
    debug!(command = %job.command, foreground, stages = job.processes.len(), "launching job");

    let mut pgid: Option<Pid> = None;
    let mut infile = job.stdin;
    let stage_count = job.processes.len();

    for index in 0..stage_count {
        // All but the last stage write into a fresh pipe; the last stage
        // writes to the job's designated stdout.
        let (outfile, next_infile) = if index + 1 < stage_count {
            let (read_end, write_end) = pipe().map_err(EngineError::Fatal)?;
            (write_end, Some(read_end))
        } else {
            (job.stdout, None)
        };

        // Safety: the child branch only execs or exits; the parent branch
        // does not touch child-owned state.
        match unsafe { fork() }.map_err(EngineError::Fatal)? {
            ForkResult::Child => {
                exec_stage(
                    &job.processes[index].argv,
                    pgid,
                    infile,
                    outfile,
                    job.stderr,
                    foreground,
                    session,
                );
            }
            ForkResult::Parent { child } => {
                job.processes[index].pid = Some(child);
                if session.interactive {
                    // The first child founds the group; everyone else joins
                    // it. Done on both sides of the fork because either may
                    // run first.
                    let group = *pgid.get_or_insert(child);
                    let _ = setpgid(child, group);
                }
            }
        }

        if infile != job.stdin {
            let _ = close(infile);
        }
        if outfile != job.stdout {
            let _ = close(outfile);
        }
        if let Some(fd) = next_infile {
            infile = fd;
        }
    }

    let group = if session.interactive {
        pgid.unwrap_or_else(getpid)
    } else {
        // Without a terminal there is no group to manage; the job is
        // accounted to the shell's own group and waited synchronously.
        getpid()
    };
    job.pgid = Some(group);

    report_job(group, "launched", &job.command);
    Ok(group)
}

/// Child-side half of a stage launch: join the job's process group, take
/// the terminal if foregrounded, restore default signal dispositions, wire
/// up stdio, and exec. Never returns.
fn exec_stage(
    argv: &[String],
    pgid: Option<Pid>,
    infile: RawFd,
    outfile: RawFd,
    errfile: RawFd,
    foreground: bool,
    session: &Session,
) -> ! {
    if session.interactive {
        let pid = getpid();
        let pgid = pgid.unwrap_or(pid);
        let _ = setpgid(pid, pgid);
        if foreground {
            let _ = tcsetpgrp(session.terminal, pgid);
        }

        // The shell ignores these; its children must not.
        for sig in JOB_CONTROL_SIGNALS {
            // Safety: restoring SIG_DFL installs no handler.
            let _ = unsafe { signal(sig, SigHandler::SigDfl) };
        }
        let _ = unsafe { signal(nix::sys::signal::Signal::SIGCHLD, SigHandler::SigDfl) };
    }

    wire_fd(infile, libc::STDIN_FILENO);
    wire_fd(outfile, libc::STDOUT_FILENO);
    wire_fd(errfile, libc::STDERR_FILENO);

    let program = argv.first().cloned().unwrap_or_default();
    let cstrings: Vec<CString> = argv
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<Result<_, _>>()
        .unwrap_or_else(|_| {
            eprintln!("{program}: argument contains an interior NUL byte");
            std::process::exit(1);
        });

    if let Some(path) = cstrings.first() {
        if let Err(err) = execvp(path, &cstrings) {
            eprintln!("{program}: {err}");
        }
    }
    std::process::exit(1);
}

/// Make `src` available as descriptor `dst`, closing the temporary fd.
fn wire_fd(src: RawFd, dst: RawFd) {
    if src != dst {
        dup2(src, dst).expect("failed dup2");
        let _ = close(src);
    }
}
