//! A small interactive shell built around a POSIX job-control engine.
//!
//! The heart of the crate is the engine in [`engine`], [`job`], [`launch`],
//! [`status`], [`terminal`] and [`notify`]: pipelines of external programs
//! are forked into their own process group, handed the controlling terminal
//! when they run in the foreground, and tracked through a synchronous
//! status-reconciliation step that turns asynchronous child stop/exit
//! events into job-level state.
//!
//! Everything else is thin glue: the [`Interpreter`] prompt loop reads a
//! line, runs built-ins (`cd`, `envset`, `envunset`, `print`, `pause`,
//! `exit`, `rfg`, `rbg`) in-process, and submits anything else to the
//! engine as a foreground or background job.

mod builtin;
pub mod command;
pub mod engine;
pub mod env;
mod interpreter;
pub mod job;
pub mod launch;
pub mod notify;
pub mod status;
pub mod terminal;

pub use engine::{EngineError, JobControl};
pub use interpreter::Interpreter;
