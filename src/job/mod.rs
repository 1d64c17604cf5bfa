// src/job/mod.rs

//! Bounded-parallel execution of the taskmaster's tasks.
//!
//! - [`scheduler`] owns the coordinating loop ([`Jobs`]): it is the single
//!   writer of all graph and taskmaster state, while workers only run
//!   [`WorkItem`](crate::exec::WorkItem)s and report back over a channel.

pub mod scheduler;

use crate::errors::TaskError;
use crate::task::TaskId;

pub use scheduler::{BuildOutcome, Jobs};

/// Messages delivered to the coordinating loop.
#[derive(Debug)]
pub enum JobEvent {
    /// A worker finished the work of task `task_id`.
    TaskFinished {
        task_id: TaskId,
        result: Result<(), TaskError>,
    },
    /// Stop dispatching; treat everything in flight as failed.
    InterruptRequested,
}
