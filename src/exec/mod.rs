// src/exec/mod.rs

//! Execution layer.
//!
//! - [`executor`] binds actions to their targets and sources, one executor
//!   per distinct (action, target set).
//! - [`runner`] provides the `ActionRunner` trait and the shell-backed
//!   implementation used in production; tests swap in a fake.
//! - [`work`] is the graph-free unit of work a task hands to a worker.

pub mod executor;
pub mod runner;
pub mod work;

pub use executor::{Action, Executor, ExecutorCache, ExecutorId};
pub use runner::{ActionRequest, ActionResult, ActionRunner, ShellActionRunner};
pub use work::WorkItem;
