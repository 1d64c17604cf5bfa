// src/exec/work.rs

//! The side-effecting part of a task, detached from the graph.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::TaskError;
use crate::exec::runner::{ActionRequest, ActionRunner};
use crate::fs::FileSystem;

/// What executing a task actually does, produced on the coordinating thread
/// and carried out without access to the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// Nothing to run (e.g. an alias with no action).
    Nothing,
    /// Run an action, on a worker.
    Run(ActionRequest),
    /// Remove files (clean mode).
    Remove { node: String, paths: Vec<PathBuf> },
    /// Print lines to stdout (dry-run mode).
    Print { lines: Vec<String> },
}

impl WorkItem {
    /// Cheap enough to run on the coordinating thread.
    pub fn is_inline(&self) -> bool {
        !matches!(self, WorkItem::Run(_))
    }

    /// Carry out the work on a worker.
    pub async fn run(
        self,
        runner: Arc<dyn ActionRunner>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<(), TaskError> {
        match self {
            WorkItem::Run(req) => {
                let result = runner.run(&req).await;
                if result.success {
                    Ok(())
                } else {
                    Err(TaskError::build(req.node, result.diagnostic))
                }
            }
            other => other.run_inline(fs.as_ref()),
        }
    }

    /// Carry out inline work. Spawned work is rejected as an internal error.
    pub fn run_inline(&self, fs: &dyn FileSystem) -> Result<(), TaskError> {
        match self {
            WorkItem::Nothing => Ok(()),
            WorkItem::Run(req) => Err(TaskError::Internal(format!(
                "action for '{}' cannot run inline",
                req.node
            ))),
            WorkItem::Remove { node, paths } => {
                for path in paths {
                    if !fs.exists(path) {
                        debug!(node = %node, path = ?path, "nothing to remove");
                        continue;
                    }
                    fs.remove(path)
                        .map_err(|e| TaskError::build(node.as_str(), format!("{e:#}")))?;
                    info!(node = %node, path = ?path, "removed");
                    println!("Removed {}", path.display());
                }
                Ok(())
            }
            WorkItem::Print { lines } => {
                for line in lines {
                    println!("{line}");
                }
                Ok(())
            }
        }
    }
}
