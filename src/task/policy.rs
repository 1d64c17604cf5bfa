// src/task/policy.rs

//! What "building" a ready node means for one invocation.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::TaskError;
use crate::exec::{ActionRequest, WorkItem};
use crate::node::NodeKind;
use crate::task::Task;
use crate::taskmaster::Taskmaster;
use crate::types::TaskMode;

/// Hooks a [`Task`] delegates to.
///
/// All hooks run on the coordinating thread.
pub trait TaskPolicy: Send + Sync + fmt::Debug {
    fn mode(&self) -> TaskMode;

    /// Decide which targets are out of date and set their states.
    fn make_ready(&self, task: &mut Task, tm: &mut Taskmaster) -> Result<(), TaskError>;

    /// Whether `prepare` verifies that dependencies exist.
    fn checks_dependencies(&self) -> bool {
        true
    }

    fn needs_execute(&self, task: &Task, tm: &Taskmaster) -> bool;

    fn work_item(&self, task: &Task, tm: &mut Taskmaster) -> Result<WorkItem, TaskError>;

    /// Successful completion, or nothing needed doing.
    fn executed(&self, task: &mut Task, tm: &mut Taskmaster) -> Result<(), TaskError>;
}

pub fn policy_for(mode: TaskMode) -> Arc<dyn TaskPolicy> {
    match mode {
        TaskMode::Build => Arc::new(BuildPolicy),
        TaskMode::Clean => Arc::new(CleanPolicy),
        TaskMode::Question => Arc::new(QuestionPolicy),
        TaskMode::DryRun => Arc::new(DryRunPolicy),
    }
}

fn action_request(task: &Task, tm: &Taskmaster) -> Option<ActionRequest> {
    let graph = &tm.graph;
    let command = graph.expanded_command(task.node())?;
    let exec = graph.executor_of(task.node())?;
    Some(ActionRequest {
        node: graph.key(task.node()).to_string(),
        command,
        targets: exec.targets().iter().map(|t| graph.key(*t).to_string()).collect(),
        sources: exec.sources().iter().map(|s| graph.key(*s).to_string()).collect(),
        cwd: graph.root().to_path_buf(),
    })
}

/// Run actions for out-of-date targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildPolicy;

impl TaskPolicy for BuildPolicy {
    fn mode(&self) -> TaskMode {
        TaskMode::Build
    }

    fn make_ready(&self, task: &mut Task, tm: &mut Taskmaster) -> Result<(), TaskError> {
        task.make_ready_current(tm, false);
        Ok(())
    }

    fn needs_execute(&self, task: &Task, _tm: &Taskmaster) -> bool {
        !task.out_of_date().is_empty()
    }

    fn work_item(&self, task: &Task, tm: &mut Taskmaster) -> Result<WorkItem, TaskError> {
        let Some(req) = action_request(task, tm) else {
            return Ok(WorkItem::Nothing);
        };

        // Stale outputs go away first unless they are precious.
        let fs = Arc::clone(&tm.env.fs);
        for t in task.out_of_date() {
            let node = tm.graph.node(*t);
            if node.precious() {
                continue;
            }
            if let Some(path) = node.path() {
                if fs.exists(path) {
                    fs.remove(path)
                        .map_err(|e| TaskError::build(node.key(), format!("{e:#}")))?;
                    debug!(node = %node.key(), "removed stale target before rebuilding");
                }
            }
        }

        Ok(WorkItem::Run(req))
    }

    fn executed(&self, task: &mut Task, tm: &mut Taskmaster) -> Result<(), TaskError> {
        if task.is_top() && task.out_of_date().is_empty() && tm.graph.is_derived(task.node()) {
            let key = tm.graph.key(task.node());
            info!(node = %key, "target is up to date");
            println!("dagbuild: `{key}' is up to date.");
        }
        task.executed_with_callbacks(tm);
        Ok(())
    }
}

/// Remove every derived target.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanPolicy;

impl TaskPolicy for CleanPolicy {
    fn mode(&self) -> TaskMode {
        TaskMode::Clean
    }

    fn make_ready(&self, task: &mut Task, tm: &mut Taskmaster) -> Result<(), TaskError> {
        task.make_ready_all(tm);
        Ok(())
    }

    fn checks_dependencies(&self) -> bool {
        false
    }

    fn needs_execute(&self, _task: &Task, _tm: &Taskmaster) -> bool {
        true
    }

    fn work_item(&self, task: &Task, tm: &mut Taskmaster) -> Result<WorkItem, TaskError> {
        let graph = &tm.graph;
        let mut paths: Vec<PathBuf> = Vec::new();

        for t in task.targets().iter().copied() {
            let node = graph.node(t);
            if node.executor().is_none() {
                continue;
            }
            if node.noclean() || node.precious() {
                debug!(node = %node.key(), "kept by noclean/precious");
                continue;
            }
            let removable = std::iter::once(t).chain(node.side_effects().iter().copied());
            for id in removable {
                if let NodeKind::File { path } = graph.node(id).kind() {
                    if !paths.contains(path) {
                        paths.push(path.clone());
                    }
                }
            }
        }

        if paths.is_empty() {
            return Ok(WorkItem::Nothing);
        }
        Ok(WorkItem::Remove {
            node: graph.key(task.node()).to_string(),
            paths,
        })
    }

    fn executed(&self, task: &mut Task, tm: &mut Taskmaster) -> Result<(), TaskError> {
        task.executed_without_callbacks(tm);
        Ok(())
    }
}

/// Report whether targets are current; never builds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestionPolicy;

impl TaskPolicy for QuestionPolicy {
    fn mode(&self) -> TaskMode {
        TaskMode::Question
    }

    fn make_ready(&self, task: &mut Task, tm: &mut Taskmaster) -> Result<(), TaskError> {
        task.make_ready_current(tm, false);
        Ok(())
    }

    fn checks_dependencies(&self) -> bool {
        false
    }

    fn needs_execute(&self, _task: &Task, _tm: &Taskmaster) -> bool {
        false
    }

    fn work_item(&self, _task: &Task, _tm: &mut Taskmaster) -> Result<WorkItem, TaskError> {
        Ok(WorkItem::Nothing)
    }

    /// The first stale target answers the question; stop there.
    fn executed(&self, task: &mut Task, tm: &mut Taskmaster) -> Result<(), TaskError> {
        let node = task.node();
        let missing_top = task.is_top() && !tm.graph.exists(node, tm.env.fs.as_ref());
        if !task.out_of_date().is_empty() || missing_top {
            let key = tm.graph.key(node).to_string();
            info!(node = %key, "target is out of date");
            tm.report.out_of_date.push(key);
            tm.stop();
        }
        Ok(())
    }
}

/// Print the commands that would run without running them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunPolicy;

impl TaskPolicy for DryRunPolicy {
    fn mode(&self) -> TaskMode {
        TaskMode::DryRun
    }

    fn make_ready(&self, task: &mut Task, tm: &mut Taskmaster) -> Result<(), TaskError> {
        task.make_ready_current(tm, true);
        Ok(())
    }

    fn needs_execute(&self, task: &Task, _tm: &Taskmaster) -> bool {
        !task.out_of_date().is_empty()
    }

    fn work_item(&self, task: &Task, tm: &mut Taskmaster) -> Result<WorkItem, TaskError> {
        match action_request(task, tm) {
            Some(req) => Ok(WorkItem::Print {
                lines: vec![req.command],
            }),
            None => Ok(WorkItem::Nothing),
        }
    }

    fn executed(&self, task: &mut Task, tm: &mut Taskmaster) -> Result<(), TaskError> {
        task.executed_without_callbacks(tm);
        Ok(())
    }
}
