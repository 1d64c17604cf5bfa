// src/task/mod.rs

//! One schedulable unit of work.
//!
//! A [`Task`] wraps the node the walk found ready together with every
//! co-target sharing its executor. Its lifecycle is driven by the job
//! scheduler on the coordinating thread:
//!
//! `make_ready` (by the taskmaster) → `prepare` → `needs_execute` →
//! `work_item` (run on a worker) → `executed` | `failed` → `postprocess`.
//!
//! What "building" means is decided by the [`policy::TaskPolicy`].

pub mod policy;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::{ErrorKind, TaskError};
use crate::exec::WorkItem;
use crate::node::{NodeId, NodeState};
use crate::taskmaster::Taskmaster;
use crate::types::FailurePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub struct Task {
    id: TaskId,
    node: NodeId,
    targets: Vec<NodeId>,
    top: bool,
    out_of_date: Vec<NodeId>,
    /// Error found while the task was being made ready; raised by `prepare`.
    pending_error: Option<TaskError>,
}

impl Task {
    pub(crate) fn new(id: TaskId, node: NodeId, targets: Vec<NodeId>, top: bool) -> Self {
        Self {
            id,
            node,
            targets,
            top,
            out_of_date: Vec::new(),
            pending_error: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The node the walk found ready.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// All targets of the node's executor.
    pub fn targets(&self) -> &[NodeId] {
        &self.targets
    }

    /// Whether the node was named as a top-level target.
    pub fn is_top(&self) -> bool {
        self.top
    }

    pub fn out_of_date(&self) -> &[NodeId] {
        &self.out_of_date
    }

    pub(crate) fn set_pending_error(&mut self, err: TaskError) {
        self.pending_error = Some(err);
    }

    // ---------------------------------------------------------------------
    // Readiness
    // ---------------------------------------------------------------------

    pub(crate) fn make_ready(&mut self, tm: &mut Taskmaster) -> Result<(), TaskError> {
        let policy = Arc::clone(&tm.policy);
        policy.make_ready(self, tm)
    }

    /// Mark the targets executing if any of them is stale, otherwise record
    /// them as up to date.
    ///
    /// With `assume_rebuilt_children`, a child that reached `executed` makes
    /// the target stale even if its signature did not change (dry runs never
    /// touch the files).
    pub fn make_ready_current(&mut self, tm: &mut Taskmaster, assume_rebuilt_children: bool) {
        self.out_of_date.clear();

        for t in self.targets.iter().copied() {
            let up_to_date = !tm.graph.is_derived(t)
                || (!tm.graph.node(t).always_build
                    && !(assume_rebuilt_children && has_executed_child(tm, t))
                    && tm.graph.is_up_to_date(t, &tm.env));
            if !up_to_date {
                self.out_of_date.push(t);
            }
        }

        if !self.out_of_date.is_empty() {
            self.set_executing(tm);
        } else {
            for t in self.targets.iter().copied() {
                visited(tm, t);
                tm.graph.node_mut(t).state = NodeState::UpToDate;
                if tm.graph.is_derived(t) {
                    tm.report.up_to_date.push(tm.graph.key(t).to_string());
                }
            }
        }
    }

    /// Mark every target executing regardless of its signatures.
    pub fn make_ready_all(&mut self, tm: &mut Taskmaster) {
        self.out_of_date = self.targets.clone();
        self.set_executing(tm);
    }

    fn set_executing(&self, tm: &mut Taskmaster) {
        for t in self.targets.iter().copied() {
            tm.graph.node_mut(t).state = NodeState::Executing;
            for se in tm.graph.node(t).side_effects.clone() {
                tm.graph.node_mut(se).state = NodeState::Executing;
            }
        }
    }

    // ---------------------------------------------------------------------
    // Execution
    // ---------------------------------------------------------------------

    /// Raise any error found while making the task ready, then check that
    /// everything the targets need exists or can be built.
    pub fn prepare(&mut self, tm: &mut Taskmaster) -> Result<(), TaskError> {
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }
        if !tm.policy.checks_dependencies() {
            return Ok(());
        }

        let fs = Arc::clone(&tm.env.fs);
        let graph = &tm.graph;
        let node_key = graph.key(self.node);

        if let Some(exec) = graph.executor_of(self.node) {
            for s in exec.sources() {
                if graph.missing(*s, fs.as_ref()) {
                    return Err(TaskError::user(
                        node_key,
                        format!(
                            "Source `{}' not found, needed by target `{}'.",
                            graph.key(*s),
                            node_key
                        ),
                    ));
                }
            }
        }

        if self.top && graph.missing(self.node, fs.as_ref()) {
            return Err(TaskError::user(
                node_key,
                format!("Do not know how to make target `{}'.", node_key),
            ));
        }

        for t in self.targets.iter().copied() {
            let t_key = graph.key(t);
            for c in graph.explicit_children(t) {
                if graph.missing(c, fs.as_ref()) {
                    return Err(TaskError::user(
                        t_key,
                        format!(
                            "Explicit dependency `{}' not found, needed by target `{}'.",
                            graph.key(c),
                            t_key
                        ),
                    ));
                }
            }
            for c in graph.node(t).implicit().unwrap_or_default() {
                if graph.missing(*c, fs.as_ref()) {
                    return Err(TaskError::user(
                        t_key,
                        format!(
                            "Implicit dependency `{}' not found, needed by target `{}'.",
                            graph.key(*c),
                            t_key
                        ),
                    ));
                }
            }
        }

        debug!(task_id = %self.id, node = %node_key, "prepared");
        Ok(())
    }

    pub fn needs_execute(&self, tm: &Taskmaster) -> bool {
        tm.policy.needs_execute(self, tm)
    }

    /// Produce the graph-free work for a worker.
    pub fn work_item(&self, tm: &mut Taskmaster) -> Result<WorkItem, TaskError> {
        let policy = Arc::clone(&tm.policy);
        policy.work_item(self, tm)
    }

    // ---------------------------------------------------------------------
    // Completion
    // ---------------------------------------------------------------------

    /// Successful completion (or nothing needed doing).
    pub fn executed(&mut self, tm: &mut Taskmaster) -> Result<(), TaskError> {
        let policy = Arc::clone(&tm.policy);
        policy.executed(self, tm)
    }

    /// Record built targets and persist their build information.
    pub fn executed_with_callbacks(&mut self, tm: &mut Taskmaster) {
        let fs = Arc::clone(&tm.env.fs);
        for t in self.targets.iter().copied() {
            if tm.graph.node(t).state == NodeState::Executing {
                tm.graph.node_mut(t).state = NodeState::Executed;
                let binfo = tm.graph.build_info(t, fs.as_ref());
                tm.graph.node_mut(t).binfo = Some(binfo);
                built(tm, t);
                tm.report.executed.push(tm.graph.key(t).to_string());
            }
            visited(tm, t);
        }
    }

    /// Same state transitions, without touching signatures or the store.
    pub fn executed_without_callbacks(&mut self, tm: &mut Taskmaster) {
        for t in self.targets.iter().copied() {
            if tm.graph.node(t).state == NodeState::Executing {
                tm.graph.node_mut(t).state = NodeState::Executed;
                tm.report.executed.push(tm.graph.key(t).to_string());
            }
        }
    }

    /// Unsuccessful completion. Static graph defects never stop the walk;
    /// action failures follow the failure policy; anything else stops.
    pub fn failed(&mut self, tm: &mut Taskmaster, err: TaskError) {
        warn!(task_id = %self.id, node = %tm.graph.key(self.node), error = %err, "task failed");
        tm.report.record_failure(&err);

        match err.kind() {
            ErrorKind::User => self.fail_continue(tm),
            ErrorKind::Build => match tm.config.failure_policy {
                FailurePolicy::KeepGoing => self.fail_continue(tm),
                FailurePolicy::Stop => self.fail_stop(tm),
            },
            ErrorKind::Cycle | ErrorKind::Internal | ErrorKind::Interrupted => self.fail_stop(tm),
        }
    }

    /// Fail the targets and their waiting parents, then stop the walk.
    pub fn fail_stop(&mut self, tm: &mut Taskmaster) {
        self.fail_targets(tm);
        tm.stop();
    }

    /// Fail the targets and their waiting parents; keep walking.
    pub fn fail_continue(&mut self, tm: &mut Taskmaster) {
        self.fail_targets(tm);
    }

    fn fail_targets(&mut self, tm: &mut Taskmaster) {
        match tm.will_not_build(&self.targets, |n| n.state = NodeState::Failed) {
            Ok(visited) => {
                for n in visited {
                    if !self.targets.contains(&n) {
                        tm.report.not_built.push(tm.graph.key(n).to_string());
                    }
                }
            }
            Err(e) => tm.record_internal(e),
        }
    }

    /// Release parents and side-effect waiters now that this task is done.
    ///
    /// Called exactly once per task, whatever the outcome.
    pub fn postprocess(&mut self, tm: &mut Taskmaster) -> Result<(), TaskError> {
        let mut parents: BTreeMap<NodeId, usize> = BTreeMap::new();

        for t in self.targets.iter().copied() {
            let node = tm.graph.node(t);
            if !node.waiting_parents.is_empty() {
                tm.pending_children.remove(&t);
            }
            for p in node.waiting_parents.iter() {
                *parents.entry(*p).or_default() += 1;
            }
        }

        for t in self.targets.iter().copied() {
            for se in tm.graph.node(t).side_effects.clone() {
                let se_node = tm.graph.node_mut(se);
                if se_node.state == NodeState::Executing {
                    se_node.state = NodeState::NoState;
                    for p in std::mem::take(&mut se_node.waiting_parents) {
                        *parents.entry(p).or_default() += 1;
                    }
                }
                for p in std::mem::take(&mut tm.graph.node_mut(se).waiting_side_effects) {
                    if tm.graph.node(p).ref_count == 0 {
                        tm.candidates.push(p);
                    }
                }
            }
        }

        let mut result = Ok(());
        for (p, subtract) in parents {
            let parent = tm.graph.node_mut(p);
            match parent.ref_count.checked_sub(subtract) {
                Some(n) => parent.ref_count = n,
                None => {
                    result = Err(TaskError::Internal(format!(
                        "ref_count of '{}' is {} but {} finished children were waited on",
                        parent.key, parent.ref_count, subtract
                    )));
                    parent.ref_count = 0;
                }
            }
            if parent.ref_count == 0 {
                tm.candidates.push(p);
            }
        }

        for t in self.targets.iter().copied() {
            tm.graph.node_mut(t).waiting_parents.clear();
        }

        debug!(task_id = %self.id, node = %tm.graph.key(self.node), "postprocessed");
        result
    }
}

fn has_executed_child(tm: &Taskmaster, t: NodeId) -> bool {
    tm.graph
        .children(t)
        .into_iter()
        .any(|c| tm.graph.node(c).state == NodeState::Executed)
}

/// `t` was rebuilt: parents must rescan, and its own signature is stale.
fn built(tm: &mut Taskmaster, t: NodeId) {
    for p in tm.graph.node(t).waiting_parents.clone() {
        tm.graph.node_mut(p).implicit = None;
    }
    tm.graph.invalidate_signature(t);
}

/// Persist build information computed for `t`, if any.
///
/// Store failures are downgraded to warnings.
fn visited(tm: &mut Taskmaster, t: NodeId) {
    let Some(binfo) = tm.graph.node_mut(t).binfo.take() else {
        return;
    };
    let key = tm.graph.key(t).to_string();
    if let Err(e) = tm.env.store.save(&key, &binfo) {
        warn!(node = %key, error = %e, "failed to store build info");
        tm.report
            .warnings
            .push(format!("failed to store build info for '{key}': {e:#}"));
    } else {
        debug!(node = %key, "stored build info");
    }
}
