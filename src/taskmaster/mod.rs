// src/taskmaster/mod.rs

//! The dependency walk.
//!
//! The [`Taskmaster`] owns the graph for the duration of a pass and hands out
//! one [`Task`] at a time. It never runs anything: the job scheduler drives
//! it from a single coordinating thread and feeds results back through the
//! task callbacks.
//!
//! - [`cycle`] diagnoses dependency cycles once the walk is over.
//! - [`stats`] counts what happened to each candidate.

pub mod cycle;
pub mod stats;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::env::BuildEnv;
use crate::errors::TaskError;
use crate::node::{Node, NodeGraph, NodeId, NodeState};
use crate::report::BuildReport;
use crate::task::policy::{TaskPolicy, policy_for};
use crate::task::{Task, TaskId};
use crate::types::BuildConfig;

pub use stats::WalkStats;

pub struct Taskmaster {
    pub(crate) graph: NodeGraph,
    pub(crate) env: BuildEnv,
    pub(crate) config: BuildConfig,
    pub(crate) policy: Arc<dyn TaskPolicy>,

    requested_targets: BTreeSet<NodeId>,
    /// Remaining top-level targets, last one first.
    top_targets_left: Vec<NodeId>,
    /// LIFO stack of nodes to (re)consider.
    pub(crate) candidates: Vec<NodeId>,
    current_top: Option<NodeId>,
    /// Children found `pending` while their parent was examined; the only
    /// place a cycle can hide.
    pub(crate) pending_children: BTreeSet<NodeId>,

    stopped: bool,
    ready_error: Option<TaskError>,
    next_task_id: u64,
    stats: WalkStats,
    pub(crate) report: BuildReport,
}

impl Taskmaster {
    /// Start a pass over `targets`, using the policy for `config.mode`.
    pub fn new(graph: NodeGraph, env: BuildEnv, targets: &[NodeId], config: &BuildConfig) -> Self {
        let mut top_targets_left = targets.to_vec();
        top_targets_left.reverse();

        debug!(
            targets = ?targets.iter().map(|t| graph.key(*t)).collect::<Vec<_>>(),
            mode = ?config.mode,
            max_parallel = config.max_parallel,
            "taskmaster created"
        );

        Self {
            requested_targets: targets.iter().copied().collect(),
            top_targets_left,
            candidates: Vec::new(),
            current_top: None,
            pending_children: BTreeSet::new(),
            stopped: false,
            ready_error: None,
            next_task_id: 0,
            stats: WalkStats::default(),
            report: BuildReport::default(),
            policy: policy_for(config.mode),
            config: *config,
            graph,
            env,
        }
    }

    /// Replace the policy chosen from the build mode.
    pub fn with_policy(mut self, policy: Arc<dyn TaskPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn env(&self) -> &BuildEnv {
        &self.env
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    pub fn stats(&self) -> &WalkStats {
        &self.stats
    }

    pub fn pending_children(&self) -> &BTreeSet<NodeId> {
        &self.pending_children
    }

    /// Top-level target currently being descended.
    pub fn current_top(&self) -> Option<NodeId> {
        self.current_top
    }

    pub fn is_top(&self, id: NodeId) -> bool {
        self.requested_targets.contains(&id)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn into_parts(self) -> (NodeGraph, BuildEnv, BuildReport) {
        (self.graph, self.env, self.report)
    }

    pub fn into_graph(self) -> NodeGraph {
        self.graph
    }

    // ---------------------------------------------------------------------
    // Walk
    // ---------------------------------------------------------------------

    fn next_candidate(&mut self) -> Option<NodeId> {
        if self.stopped {
            self.drain_candidates();
            return None;
        }
        if let Some(node) = self.candidates.pop() {
            return Some(node);
        }
        let node = self.top_targets_left.pop()?;
        self.current_top = Some(node);
        Some(node)
    }

    /// After `stop()`, give up on every queued candidate so the
    /// `waiting_parents` bookkeeping stays balanced.
    fn drain_candidates(&mut self) {
        while !self.candidates.is_empty() {
            let candidates = std::mem::take(&mut self.candidates);
            if let Err(e) = self.will_not_build(&candidates, |_| {}) {
                self.record_internal(e);
            }
        }
    }

    /// Return the next node whose children are all done, or `None` when no
    /// candidate is ready right now.
    pub fn find_next_ready_node(&mut self) -> Option<NodeId> {
        self.ready_error = None;

        loop {
            let node = self.next_candidate()?;
            let state = self.graph.node(node).state;
            self.stats.considered += 1;

            trace!(node = %self.graph.key(node), %state, "considering node");

            match state {
                NodeState::NoState => self.graph.node_mut(node).state = NodeState::Pending,
                NodeState::Pending => {}
                _ => {
                    self.stats.already_handled += 1;
                    continue;
                }
            }

            let fs = Arc::clone(&self.env.fs);
            if let Err(err) = self.graph.scan(node, fs.as_ref()) {
                debug!(node = %self.graph.key(node), error = %err, "problem scanning children");
                self.stats.problem += 1;
                self.ready_error = Some(err);
                return Some(node);
            }

            let children = self.graph.walk_children(node);
            let mut not_visited = Vec::new();
            let mut pending = Vec::new();
            let mut not_ready = Vec::new();
            let mut child_failed = false;

            for child in children {
                let child_state = self.graph.node(child).state;
                match child_state {
                    NodeState::NoState => not_visited.push(child),
                    NodeState::Pending => pending.push(child),
                    NodeState::Failed => child_failed = true,
                    _ => {}
                }
                if child_state <= NodeState::Executing {
                    not_ready.push(child);
                }
            }

            // Reversed so the first declared child is examined first.
            not_visited.reverse();
            self.candidates.extend(not_visited);

            if child_failed {
                self.stats.child_failed += 1;
                debug!(node = %self.graph.key(node), "child failed; node will not be built");
                self.give_up_on(node);
                continue;
            }

            if !not_ready.is_empty() {
                for child in not_ready {
                    self.stats.not_built += 1;
                    let added = self.graph.node_mut(child).add_to_waiting_parents(node);
                    self.graph.node_mut(node).ref_count += added;
                }
                trace!(
                    node = %self.graph.key(node),
                    ref_count = self.graph.node(node).ref_count,
                    "waiting on children"
                );
                self.pending_children.extend(pending);
                continue;
            }

            let mut wait_side_effects = false;
            for se in self.graph.node(node).side_effects.clone() {
                if self.graph.node(se).state == NodeState::Executing {
                    self.graph.node_mut(se).waiting_side_effects.insert(node);
                    wait_side_effects = true;
                }
            }
            if wait_side_effects {
                self.stats.side_effects += 1;
                debug!(node = %self.graph.key(node), "side effect busy; deferring");
                continue;
            }

            self.stats.build += 1;
            debug!(node = %self.graph.key(node), "node ready");
            return Some(node);
        }
    }

    /// Wrap the next ready node in a [`Task`] and make it ready.
    pub fn next_task(&mut self) -> Option<Task> {
        let node = self.find_next_ready_node()?;
        let targets = self.graph.co_targets(node);
        let top = self.is_top(node);

        let id = TaskId(self.next_task_id);
        self.next_task_id += 1;

        let mut task = Task::new(id, node, targets, top);
        match self.ready_error.take() {
            Some(err) => task.set_pending_error(err),
            None => {
                if let Err(err) = task.make_ready(self) {
                    task.set_pending_error(err);
                }
            }
        }

        debug!(
            task_id = %task.id(),
            node = %self.graph.key(node),
            top,
            out_of_date = task.out_of_date().len(),
            "next task"
        );
        Some(task)
    }

    // ---------------------------------------------------------------------
    // Failure propagation
    // ---------------------------------------------------------------------

    /// Mark `nodes` and, transitively, everything waiting on them as never
    /// to be built, releasing the reference each of them held.
    ///
    /// Returns every node visited, `nodes` included.
    pub fn will_not_build(
        &mut self,
        nodes: &[NodeId],
        mut mark: impl FnMut(&mut Node),
    ) -> Result<Vec<NodeId>, TaskError> {
        let mut to_visit: BTreeSet<NodeId> = nodes.iter().copied().collect();
        for n in nodes {
            self.pending_children.remove(n);
        }

        let mut visited = Vec::new();
        let mut seen = BTreeSet::new();
        let mut underflow = None;

        while let Some(node) = to_visit.pop_first() {
            mark(self.graph.node_mut(node));
            if seen.insert(node) {
                visited.push(node);
            }

            let parents = std::mem::take(&mut self.graph.node_mut(node).waiting_parents);
            for p in parents {
                self.pending_children.remove(&p);
                let parent = self.graph.node_mut(p);
                match parent.ref_count.checked_sub(1) {
                    Some(n) => parent.ref_count = n,
                    None => {
                        underflow = Some(TaskError::Internal(format!(
                            "ref_count of '{}' would drop below zero",
                            parent.key
                        )));
                    }
                }
                to_visit.insert(p);
            }
        }

        match underflow {
            Some(err) => Err(err),
            None => Ok(visited),
        }
    }

    /// `node` depends on something that already failed.
    fn give_up_on(&mut self, node: NodeId) {
        match self.will_not_build(&[node], |n| n.state = NodeState::Failed) {
            Ok(visited) => {
                for n in visited {
                    self.report.not_built.push(self.graph.key(n).to_string());
                }
            }
            Err(e) => self.record_internal(e),
        }
    }

    /// Stop handing out work. Tasks already handed out still complete and
    /// postprocess normally.
    pub fn stop(&mut self) {
        if !self.stopped {
            debug!("taskmaster stopped");
        }
        self.stopped = true;
    }

    pub(crate) fn record_internal(&mut self, err: TaskError) {
        warn!(error = %err, "internal scheduler error");
        self.report.record_failure(&err);
        self.stop();
    }

    // ---------------------------------------------------------------------
    // End of pass
    // ---------------------------------------------------------------------

    /// Report dependency cycles among the children that were left pending.
    ///
    /// A pending child that was executed after all (a diamond) is not a
    /// cycle. After `stop()` the queued candidates are given up first, so
    /// only nodes that still wait on each other remain pending.
    pub fn cleanup(&mut self) -> Result<(), TaskError> {
        if self.stopped {
            self.drain_candidates();
        }
        self.stats.log();

        if self.pending_children.is_empty() {
            return Ok(());
        }

        let mut found = Vec::new();
        let mut genuine = false;
        let mut unexplained = Vec::new();

        for n in self.pending_children.iter().copied() {
            let cycle = cycle::find_cycle(&self.graph, n);
            let state = self.graph.node(n).state;
            if cycle.is_some() || state != NodeState::Executed {
                genuine = true;
            }
            match cycle {
                Some(path) => found.push(path),
                None if state != NodeState::Executed => {
                    unexplained.push(format!("{} ({})", self.graph.key(n), state));
                }
                None => {}
            }
        }

        if !genuine {
            return Ok(());
        }

        if found.is_empty() {
            return Err(TaskError::Internal(format!(
                "no cycle found for pending node(s): {}",
                unexplained.join(", ")
            )));
        }

        let cycles: Vec<Vec<String>> = cycle::dedup_cycles(found)
            .into_iter()
            .map(|path| path.iter().map(|n| self.graph.key(*n).to_string()).collect())
            .collect();
        warn!(?cycles, "dependency cycle(s) found");
        Err(TaskError::Cycle { cycles })
    }

    /// Check the scheduling bookkeeping.
    ///
    /// Every node's `ref_count` must equal the number of children that hold
    /// it in their `waiting_parents`, and every pending child must still
    /// have someone waiting on it.
    pub fn verify_invariants(&self) -> Result<(), TaskError> {
        let mut waiting_on: HashMap<NodeId, usize> = HashMap::new();
        for child in self.graph.ids() {
            for p in self.graph.node(child).waiting_parents.iter() {
                *waiting_on.entry(*p).or_default() += 1;
            }
        }

        for id in self.graph.ids() {
            let node = self.graph.node(id);
            let expected = waiting_on.get(&id).copied().unwrap_or(0);
            if node.ref_count != expected {
                return Err(TaskError::Internal(format!(
                    "ref_count of '{}' is {} but {} children hold it as a waiting parent",
                    node.key, node.ref_count, expected
                )));
            }
        }

        for pc in self.pending_children.iter() {
            let node = self.graph.node(*pc);
            if node.waiting_parents.is_empty() {
                return Err(TaskError::Internal(format!(
                    "pending child '{}' has no waiting parents",
                    node.key
                )));
            }
        }

        Ok(())
    }
}
