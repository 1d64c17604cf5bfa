// src/exec/executor.rs

//! Binding of an action to the targets it produces and the sources it reads.

use std::collections::HashMap;

use crate::node::NodeId;
use crate::signature::hash::compute_str_hash;

/// Handle of an [`Executor`] inside its [`ExecutorCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutorId(u32);

impl ExecutorId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Opaque command descriptor.
///
/// `$TARGET`, `$TARGETS`, `$SOURCE` and `$SOURCES` are expanded from the
/// executor's node lists right before the action is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Action {
    command: String,
}

impl Action {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Expand the command with the given target and source keys.
    pub fn expand(&self, targets: &[&str], sources: &[&str]) -> String {
        let first_target = targets.first().copied().unwrap_or_default();
        let first_source = sources.first().copied().unwrap_or_default();

        // Longer variables first so `$TARGETS` is not eaten by `$TARGET`.
        self.command
            .replace("$TARGETS", &targets.join(" "))
            .replace("$SOURCES", &sources.join(" "))
            .replace("$TARGET", first_target)
            .replace("$SOURCE", first_source)
    }
}

/// One action invocation that builds `targets` from `sources`.
#[derive(Debug, Clone)]
pub struct Executor {
    action: Option<Action>,
    targets: Vec<NodeId>,
    sources: Vec<NodeId>,
}

impl Executor {
    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    pub fn targets(&self) -> &[NodeId] {
        &self.targets
    }

    pub fn sources(&self) -> &[NodeId] {
        &self.sources
    }

    pub(crate) fn add_sources(&mut self, sources: &[NodeId]) {
        for s in sources {
            if !self.sources.contains(s) {
                self.sources.push(*s);
            }
        }
    }
}

/// Structural identity of an executor: what it runs and what it produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ExecutorKey {
    action: Option<String>,
    targets: Vec<NodeId>,
}

/// Owns every executor and guarantees there is exactly one per distinct
/// (action, target set).
#[derive(Debug, Default, Clone)]
pub struct ExecutorCache {
    executors: Vec<Executor>,
    by_key: HashMap<ExecutorKey, ExecutorId>,
}

impl ExecutorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ExecutorId) -> &Executor {
        &self.executors[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: ExecutorId) -> &mut Executor {
        &mut self.executors[id.index()]
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Return the executor for `(action, targets)`, creating it on first use.
    ///
    /// `targets` keeps its declared order on the executor; the lookup key is
    /// order-independent.
    pub fn get_or_create(&mut self, action: Option<Action>, targets: &[NodeId]) -> ExecutorId {
        let mut sorted = targets.to_vec();
        sorted.sort();
        sorted.dedup();
        let key = ExecutorKey {
            action: action.as_ref().map(|a| compute_str_hash(a.command())),
            targets: sorted,
        };

        if let Some(id) = self.by_key.get(&key) {
            return *id;
        }

        let mut ordered = Vec::with_capacity(targets.len());
        for t in targets {
            if !ordered.contains(t) {
                ordered.push(*t);
            }
        }

        let id = ExecutorId(self.executors.len() as u32);
        self.executors.push(Executor {
            action,
            targets: ordered,
            sources: Vec::new(),
        });
        self.by_key.insert(key, id);
        id
    }
}
