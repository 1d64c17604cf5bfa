// src/node/mod.rs

//! Dependency graph nodes.
//!
//! - [`graph`] holds the arena ([`NodeGraph`]) that owns every node; edges
//!   are [`NodeId`] handle lists, never owning references.
//! - [`signatures`] computes content signatures and decides up-to-dateness.
//! - [`scanner`] discovers implicit dependencies.
//! - [`from_config`] builds a graph from a validated build description.

pub mod from_config;
pub mod graph;
pub mod scanner;
pub mod signatures;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::exec::ExecutorId;
use crate::signature::{BuildInfo, NodeSignature};

pub use graph::NodeGraph;
pub use scanner::{RegexScanner, ScanContext, Scanner, ScannerId};

/// Handle of a node inside its [`NodeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-pass node state, in increasing "done-ness" order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum NodeState {
    /// Not yet visited this pass.
    #[default]
    NoState,
    /// On the walk stack, waiting for its children.
    Pending,
    /// Handed to the scheduler, waiting for the actual build.
    Executing,
    UpToDate,
    Executed,
    Failed,
}

impl NodeState {
    /// `UpToDate`, `Executed` and `Failed` end a node's pass.
    pub fn is_terminal(self) -> bool {
        self >= NodeState::UpToDate
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeState::NoState => "no_state",
            NodeState::Pending => "pending",
            NodeState::Executing => "executing",
            NodeState::UpToDate => "up_to_date",
            NodeState::Executed => "executed",
            NodeState::Failed => "failed",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific payload of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A file on disk, addressed by its path.
    File { path: PathBuf },
    /// A named group of other nodes.
    Alias,
    /// An in-memory literal; its signature is its content.
    Value { value: String },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::File { .. } => "file",
            NodeKind::Alias => "alias",
            NodeKind::Value { .. } => "value",
        }
    }
}

/// A unit of the dependency graph.
///
/// Scheduling fields (`state`, `ref_count`, `waiting_parents`) are only ever
/// mutated by the taskmaster and its tasks on the coordinating thread.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) key: String,
    pub(crate) kind: NodeKind,
    pub(crate) state: NodeState,
    pub(crate) executor: Option<ExecutorId>,

    pub(crate) sources: Vec<NodeId>,
    pub(crate) depends: Vec<NodeId>,
    /// Order-only children: waited upon, never part of signatures.
    pub(crate) prerequisites: Vec<NodeId>,
    /// `None` until scanned this pass.
    pub(crate) implicit: Option<Vec<NodeId>>,
    pub(crate) ignore: BTreeSet<NodeId>,
    pub(crate) side_effects: Vec<NodeId>,
    pub(crate) scanner: Option<ScannerId>,

    pub(crate) waiting_parents: BTreeSet<NodeId>,
    /// Nodes deferred because this side effect was executing.
    pub(crate) waiting_side_effects: BTreeSet<NodeId>,
    pub(crate) ref_count: usize,

    pub(crate) always_build: bool,
    pub(crate) precious: bool,
    pub(crate) noclean: bool,
    pub(crate) is_side_effect: bool,

    pub(crate) binfo: Option<BuildInfo>,
    pub(crate) signature: Option<NodeSignature>,
}

impl Node {
    pub(crate) fn new(key: String, kind: NodeKind) -> Self {
        Self {
            key,
            kind,
            state: NodeState::NoState,
            executor: None,
            sources: Vec::new(),
            depends: Vec::new(),
            prerequisites: Vec::new(),
            implicit: None,
            ignore: BTreeSet::new(),
            side_effects: Vec::new(),
            scanner: None,
            waiting_parents: BTreeSet::new(),
            waiting_side_effects: BTreeSet::new(),
            ref_count: 0,
            always_build: false,
            precious: false,
            noclean: false,
            is_side_effect: false,
            binfo: None,
            signature: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Filesystem path for file nodes.
    pub fn path(&self) -> Option<&Path> {
        match &self.kind {
            NodeKind::File { path } => Some(path),
            _ => None,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn executor(&self) -> Option<ExecutorId> {
        self.executor
    }

    pub fn sources(&self) -> &[NodeId] {
        &self.sources
    }

    pub fn depends(&self) -> &[NodeId] {
        &self.depends
    }

    pub fn prerequisites(&self) -> &[NodeId] {
        &self.prerequisites
    }

    pub fn implicit(&self) -> Option<&[NodeId]> {
        self.implicit.as_deref()
    }

    pub fn side_effects(&self) -> &[NodeId] {
        &self.side_effects
    }

    pub fn waiting_parents(&self) -> &BTreeSet<NodeId> {
        &self.waiting_parents
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub fn always_build(&self) -> bool {
        self.always_build
    }

    pub fn precious(&self) -> bool {
        self.precious
    }

    pub fn noclean(&self) -> bool {
        self.noclean
    }

    pub fn is_side_effect(&self) -> bool {
        self.is_side_effect
    }

    /// Returns 1 if `parent` was newly added, 0 if it was already waiting.
    /// The result is added straight onto the parent's `ref_count`.
    pub(crate) fn add_to_waiting_parents(&mut self, parent: NodeId) -> usize {
        usize::from(self.waiting_parents.insert(parent))
    }

    /// Reset everything that belongs to a single build pass.
    pub(crate) fn clear(&mut self) {
        self.state = NodeState::NoState;
        self.implicit = None;
        self.waiting_parents.clear();
        self.waiting_side_effects.clear();
        self.ref_count = 0;
        self.binfo = None;
        self.signature = None;
    }
}
