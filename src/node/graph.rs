// src/node/graph.rs

//! Arena owning every [`Node`], [`Executor`] and [`Scanner`] of a build.
//!
//! Nodes are created on first reference and memoised by key, so repeated
//! references return the same [`NodeId`]. All edges, including the
//! `waiting_parents` back-references, are handle lists.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::errors::{DagbuildError, Result, TaskError};
use crate::exec::{Action, Executor, ExecutorCache, ExecutorId};
use crate::fs::{FileSystem, normalize_path};
use crate::node::scanner::{ScanContext, Scanner, ScannerId};
use crate::node::{Node, NodeId, NodeKind};

#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: Vec<Node>,
    by_key: HashMap<String, NodeId>,
    executors: ExecutorCache,
    scanners: Vec<Arc<dyn Scanner>>,
    /// Directory file keys are relative to.
    root: PathBuf,
}

impl NodeGraph {
    /// Create an empty graph whose file keys resolve relative to `root`.
    ///
    /// An empty `root` makes file paths equal to their keys.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn key(&self, id: NodeId) -> &str {
        &self.nodes[id.index()].key
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId::new)
    }

    pub fn lookup(&self, key: &str) -> Option<NodeId> {
        self.by_key.get(normalize_key(key).as_str()).copied()
    }

    /// Look up `key`, failing with [`DagbuildError::UnknownNode`].
    pub fn require(&self, key: &str) -> Result<NodeId> {
        self.lookup(key)
            .ok_or_else(|| DagbuildError::UnknownNode(key.to_string()))
    }

    /// Return the node for `key`, creating a file node on first reference.
    pub fn file(&mut self, key: &str) -> NodeId {
        let key = normalize_key(key);
        if let Some(id) = self.by_key.get(key.as_str()) {
            return *id;
        }
        let path = self.root.join(&key);
        self.insert(&key, NodeKind::File { path })
    }

    pub fn alias(&mut self, key: &str) -> Result<NodeId> {
        self.node_of_kind(key, NodeKind::Alias)
    }

    pub fn value(&mut self, key: &str, value: impl Into<String>) -> Result<NodeId> {
        self.node_of_kind(
            key,
            NodeKind::Value {
                value: value.into(),
            },
        )
    }

    /// Return the node for `key` if it already has `kind`, create it if it
    /// does not exist, and reject a conflicting redeclaration.
    pub fn node_of_kind(&mut self, key: &str, kind: NodeKind) -> Result<NodeId> {
        match self.lookup(key) {
            Some(id) if self.node(id).kind == kind => Ok(id),
            Some(id) => Err(DagbuildError::ConfigError(format!(
                "node '{}' already exists as a {} node, cannot redeclare it as {}",
                key,
                self.node(id).kind.name(),
                kind.name()
            ))),
            None => Ok(self.insert(key, kind)),
        }
    }

    fn insert(&mut self, key: &str, kind: NodeKind) -> NodeId {
        let key = normalize_key(key);
        let id = NodeId::new(self.nodes.len());
        trace!(node = %key, %id, "created node");
        self.nodes.push(Node::new(key.clone(), kind));
        self.by_key.insert(key, id);
        id
    }

    // ---------------------------------------------------------------------
    // Declaration
    // ---------------------------------------------------------------------

    pub fn add_sources(&mut self, id: NodeId, sources: &[NodeId]) {
        extend_unique(&mut self.node_mut(id).sources, sources);
    }

    pub fn add_depends(&mut self, id: NodeId, depends: &[NodeId]) {
        extend_unique(&mut self.node_mut(id).depends, depends);
    }

    pub fn add_prerequisites(&mut self, id: NodeId, prerequisites: &[NodeId]) {
        extend_unique(&mut self.node_mut(id).prerequisites, prerequisites);
    }

    pub fn add_ignore(&mut self, id: NodeId, ignore: &[NodeId]) {
        self.node_mut(id).ignore.extend(ignore.iter().copied());
    }

    pub fn add_side_effects(&mut self, id: NodeId, side_effects: &[NodeId]) {
        for se in side_effects {
            self.node_mut(*se).is_side_effect = true;
        }
        extend_unique(&mut self.node_mut(id).side_effects, side_effects);
    }

    pub fn set_always_build(&mut self, id: NodeId, always_build: bool) {
        self.node_mut(id).always_build = always_build;
    }

    pub fn set_precious(&mut self, id: NodeId, precious: bool) {
        self.node_mut(id).precious = precious;
    }

    pub fn set_noclean(&mut self, id: NodeId, noclean: bool) {
        self.node_mut(id).noclean = noclean;
    }

    /// Attach `action` as the builder of `targets`, reading `sources`.
    ///
    /// All targets share one [`Executor`]; every target also gets `sources`
    /// as its own explicit sources.
    pub fn set_builder(
        &mut self,
        targets: &[NodeId],
        action: Option<Action>,
        sources: &[NodeId],
    ) -> Result<ExecutorId> {
        let exec_id = self.executors.get_or_create(action, targets);

        for t in targets {
            match self.node(*t).executor {
                Some(existing) if existing != exec_id => {
                    return Err(DagbuildError::ConfigError(format!(
                        "multiple ways to build the same target were specified for '{}'",
                        self.key(*t)
                    )));
                }
                _ => {}
            }
        }

        self.executors.get_mut(exec_id).add_sources(sources);
        for t in targets {
            self.node_mut(*t).executor = Some(exec_id);
            self.add_sources(*t, sources);
        }

        debug!(
            executor = exec_id.index(),
            targets = ?targets.iter().map(|t| self.key(*t)).collect::<Vec<_>>(),
            "attached builder"
        );
        Ok(exec_id)
    }

    pub fn add_scanner(&mut self, scanner: Arc<dyn Scanner>) -> ScannerId {
        let id = ScannerId(self.scanners.len() as u32);
        self.scanners.push(scanner);
        id
    }

    pub fn set_scanner(&mut self, id: NodeId, scanner: ScannerId) {
        self.node_mut(id).scanner = Some(scanner);
    }

    pub fn executor(&self, id: ExecutorId) -> &Executor {
        self.executors.get(id)
    }

    pub fn executors(&self) -> &ExecutorCache {
        &self.executors
    }

    /// Executor bound to node `id`, if it has a builder.
    pub fn executor_of(&self, id: NodeId) -> Option<&Executor> {
        self.node(id).executor.map(|e| self.executors.get(e))
    }

    /// Targets of the node's executor, or just the node itself.
    pub fn co_targets(&self, id: NodeId) -> Vec<NodeId> {
        match self.executor_of(id) {
            Some(exec) => exec.targets().to_vec(),
            None => vec![id],
        }
    }

    /// Expanded command line of the node's executor.
    pub fn expanded_command(&self, id: NodeId) -> Option<String> {
        let exec = self.executor_of(id)?;
        let action = exec.action()?;
        let targets: Vec<&str> = exec.targets().iter().map(|t| self.key(*t)).collect();
        let sources: Vec<&str> = exec.sources().iter().map(|s| self.key(*s)).collect();
        Some(action.expand(&targets, &sources))
    }

    // ---------------------------------------------------------------------
    // Children
    // ---------------------------------------------------------------------

    /// Children that participate in signatures: sources, depends and
    /// implicit dependencies, deduplicated, minus ignored nodes.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.node(id);
        let implicit = node.implicit.as_deref().unwrap_or_default();
        let mut seen = HashSet::new();
        node.sources
            .iter()
            .chain(node.depends.iter())
            .chain(implicit.iter())
            .copied()
            .filter(|c| !node.ignore.contains(c) && seen.insert(*c))
            .collect()
    }

    /// Children the walk waits on: [`children`](Self::children) plus
    /// order-only prerequisites.
    pub fn walk_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut kids = self.children(id);
        for p in &self.node(id).prerequisites {
            if !kids.contains(p) {
                kids.push(*p);
            }
        }
        kids
    }

    /// Explicit children (sources + depends) that must exist or be buildable.
    pub fn explicit_children(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.node(id);
        let mut out = Vec::new();
        extend_unique(&mut out, &node.sources);
        extend_unique(&mut out, &node.depends);
        out
    }

    /// Run the node's scanner if it has not been scanned this pass.
    ///
    /// The executor's sources are scanned once and the result is stored as
    /// the implicit dependencies of every target sharing that executor.
    pub fn scan(&mut self, id: NodeId, fs: &dyn FileSystem) -> std::result::Result<(), TaskError> {
        if self.node(id).implicit.is_some() {
            return Ok(());
        }

        let (Some(scanner_id), Some(exec_id)) = (self.node(id).scanner, self.node(id).executor)
        else {
            self.node_mut(id).implicit = Some(Vec::new());
            return Ok(());
        };

        let scanner = Arc::clone(&self.scanners[scanner_id.0 as usize]);
        let sources = self.executors.get(exec_id).sources().to_vec();

        let mut found: Vec<PathBuf> = Vec::new();
        {
            let known = |p: &Path| fs.exists(p) || self.lookup(&self.key_for_path(p)).is_some();
            let ctx = ScanContext { fs, known: &known };
            for src in sources {
                let Some(path) = self.node(src).path() else {
                    continue;
                };
                if !fs.is_file(path) {
                    continue;
                }
                let deps = scanner
                    .scan(path, &ctx)
                    .map_err(|e| TaskError::user(self.key(id), format!("{e:#}")))?;
                found.extend(deps);
            }
        }

        let mut implicit = Vec::new();
        for path in found {
            let key = self.key_for_path(&path);
            let child = self.file(&key);
            if child != id && !implicit.contains(&child) {
                implicit.push(child);
            }
        }

        debug!(
            node = %self.key(id),
            scanner = scanner.name(),
            implicit = implicit.len(),
            "scanned implicit dependencies"
        );

        let targets = self.executors.get(exec_id).targets().to_vec();
        for t in targets {
            let node = self.node_mut(t);
            if node.implicit.is_none() {
                node.implicit = Some(implicit.clone());
            }
        }
        Ok(())
    }

    /// Key under which `path` is (or would be) registered.
    pub fn key_for_path(&self, path: &Path) -> String {
        let rel = if self.root.as_os_str().is_empty() {
            path
        } else {
            path.strip_prefix(&self.root).unwrap_or(path)
        };
        normalize_key(&rel.to_string_lossy())
    }

    // ---------------------------------------------------------------------
    // Existence
    // ---------------------------------------------------------------------

    /// Buildable by this build: has an executor, or is an alias.
    pub fn is_derived(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.executor.is_some() || matches!(node.kind, NodeKind::Alias)
    }

    pub fn exists(&self, id: NodeId, fs: &dyn FileSystem) -> bool {
        match &self.node(id).kind {
            NodeKind::File { path } => fs.exists(path),
            NodeKind::Alias | NodeKind::Value { .. } => true,
        }
    }

    /// Not buildable, not a side effect, and not present.
    pub fn missing(&self, id: NodeId, fs: &dyn FileSystem) -> bool {
        !self.is_derived(id) && !self.node(id).is_side_effect && !self.exists(id, fs)
    }

    // ---------------------------------------------------------------------
    // Passes
    // ---------------------------------------------------------------------

    /// Reset every node for a new build pass.
    pub fn clear(&mut self) {
        for node in &mut self.nodes {
            node.clear();
        }
        debug!(nodes = self.nodes.len(), "cleared graph for a new pass");
    }
}

fn extend_unique(dst: &mut Vec<NodeId>, src: &[NodeId]) {
    for id in src {
        if !dst.contains(id) {
            dst.push(*id);
        }
    }
}

/// Canonical form of a node key; see [`normalize_path`].
pub fn normalize_key(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    normalize_path(Path::new(key))
        .to_string_lossy()
        .into_owned()
}
