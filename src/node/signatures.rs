// src/node/signatures.rs

//! Signature computation and up-to-date decisions for graph nodes.

use std::collections::HashSet;

use tracing::{debug, trace, warn};

use crate::env::BuildEnv;
use crate::fs::FileSystem;
use crate::node::{NodeGraph, NodeId, NodeKind, NodeState};
use crate::signature::hash::{compute_aggregate_hash, compute_file_hash, compute_str_hash};
use crate::signature::{BuildInfo, ChildSignature, NodeSignature};

impl NodeGraph {
    /// Current content signature of a node, memoised for the pass.
    pub fn signature(&mut self, id: NodeId, fs: &dyn FileSystem) -> NodeSignature {
        let mut visiting = HashSet::new();
        self.signature_inner(id, fs, &mut visiting)
    }

    fn signature_inner(
        &mut self,
        id: NodeId,
        fs: &dyn FileSystem,
        visiting: &mut HashSet<NodeId>,
    ) -> NodeSignature {
        if let Some(sig) = &self.node(id).signature {
            return sig.clone();
        }
        if !visiting.insert(id) {
            return NodeSignature::missing();
        }

        let sig = match self.node(id).kind.clone() {
            NodeKind::File { path } => {
                if fs.is_file(&path) {
                    match compute_file_hash(fs, &path) {
                        Ok(h) => NodeSignature::new(h),
                        Err(e) => {
                            warn!(node = %self.key(id), error = %e, "failed to hash file");
                            NodeSignature::missing()
                        }
                    }
                } else {
                    NodeSignature::missing()
                }
            }
            NodeKind::Value { value } => NodeSignature::new(compute_str_hash(&value)),
            NodeKind::Alias => {
                let kids = self.children(id);
                let sigs: Vec<NodeSignature> = kids
                    .into_iter()
                    .map(|c| self.signature_inner(c, fs, visiting))
                    .collect();
                NodeSignature::new(compute_aggregate_hash(sigs.iter().map(|s| s.as_str())))
            }
        };

        visiting.remove(&id);
        trace!(node = %self.key(id), sig = %sig, "computed signature");
        self.node_mut(id).signature = Some(sig.clone());
        sig
    }

    /// Forget the memoised signature, e.g. after the node was rebuilt.
    pub(crate) fn invalidate_signature(&mut self, id: NodeId) {
        self.node_mut(id).signature = None;
    }

    /// Hash of the expanded command line, if the node has an action.
    pub fn action_signature(&self, id: NodeId) -> Option<String> {
        self.expanded_command(id).map(|cmd| compute_str_hash(&cmd))
    }

    /// Build information as it would be recorded if the node were built now.
    pub fn build_info(&mut self, id: NodeId, fs: &dyn FileSystem) -> BuildInfo {
        let action = self.action_signature(id);
        let children = self
            .children(id)
            .into_iter()
            .map(|c| ChildSignature {
                key: self.key(c).to_string(),
                sig: self.signature(c, fs),
            })
            .collect();
        BuildInfo { action, children }
    }

    /// Compare the stored build information against the current one.
    ///
    /// A missing record, a different child count, any changed child or a
    /// different action all mean "changed".
    pub fn changed(&mut self, id: NodeId, env: &BuildEnv) -> bool {
        let key = self.key(id).to_string();
        let previous = match env.store.load(&key) {
            Ok(Some(prev)) => prev,
            Ok(None) => {
                debug!(node = %key, "no stored build info");
                return true;
            }
            Err(e) => {
                warn!(node = %key, error = %e, "failed to load build info; treating as changed");
                return true;
            }
        };

        let current = self.build_info(id, env.fs.as_ref());

        if previous.children.len() != current.children.len() {
            debug!(
                node = %key,
                old = previous.children.len(),
                new = current.children.len(),
                "child count changed"
            );
            return true;
        }

        for (now, then) in current.children.iter().zip(previous.children.iter()) {
            let prev = (now.key == then.key).then_some(then);
            if env.decider.changed(&now.sig, prev) {
                debug!(node = %key, child = %now.key, "child changed");
                return true;
            }
        }

        if previous.action != current.action {
            debug!(node = %key, "action changed");
            return true;
        }

        false
    }

    /// Whether a node with a builder can skip its action this pass.
    pub fn is_up_to_date(&mut self, id: NodeId, env: &BuildEnv) -> bool {
        match self.node(id).kind {
            NodeKind::Alias => self.children_are_up_to_date(id),
            NodeKind::Value { .. } => true,
            NodeKind::File { .. } => {
                if !self.exists(id, env.fs.as_ref()) {
                    debug!(node = %self.key(id), "target does not exist");
                    return false;
                }
                !self.changed(id, env)
            }
        }
    }

    /// An alias is current when none of its children had to be rebuilt.
    pub fn children_are_up_to_date(&self, id: NodeId) -> bool {
        if self.node(id).always_build {
            return false;
        }
        self.children(id)
            .into_iter()
            .map(|c| self.node(c).state)
            .filter(|s| *s != NodeState::NoState)
            .max()
            .is_none_or(|s| s == NodeState::UpToDate)
    }
}
