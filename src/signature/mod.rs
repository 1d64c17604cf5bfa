// src/signature/mod.rs

//! Change detection.
//!
//! - [`NodeSignature`] is a node's current content signature.
//! - [`BuildInfo`] is what a target recorded about itself and its children the
//!   last time it was built.
//! - [`Decider`] compares a child's current signature with the recorded one;
//!   the rest of the engine treats it as opaque.
//! - [`store`] persists `BuildInfo` between runs.

pub mod hash;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use store::{FileSignatureStore, MemorySignatureStore, SignatureStore, SIGNATURE_FILE_PATH};

/// Content signature of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeSignature(String);

impl NodeSignature {
    const MISSING: &'static str = "-";

    pub fn new(sig: impl Into<String>) -> Self {
        Self(sig.into())
    }

    /// Signature of something that does not exist (yet).
    pub fn missing() -> Self {
        Self(Self::MISSING.to_string())
    }

    pub fn is_missing(&self) -> bool {
        self.0 == Self::MISSING
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One recorded child: its key and its signature at build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildSignature {
    pub key: String,
    pub sig: NodeSignature,
}

/// Record of how a target was last built.
///
/// Children are stored in the same order `NodeGraph::children`
/// yields them (sources, then depends, then implicit, minus ignored), so a
/// positional comparison is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Signature of the expanded action, if the node has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub children: Vec<ChildSignature>,
}

/// Decides whether a dependency changed since a target was last built.
pub trait Decider: Send + Sync + fmt::Debug {
    fn changed(&self, current: &NodeSignature, previous: Option<&ChildSignature>) -> bool;
}

/// Default decider: content signatures must be identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentDecider;

impl Decider for ContentDecider {
    fn changed(&self, current: &NodeSignature, previous: Option<&ChildSignature>) -> bool {
        match previous {
            Some(prev) => current.is_missing() || prev.sig != *current,
            None => true,
        }
    }
}
