// src/env.rs

//! Collaborators the build engine consults but does not own the policy of.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::fs::{FileSystem, RealFileSystem};
use crate::signature::{
    ContentDecider, Decider, FileSignatureStore, MemorySignatureStore, SignatureStore,
};
use crate::types::SignatureStoreMode;

/// Filesystem, signature store and change decider for one build.
///
/// Lives on the coordinating thread next to the taskmaster; workers only
/// ever get a clone of `fs`.
pub struct BuildEnv {
    pub fs: Arc<dyn FileSystem>,
    pub store: Box<dyn SignatureStore>,
    pub decider: Box<dyn Decider>,
}

impl BuildEnv {
    pub fn new(fs: Arc<dyn FileSystem>, store: Box<dyn SignatureStore>) -> Self {
        Self {
            fs,
            store,
            decider: Box::new(ContentDecider),
        }
    }

    /// Real filesystem with a store chosen by `mode`.
    pub fn open(mode: SignatureStoreMode, store_path: &Path) -> Result<Self> {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let store: Box<dyn SignatureStore> = match mode {
            SignatureStoreMode::File => {
                Box::new(FileSignatureStore::open(store_path, Arc::clone(&fs))?)
            }
            SignatureStoreMode::Memory => Box::new(MemorySignatureStore::new()),
        };
        Ok(Self::new(fs, store))
    }

    /// In-memory store, mostly for tests.
    pub fn in_memory(fs: Arc<dyn FileSystem>) -> Self {
        Self::new(fs, Box::new(MemorySignatureStore::new()))
    }

    pub fn with_decider(mut self, decider: Box<dyn Decider>) -> Self {
        self.decider = decider;
        self
    }
}

impl fmt::Debug for BuildEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildEnv")
            .field("fs", &self.fs)
            .field("decider", &self.decider)
            .finish_non_exhaustive()
    }
}
