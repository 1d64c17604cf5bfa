use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::fs::FileSystem;
use crate::signature::BuildInfo;

/// Default path (relative to the project root) of the signature file.
pub const SIGNATURE_FILE_PATH: &str = ".dagbuild/signatures.toml";

/// Abstract storage for per-node build information.
///
/// Only the coordinating thread calls into a store.
pub trait SignatureStore: Send {
    fn load(&self, key: &str) -> Result<Option<BuildInfo>>;
    fn save(&mut self, key: &str, info: &BuildInfo) -> Result<()>;
    /// Remove entries for nodes that are not in `active`.
    fn prune(&mut self, active: &[&str]) -> Result<()>;
    /// Write buffered entries out. Called once at the end of a pass.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SignatureFile {
    #[serde(default)]
    node: BTreeMap<String, BuildInfo>,
}

/// Stores build information in a TOML file. Saves are buffered until
/// [`SignatureStore::flush`].
#[derive(Debug)]
pub struct FileSignatureStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
    entries: BTreeMap<String, BuildInfo>,
    dirty: bool,
}

impl FileSignatureStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let path = path.into();
        let entries = load_entries(fs.as_ref(), &path)?;
        debug!(path = ?path, entries = entries.len(), "opened signature store");
        Ok(Self {
            path,
            fs,
            entries,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let file = SignatureFile {
            node: self.entries.clone(),
        };
        let text = toml::to_string(&file).context("serialising signature store")?;
        self.fs
            .write(&self.path, text.as_bytes())
            .with_context(|| format!("writing signature store at {:?}", self.path))
    }
}

impl SignatureStore for FileSignatureStore {
    fn load(&self, key: &str) -> Result<Option<BuildInfo>> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, info: &BuildInfo) -> Result<()> {
        self.entries.insert(key.to_string(), info.clone());
        self.dirty = true;
        debug!(node = %key, "stored build info (file)");
        Ok(())
    }

    fn prune(&mut self, active: &[&str]) -> Result<()> {
        let initial_len = self.entries.len();
        self.entries.retain(|k, _| active.contains(&k.as_str()));
        if self.entries.len() < initial_len {
            self.dirty = true;
            info!(
                removed = initial_len - self.entries.len(),
                "pruned stale build info (file)"
            );
        }
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.persist()?;
        self.dirty = false;
        debug!(path = ?self.path, entries = self.entries.len(), "wrote signature store");
        Ok(())
    }
}

fn load_entries(fs: &dyn FileSystem, path: &Path) -> Result<BTreeMap<String, BuildInfo>> {
    if !fs.exists(path) {
        return Ok(BTreeMap::new());
    }
    let text = fs
        .read_to_string(path)
        .with_context(|| format!("reading signature store at {:?}", path))?;
    let file: SignatureFile = toml::from_str(&text)
        .with_context(|| format!("parsing signature store at {:?}", path))?;
    Ok(file.node)
}

/// Stores build information in memory only.
///
/// Clones share their entries, which lets a caller keep a handle across
/// several builds.
#[derive(Debug, Clone, Default)]
pub struct MemorySignatureStore {
    map: Arc<Mutex<BTreeMap<String, BuildInfo>>>,
}

impl MemorySignatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, BuildInfo>> {
        match self.map.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SignatureStore for MemorySignatureStore {
    fn load(&self, key: &str) -> Result<Option<BuildInfo>> {
        Ok(self.lock().get(key).cloned())
    }

    fn save(&mut self, key: &str, info: &BuildInfo) -> Result<()> {
        self.lock().insert(key.to_string(), info.clone());
        debug!(node = %key, "stored build info (memory)");
        Ok(())
    }

    fn prune(&mut self, active: &[&str]) -> Result<()> {
        let mut map = self.lock();
        let initial_len = map.len();
        map.retain(|k, _| active.contains(&k.as_str()));
        if map.len() < initial_len {
            info!(
                removed = initial_len - map.len(),
                "pruned stale build info (memory)"
            );
        }
        Ok(())
    }
}
