// src/node/scanner.rs

//! Implicit dependency discovery.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use crate::fs::{FileSystem, normalize_path};

/// Handle of a scanner registered on a [`NodeGraph`](crate::node::NodeGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScannerId(pub(crate) u32);

/// What a scanner may consult while scanning.
pub struct ScanContext<'a> {
    pub fs: &'a dyn FileSystem,
    /// True if the path names something the build knows about: an existing
    /// file or a node declared in the graph (possibly not built yet).
    pub known: &'a dyn Fn(&Path) -> bool,
}

/// Given a source file, returns the paths it depends on.
pub trait Scanner: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
    fn scan(&self, source: &Path, ctx: &ScanContext<'_>) -> Result<Vec<PathBuf>>;
}

/// Scanner driven by a regex whose first capture group is an include name.
///
/// Names are resolved against the including file's directory first, then
/// each `search_path` entry; unresolvable names are skipped.
#[derive(Debug, Clone)]
pub struct RegexScanner {
    name: String,
    pattern: Regex,
    search_path: Vec<PathBuf>,
    recursive: bool,
}

impl RegexScanner {
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        search_path: Vec<PathBuf>,
        recursive: bool,
    ) -> Result<Self> {
        let name = name.into();
        let pattern = Regex::new(&format!("(?m){pattern}"))
            .with_context(|| format!("compiling pattern for scanner '{name}'"))?;
        Ok(Self {
            name,
            pattern,
            search_path,
            recursive,
        })
    }

    fn resolve(&self, including: &Path, include: &str, ctx: &ScanContext<'_>) -> Option<PathBuf> {
        let local = including
            .parent()
            .map(|dir| normalize_path(&dir.join(include)))
            .unwrap_or_else(|| normalize_path(Path::new(include)));
        if (ctx.known)(&local) {
            return Some(local);
        }
        self.search_path
            .iter()
            .map(|dir| normalize_path(&dir.join(include)))
            .find(|candidate| (ctx.known)(candidate))
    }

    fn scan_one(&self, source: &Path, ctx: &ScanContext<'_>) -> Result<Vec<PathBuf>> {
        let text = ctx.fs.read_to_string(source)?;
        let mut found = Vec::new();
        for caps in self.pattern.captures_iter(&text) {
            let Some(include) = caps.get(1) else {
                continue;
            };
            match self.resolve(source, include.as_str(), ctx) {
                Some(path) => found.push(path),
                None => debug!(
                    scanner = %self.name,
                    source = ?source,
                    include = include.as_str(),
                    "include not found; skipping"
                ),
            }
        }
        Ok(found)
    }
}

impl Scanner for RegexScanner {
    fn name(&self) -> &str {
        &self.name
    }

    fn scan(&self, source: &Path, ctx: &ScanContext<'_>) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut stack = vec![source.to_path_buf()];
        seen.insert(source.to_path_buf());

        while let Some(file) = stack.pop() {
            let found = self
                .scan_one(&file, ctx)
                .with_context(|| format!("scanning {:?} with scanner '{}'", file, self.name))?;

            for dep in found {
                if !seen.insert(dep.clone()) {
                    continue;
                }
                // Generated files are scanned once they exist.
                if self.recursive && ctx.fs.is_file(&dep) {
                    stack.push(dep.clone());
                }
                result.push(dep);
            }
        }

        Ok(result)
    }
}
