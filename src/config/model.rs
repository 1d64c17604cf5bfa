// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::signature::SIGNATURE_FILE_PATH;
use crate::types::SignatureStoreMode;

/// Build description exactly as read from a TOML file.
///
/// ```toml
/// [config]
/// jobs = 4
///
/// [scanner.c]
/// pattern = '^#include\s+"([^"]+)"'
///
/// [node."app"]
/// cmd = "cc -o $TARGET $SOURCES"
/// sources = ["main.o", "util.o"]
///
/// [node."main.o"]
/// cmd = "cc -c -o $TARGET $SOURCE"
/// sources = ["main.c"]
/// scanner = "c"
/// ```
///
/// Names that are referenced but never declared become plain source files.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// Include scanners from `[scanner.<name>]`.
    #[serde(default)]
    pub scanner: BTreeMap<String, ScannerConfig>,

    /// Nodes from `[node.<name>]`.
    #[serde(default)]
    pub node: BTreeMap<String, NodeConfig>,
}

/// Validated build description.
///
/// Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub scanner: BTreeMap<String, ScannerConfig>,
    pub node: BTreeMap<String, NodeConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        scanner: BTreeMap<String, ScannerConfig>,
        node: BTreeMap<String, NodeConfig>,
    ) -> Self {
        Self {
            config,
            scanner,
            node,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of actions running at once.
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Keep building independent targets after an action fails.
    #[serde(default)]
    pub keep_going: bool,

    #[serde(default)]
    pub signature_store: SignatureStoreMode,

    /// Location of the signature file, relative to the config file.
    #[serde(default)]
    pub store_path: Option<String>,

    /// Targets built when none are given on the command line.
    #[serde(default)]
    pub default_targets: Vec<String>,
}

fn default_jobs() -> usize {
    1
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            keep_going: false,
            signature_store: SignatureStoreMode::default(),
            store_path: None,
            default_targets: Vec::new(),
        }
    }
}

impl ConfigSection {
    pub fn effective_store_path(&self) -> &str {
        self.store_path.as_deref().unwrap_or(SIGNATURE_FILE_PATH)
    }
}

/// `[scanner.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Regex applied line by line; capture group 1 is the included name.
    pub pattern: String,

    /// Directories searched when the name is not next to the including file.
    #[serde(default)]
    pub search_path: Vec<String>,

    /// Also scan the files found, if they exist.
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKindConfig {
    #[default]
    File,
    Alias,
    Value,
}

/// `[node.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub kind: NodeKindConfig,

    /// Command that builds this node (and its `also_builds` co-targets).
    #[serde(default)]
    pub cmd: Option<String>,

    /// Inputs of the command; `$SOURCE`/`$SOURCES` expand to these.
    #[serde(default)]
    pub sources: Vec<String>,

    /// Extra dependencies that are not passed to the command.
    #[serde(default)]
    pub depends: Vec<String>,

    /// Order-only prerequisites: built first, never make this node stale.
    #[serde(default)]
    pub requires: Vec<String>,

    /// Children left out of change detection.
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Files the command touches incidentally.
    #[serde(default)]
    pub side_effects: Vec<String>,

    /// Additional targets produced by the same command invocation.
    #[serde(default)]
    pub also_builds: Vec<String>,

    /// Name of a `[scanner.<name>]` applied to this node's sources.
    #[serde(default)]
    pub scanner: Option<String>,

    /// Literal content of a `value` node.
    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub always_build: bool,

    /// Not removed before rebuilding.
    #[serde(default)]
    pub precious: bool,

    /// Not removed by `--mode clean`.
    #[serde(default)]
    pub noclean: bool,
}

impl NodeConfig {
    /// Every name this node refers to as a child.
    pub fn child_names(&self) -> impl Iterator<Item = &String> {
        self.sources
            .iter()
            .chain(self.depends.iter())
            .chain(self.requires.iter())
    }
}
