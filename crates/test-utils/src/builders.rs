#![allow(dead_code)]

use std::collections::BTreeMap;

use dagbuild::config::{
    ConfigFile, ConfigSection, NodeConfig, NodeKindConfig, RawConfigFile, ScannerConfig,
};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                scanner: BTreeMap::new(),
                node: BTreeMap::new(),
            },
        }
    }

    pub fn with_node(mut self, name: &str, node: NodeConfig) -> Self {
        self.config.node.insert(name.to_string(), node);
        self
    }

    pub fn with_scanner(mut self, name: &str, pattern: &str, recursive: bool) -> Self {
        self.config.scanner.insert(
            name.to_string(),
            ScannerConfig {
                pattern: pattern.to_string(),
                search_path: vec![],
                recursive,
            },
        );
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.config.config.jobs = jobs;
        self
    }

    pub fn keep_going(mut self, val: bool) -> Self {
        self.config.config.keep_going = val;
        self
    }

    pub fn default_target(mut self, name: &str) -> Self {
        self.config.config.default_targets.push(name.to_string());
        self
    }

    /// The raw description, for tests that exercise validation.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `NodeConfig`.
pub struct NodeConfigBuilder {
    node: NodeConfig,
}

impl NodeConfigBuilder {
    /// A file node built by `cmd`.
    pub fn new(cmd: &str) -> Self {
        Self {
            node: NodeConfig {
                cmd: Some(cmd.to_string()),
                ..NodeConfig::default()
            },
        }
    }

    /// A file node with no command (a declared source).
    pub fn source() -> Self {
        Self {
            node: NodeConfig::default(),
        }
    }

    pub fn alias() -> Self {
        Self {
            node: NodeConfig {
                kind: NodeKindConfig::Alias,
                ..NodeConfig::default()
            },
        }
    }

    pub fn value(content: &str) -> Self {
        Self {
            node: NodeConfig {
                kind: NodeKindConfig::Value,
                value: Some(content.to_string()),
                ..NodeConfig::default()
            },
        }
    }

    pub fn source_file(mut self, name: &str) -> Self {
        self.node.sources.push(name.to_string());
        self
    }

    pub fn depends(mut self, name: &str) -> Self {
        self.node.depends.push(name.to_string());
        self
    }

    pub fn requires(mut self, name: &str) -> Self {
        self.node.requires.push(name.to_string());
        self
    }

    pub fn ignore(mut self, name: &str) -> Self {
        self.node.ignore.push(name.to_string());
        self
    }

    pub fn side_effect(mut self, name: &str) -> Self {
        self.node.side_effects.push(name.to_string());
        self
    }

    pub fn also_builds(mut self, name: &str) -> Self {
        self.node.also_builds.push(name.to_string());
        self
    }

    pub fn scanner(mut self, name: &str) -> Self {
        self.node.scanner = Some(name.to_string());
        self
    }

    pub fn always_build(mut self, val: bool) -> Self {
        self.node.always_build = val;
        self
    }

    pub fn precious(mut self, val: bool) -> Self {
        self.node.precious = val;
        self
    }

    pub fn noclean(mut self, val: bool) -> Self {
        self.node.noclean = val;
        self
    }

    pub fn build(self) -> NodeConfig {
        self.node
    }
}
