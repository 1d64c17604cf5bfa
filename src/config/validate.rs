// src/config/validate.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::{ConfigFile, NodeKindConfig, RawConfigFile};
use crate::errors::{DagbuildError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DagbuildError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.scanner, raw.node))
    }
}

/// Semantic checks run before any graph is built.
///
/// Dependency cycles are not rejected here; the taskmaster
/// reports them with their full path at the end of the walk.
pub fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_nodes(cfg)?;
    validate_global_config(cfg)?;
    validate_scanners(cfg)?;
    validate_nodes(cfg)?;
    validate_co_targets(cfg)?;
    validate_default_targets(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> DagbuildError {
    DagbuildError::ConfigError(msg.into())
}

fn ensure_has_nodes(cfg: &RawConfigFile) -> Result<()> {
    if cfg.node.is_empty() {
        return Err(config_error(
            "config must contain at least one [node.<name>] section",
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.jobs == 0 {
        return Err(config_error("[config].jobs must be >= 1 (got 0)"));
    }
    Ok(())
}

fn validate_scanners(cfg: &RawConfigFile) -> Result<()> {
    for (name, scanner) in cfg.scanner.iter() {
        let re = Regex::new(&scanner.pattern).map_err(|e| {
            config_error(format!("scanner '{}' has an invalid pattern: {}", name, e))
        })?;
        if re.captures_len() < 2 {
            return Err(config_error(format!(
                "scanner '{}' pattern must contain a capture group for the included name",
                name
            )));
        }
    }
    Ok(())
}

fn validate_nodes(cfg: &RawConfigFile) -> Result<()> {
    for (name, node) in cfg.node.iter() {
        if let Some(scanner) = &node.scanner {
            if !cfg.scanner.contains_key(scanner) {
                return Err(config_error(format!(
                    "node '{}' references unknown scanner '{}'",
                    name, scanner
                )));
            }
            if node.cmd.is_none() {
                return Err(config_error(format!(
                    "node '{}' has a scanner but no `cmd` whose sources it could scan",
                    name
                )));
            }
        }

        match node.kind {
            NodeKindConfig::Value => {
                if node.value.is_none() {
                    return Err(config_error(format!(
                        "value node '{}' must set `value`",
                        name
                    )));
                }
                if node.cmd.is_some() {
                    return Err(config_error(format!(
                        "value node '{}' cannot have a `cmd`",
                        name
                    )));
                }
            }
            NodeKindConfig::File | NodeKindConfig::Alias => {
                if node.value.is_some() {
                    return Err(config_error(format!(
                        "node '{}' sets `value` but is not a value node",
                        name
                    )));
                }
            }
        }

        if node.kind == NodeKindConfig::Alias && !node.also_builds.is_empty() {
            return Err(config_error(format!(
                "alias '{}' cannot declare `also_builds`",
                name
            )));
        }

        for se in node.side_effects.iter() {
            if se == name {
                return Err(config_error(format!(
                    "node '{}' cannot be its own side effect",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_co_targets(cfg: &RawConfigFile) -> Result<()> {
    let mut claimed: BTreeMap<&str, &str> = BTreeMap::new();

    for (name, node) in cfg.node.iter() {
        if node.also_builds.is_empty() {
            continue;
        }
        if node.cmd.is_none() {
            return Err(config_error(format!(
                "node '{}' declares `also_builds` without a `cmd`",
                name
            )));
        }
        for co in node.also_builds.iter() {
            if co == name {
                return Err(config_error(format!(
                    "node '{}' lists itself in `also_builds`",
                    name
                )));
            }
            if let Some(other) = cfg.node.get(co) {
                if other.cmd.is_some() {
                    return Err(config_error(format!(
                        "'{}' is built by '{}' but also declares its own `cmd`",
                        co, name
                    )));
                }
                if other.kind != NodeKindConfig::File {
                    return Err(config_error(format!(
                        "co-target '{}' of '{}' must be a file node",
                        co, name
                    )));
                }
            }
            if let Some(previous) = claimed.insert(co.as_str(), name.as_str()) {
                return Err(config_error(format!(
                    "'{}' is listed in `also_builds` of both '{}' and '{}'",
                    co, previous, name
                )));
            }
        }
    }
    Ok(())
}

fn validate_default_targets(cfg: &RawConfigFile) -> Result<()> {
    for target in cfg.config.default_targets.iter() {
        if !cfg.node.contains_key(target) {
            return Err(config_error(format!(
                "[config].default_targets names undeclared node '{}'",
                target
            )));
        }
    }
    Ok(())
}

/// Declared graph in dependency order (children before parents).
///
/// Used for `--plan`; the engine itself never needs a global order.
pub fn topological_order(cfg: &ConfigFile) -> Result<Vec<String>> {
    // Edge direction: child -> parent.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.node.keys() {
        graph.add_node(name.as_str());
    }

    for (name, node) in cfg.node.iter() {
        for child in node.child_names() {
            graph.add_edge(child.as_str(), name.as_str(), ());
        }
        // Co-targets come out of the same action invocation.
        for co in node.also_builds.iter() {
            graph.add_edge(name.as_str(), co.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(config_error(format!(
            "cycle detected in node graph involving '{}'",
            cycle.node_id()
        ))),
    }
}
