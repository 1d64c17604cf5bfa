// src/node/from_config.rs

//! Construction of a [`NodeGraph`] from a validated build description.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::model::{ConfigFile, NodeConfig, NodeKindConfig};
use crate::errors::{DagbuildError, Result};
use crate::exec::Action;
use crate::node::scanner::{RegexScanner, ScannerId};
use crate::node::graph::normalize_key;
use crate::node::{NodeGraph, NodeId, NodeKind};

impl NodeGraph {
    /// Build the graph described by `cfg`, with file keys relative to `root`.
    pub fn from_config(cfg: &ConfigFile, root: &Path) -> Result<Self> {
        let mut graph = NodeGraph::new(root);

        let mut scanners: HashMap<&str, ScannerId> = HashMap::new();
        for (name, sc) in cfg.scanner.iter() {
            let search_path = sc.search_path.iter().map(|p| root.join(p)).collect();
            let scanner = RegexScanner::new(name.as_str(), &sc.pattern, search_path, sc.recursive)
                .map_err(DagbuildError::Other)?;
            scanners.insert(name.as_str(), graph.add_scanner(Arc::new(scanner)));
        }

        // Declare first so references resolve to the declared kind.
        for (name, node) in cfg.node.iter() {
            let kind = match node.kind {
                NodeKindConfig::File => NodeKind::File {
                    path: root.join(normalize_key(name)),
                },
                NodeKindConfig::Alias => NodeKind::Alias,
                NodeKindConfig::Value => NodeKind::Value {
                    value: node.value.clone().unwrap_or_default(),
                },
            };
            graph.node_of_kind(name, kind)?;
        }

        for (name, node) in cfg.node.iter() {
            let id = graph.require(name)?;
            wire_node(&mut graph, id, node, &scanners)?;
        }

        info!(
            nodes = graph.len(),
            executors = graph.executors().len(),
            "built node graph from config"
        );
        Ok(graph)
    }
}

fn resolve(graph: &mut NodeGraph, names: &[String]) -> Vec<NodeId> {
    names.iter().map(|n| graph.file(n)).collect()
}

fn wire_node(
    graph: &mut NodeGraph,
    id: NodeId,
    node: &NodeConfig,
    scanners: &HashMap<&str, ScannerId>,
) -> Result<()> {
    let sources = resolve(graph, &node.sources);
    let depends = resolve(graph, &node.depends);
    let requires = resolve(graph, &node.requires);
    let ignore = resolve(graph, &node.ignore);
    let side_effects = resolve(graph, &node.side_effects);

    let mut targets = vec![id];
    targets.extend(resolve(graph, &node.also_builds));

    match &node.cmd {
        Some(cmd) => {
            graph.set_builder(&targets, Some(Action::new(cmd.as_str())), &sources)?;
        }
        None => graph.add_sources(id, &sources),
    }

    for t in &targets {
        graph.add_depends(*t, &depends);
        graph.add_prerequisites(*t, &requires);
        graph.add_ignore(*t, &ignore);
        graph.add_side_effects(*t, &side_effects);
        graph.set_always_build(*t, node.always_build);
        graph.set_precious(*t, node.precious);
        graph.set_noclean(*t, node.noclean);
        if let Some(scanner) = node.scanner.as_deref().and_then(|s| scanners.get(s)) {
            graph.set_scanner(*t, *scanner);
        }
    }

    debug!(
        node = %graph.key(id),
        sources = sources.len(),
        depends = depends.len(),
        requires = requires.len(),
        co_targets = targets.len() - 1,
        "wired node"
    );
    Ok(())
}

/// Targets built when the caller names none.
///
/// `[config].default_targets` if set; otherwise every declared node that no
/// other declared node refers to, falling back to all declared nodes when
/// every node is referenced (a cycle).
pub fn default_targets(cfg: &ConfigFile) -> Vec<String> {
    if !cfg.config.default_targets.is_empty() {
        return cfg.config.default_targets.clone();
    }

    let referenced: BTreeSet<String> = cfg
        .node
        .values()
        .flat_map(|n| n.child_names().chain(n.also_builds.iter()).chain(n.side_effects.iter()))
        .map(|name| normalize_key(name))
        .collect();

    let roots: Vec<String> = cfg
        .node
        .keys()
        .filter(|name| !referenced.contains(&normalize_key(name)))
        .cloned()
        .collect();

    if roots.is_empty() {
        cfg.node.keys().cloned().collect()
    } else {
        roots
    }
}
