// src/lib.rs

pub mod cli;
pub mod config;
pub mod env;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod job;
pub mod logging;
pub mod node;
pub mod report;
pub mod signature;
pub mod task;
pub mod taskmaster;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::{config_root_dir, load_and_validate};
use crate::config::model::ConfigFile;
use crate::config::validate::topological_order;
use crate::env::BuildEnv;
use crate::exec::ShellActionRunner;
use crate::job::{BuildOutcome, JobEvent, Jobs};
use crate::node::from_config::default_targets;
use crate::node::{NodeGraph, NodeId};
use crate::report::BuildStatus;
use crate::taskmaster::Taskmaster;
use crate::types::{BuildConfig, FailurePolicy, TaskMode};

/// High-level entry point used by `main.rs`.
///
/// Wires together config loading, graph construction, the signature store,
/// the taskmaster and job scheduler, and interrupt handling.
pub async fn run(args: CliArgs) -> Result<BuildStatus> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.plan {
        print_plan(&cfg)?;
        return Ok(BuildStatus::Success);
    }

    let root = config_root_dir(&config_path);
    let mut graph = NodeGraph::from_config(&cfg, &root)?;

    let build_config = BuildConfig::new(
        args.jobs.unwrap_or(cfg.config.jobs),
        FailurePolicy::from_keep_going(args.keep_going || cfg.config.keep_going),
        args.mode,
    );

    let store_path = root.join(cfg.config.effective_store_path());
    let env = BuildEnv::open(cfg.config.signature_store, &store_path)?;

    let names = if args.targets.is_empty() {
        default_targets(&cfg)
    } else {
        args.targets.clone()
    };
    // Undeclared names are looked up as files.
    let targets: Vec<NodeId> = names.iter().map(|n| graph.file(n)).collect();
    info!(?names, ?build_config, "starting build");

    let tm = Taskmaster::new(graph, env, &targets, &build_config);
    let jobs = Jobs::new(tm, Arc::new(ShellActionRunner::new()));

    // Interrupt -> stop dispatching, let running actions finish.
    {
        let tx = jobs.event_sender();
        tokio::spawn(async move {
            if let Some(signal) = interrupt_signal().await {
                warn!(signal, "interrupt received");
                let _ = tx.send(JobEvent::InterruptRequested).await;
            }
        });
    }

    let mut outcome = jobs.run().await;

    if build_config.mode == TaskMode::Build
        && args.targets.is_empty()
        && outcome.status.is_success()
    {
        prune_store(&mut outcome);
    }

    if outcome.status.is_success() {
        println!("dagbuild: {}", outcome.report.summary());
    } else {
        eprintln!("dagbuild: {}", outcome.report.summary());
    }
    Ok(outcome.status)
}

async fn ctrl_c() -> Option<&'static str> {
    match tokio::signal::ctrl_c().await {
        Ok(()) => Some("SIGINT"),
        Err(e) => {
            warn!(error = %e, "failed to listen for Ctrl-C");
            None
        }
    }
}

/// Wait for Ctrl-C, SIGTERM or SIGHUP. `None` if nothing can be listened to.
#[cfg(unix)]
async fn interrupt_signal() -> Option<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut term, mut hup) = match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
        (Ok(term), Ok(hup)) => (term, hup),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "failed to listen for SIGTERM/SIGHUP");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        Some(name) = ctrl_c() => Some(name),
        _ = term.recv() => Some("SIGTERM"),
        _ = hup.recv() => Some("SIGHUP"),
    }
}

#[cfg(not(unix))]
async fn interrupt_signal() -> Option<&'static str> {
    ctrl_c().await
}

/// Drop stored build info of nodes that are no longer in the graph.
fn prune_store(outcome: &mut BuildOutcome) {
    let keys: Vec<String> = outcome
        .graph
        .ids()
        .filter(|id| outcome.graph.is_derived(*id))
        .map(|id| outcome.graph.key(id).to_string())
        .collect();
    let active: Vec<&str> = keys.iter().map(String::as_str).collect();
    if let Err(e) = outcome.env.store.prune(&active) {
        warn!(error = %e, "failed to prune signature store");
    }
}

/// `--plan`: print nodes in dependency order with their commands.
fn print_plan(cfg: &ConfigFile) -> Result<()> {
    let order = topological_order(cfg)?;

    println!("dagbuild plan");
    println!("  config.jobs = {}", cfg.config.jobs);
    println!("  config.keep_going = {}", cfg.config.keep_going);
    println!("  config.signature_store = {:?}", cfg.config.signature_store);
    println!();

    println!("nodes ({}):", order.len());
    for name in order {
        let Some(node) = cfg.node.get(&name) else {
            println!("  - {name} (source)");
            continue;
        };
        println!("  - {name} [{:?}]", node.kind);
        if let Some(cmd) = &node.cmd {
            println!("      cmd: {cmd}");
        }
        if !node.sources.is_empty() {
            println!("      sources: {:?}", node.sources);
        }
        if !node.depends.is_empty() {
            println!("      depends: {:?}", node.depends);
        }
        if !node.requires.is_empty() {
            println!("      requires: {:?}", node.requires);
        }
        if !node.also_builds.is_empty() {
            println!("      also_builds: {:?}", node.also_builds);
        }
        if !node.side_effects.is_empty() {
            println!("      side_effects: {:?}", node.side_effects);
        }
        if let Some(scanner) = &node.scanner {
            println!("      scanner: {scanner}");
        }
    }

    debug!("plan printed (no execution)");
    Ok(())
}
