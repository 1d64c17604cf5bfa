pub mod builders;
pub mod fake_runner;

use std::sync::{Arc, Once};

use tracing_subscriber::{fmt, EnvFilter};

use dagbuild::config::ConfigFile;
use dagbuild::env::BuildEnv;
use dagbuild::fs::mock::MockFileSystem;
use dagbuild::job::{BuildOutcome, Jobs};
use dagbuild::node::{NodeGraph, NodeId};
use dagbuild::node::from_config::default_targets;
use dagbuild::signature::MemorySignatureStore;
use dagbuild::taskmaster::Taskmaster;
use dagbuild::types::BuildConfig;

use crate::fake_runner::FakeRunner;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// A build description wired to an in-memory filesystem, an in-memory
/// signature store shared across passes, and a [`FakeRunner`].
pub struct TestBuild {
    pub cfg: ConfigFile,
    pub fs: MockFileSystem,
    pub store: MemorySignatureStore,
    pub runner: FakeRunner,
}

impl TestBuild {
    pub fn new(cfg: ConfigFile) -> Self {
        let fs = MockFileSystem::new();
        Self {
            cfg,
            runner: FakeRunner::new(fs.clone()),
            fs,
            store: MemorySignatureStore::new(),
        }
    }

    /// Replace the runner, e.g. with one configured to fail some nodes.
    pub fn with_runner(mut self, f: impl FnOnce(FakeRunner) -> FakeRunner) -> Self {
        self.runner = f(FakeRunner::new(self.fs.clone()));
        self
    }

    /// Fresh graph for the description; file keys equal mock paths.
    pub fn graph(&self) -> NodeGraph {
        NodeGraph::from_config(&self.cfg, std::path::Path::new(""))
            .expect("graph from a validated config")
    }

    pub fn env(&self) -> BuildEnv {
        BuildEnv::new(Arc::new(self.fs.clone()), Box::new(self.store.clone()))
    }

    /// Taskmaster over `targets` (or the default targets when empty).
    pub fn taskmaster(&self, targets: &[&str], config: &BuildConfig) -> Taskmaster {
        self.taskmaster_with_env(targets, config, self.env())
    }

    /// Like [`TestBuild::taskmaster`], with a caller-supplied environment.
    pub fn taskmaster_with_env(
        &self,
        targets: &[&str],
        config: &BuildConfig,
        env: BuildEnv,
    ) -> Taskmaster {
        let mut graph = self.graph();
        let names: Vec<String> = if targets.is_empty() {
            default_targets(&self.cfg)
        } else {
            targets.iter().map(|t| t.to_string()).collect()
        };
        let ids: Vec<NodeId> = names.iter().map(|n| graph.file(n)).collect();
        Taskmaster::new(graph, env, &ids, config)
    }

    pub fn jobs(&self, targets: &[&str], config: &BuildConfig) -> Jobs {
        Jobs::new(
            self.taskmaster(targets, config),
            Arc::new(self.runner.clone()),
        )
    }

    /// One full pass.
    pub async fn run(&self, targets: &[&str], config: &BuildConfig) -> BuildOutcome {
        with_timeout(self.jobs(targets, config).run()).await
    }
}
