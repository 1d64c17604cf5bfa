// tests/incremental.rs

mod common;

use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;

use dagbuild::env::BuildEnv;
use dagbuild::fs::FileSystem;
use dagbuild::job::Jobs;
use dagbuild::node::NodeState;
use dagbuild::report::BuildStatus;
use dagbuild::signature::{BuildInfo, FileSignatureStore, SignatureStore, SIGNATURE_FILE_PATH};
use dagbuild::taskmaster::Taskmaster;
use dagbuild_test_utils::builders::{ConfigFileBuilder, NodeConfigBuilder};
use dagbuild_test_utils::{init_tracing, with_timeout, TestBuild};

use common::{build_config, diamond_config, fork_config, state_of};

#[tokio::test]
async fn second_run_without_changes_invokes_nothing() {
    init_tracing();

    let b = TestBuild::new(diamond_config());
    b.fs.add_file("c.src", "source");

    let first = b.run(&[], &build_config(2)).await;
    assert_eq!(first.status, BuildStatus::Success);
    assert_eq!(b.runner.invocations().len(), 4);

    b.runner.reset();
    let second = b.run(&[], &build_config(2)).await;

    assert_eq!(second.status, BuildStatus::Success);
    assert!(b.runner.invocations().is_empty());
    for node in ["c", "a", "b", "root"] {
        assert_eq!(state_of(&second, node), NodeState::UpToDate, "{node}");
    }
    assert_eq!(second.report.up_to_date.len(), 4);
    assert!(second.report.executed.is_empty());
}

#[tokio::test]
async fn persisted_store_survives_between_runs() {
    init_tracing();

    let b = TestBuild::new(diamond_config());
    b.fs.add_file("c.src", "source");
    let fs: Arc<dyn FileSystem> = Arc::new(b.fs.clone());

    let run = |fs: Arc<dyn FileSystem>| {
        let store = FileSignatureStore::open(SIGNATURE_FILE_PATH, Arc::clone(&fs))
            .expect("open store");
        let env = BuildEnv::new(fs, Box::new(store));
        let mut graph = b.graph();
        let root = graph.file("root");
        let tm = Taskmaster::new(graph, env, &[root], &build_config(1));
        Jobs::new(tm, Arc::new(b.runner.clone())).run()
    };

    let first = with_timeout(run(Arc::clone(&fs))).await;
    assert_eq!(first.status, BuildStatus::Success);
    assert!(b.fs.contents(SIGNATURE_FILE_PATH).is_some());

    b.runner.reset();
    let second = with_timeout(run(Arc::clone(&fs))).await;

    assert_eq!(second.status, BuildStatus::Success);
    assert!(b.runner.invocations().is_empty());

    let store = FileSignatureStore::open(SIGNATURE_FILE_PATH, fs).expect("reopen store");
    for node in ["a", "b", "c", "root"] {
        assert!(store.load(node).unwrap().is_some(), "{node} has no build info");
    }
}

#[tokio::test]
async fn source_change_rebuilds_only_what_changed_content() {
    init_tracing();

    let b = TestBuild::new(diamond_config());
    b.fs.add_file("c.src", "v1");
    b.run(&[], &build_config(1)).await;

    // c's action writes the same bytes again, so a and b stay current.
    b.fs.add_file("c.src", "v2");
    b.runner.reset();
    let outcome = b.run(&[], &build_config(1)).await;

    assert_eq!(outcome.status, BuildStatus::Success);
    assert_eq!(b.runner.invocations(), vec!["c"]);
    assert_eq!(state_of(&outcome, "a"), NodeState::UpToDate);
    assert_eq!(state_of(&outcome, "root"), NodeState::UpToDate);
}

#[tokio::test]
async fn changed_output_propagates_to_parents() {
    init_tracing();

    let b = TestBuild::new(diamond_config());
    b.fs.add_file("c.src", "v1");
    b.run(&[], &build_config(1)).await;

    let b = b.with_runner(|r| r.output("c", "different bytes"));
    b.fs.add_file("c.src", "v2");
    let outcome = b.run(&[], &build_config(1)).await;

    assert_eq!(outcome.status, BuildStatus::Success);
    // a and b rewrite identical bytes, which stops the rebuild below them.
    assert_eq!(b.runner.invocations(), vec!["c", "a", "b"]);
    assert_eq!(state_of(&outcome, "root"), NodeState::UpToDate);
}

#[tokio::test]
async fn deleted_target_is_rebuilt() {
    init_tracing();

    let b = TestBuild::new(diamond_config());
    b.fs.add_file("c.src", "source");
    b.run(&[], &build_config(1)).await;

    b.fs.remove(Path::new("a")).unwrap();
    b.runner.reset();
    let outcome = b.run(&[], &build_config(1)).await;

    assert_eq!(outcome.status, BuildStatus::Success);
    assert_eq!(b.runner.invocations(), vec!["a"]);
}

#[tokio::test]
async fn command_change_rebuilds_target() {
    init_tracing();

    let leaf = |cmd: &str| {
        ConfigFileBuilder::new()
            .with_node("out", NodeConfigBuilder::new(cmd).source_file("in").build())
            .build()
    };

    let b = TestBuild::new(leaf("cc -O0 -o $TARGET $SOURCE"));
    b.fs.add_file("in", "int main;");
    b.run(&[], &build_config(1)).await;

    let mut b2 = TestBuild::new(leaf("cc -O2 -o $TARGET $SOURCE"));
    b2.fs = b.fs.clone();
    b2.store = b.store.clone();
    b2.runner = b.runner.clone();
    b2.runner.reset();
    b2.run(&[], &build_config(1)).await;

    assert_eq!(b2.runner.invocations(), vec!["out"]);
}

#[tokio::test]
async fn always_build_runs_every_time() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_node("stamp", NodeConfigBuilder::new("date > $TARGET").always_build(true).build())
        .build();
    let b = TestBuild::new(cfg);

    b.run(&[], &build_config(1)).await;
    b.run(&[], &build_config(1)).await;

    assert_eq!(b.runner.invocations(), vec!["stamp", "stamp"]);
}

#[tokio::test]
async fn ignored_child_changes_do_not_rebuild() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_node(
            "out",
            NodeConfigBuilder::new("build $TARGET")
                .source_file("in")
                .depends("notes.txt")
                .ignore("notes.txt")
                .build(),
        )
        .build();
    let b = TestBuild::new(cfg);
    b.fs.add_file("in", "x");
    b.fs.add_file("notes.txt", "first");
    b.run(&[], &build_config(1)).await;

    b.fs.add_file("notes.txt", "second");
    b.runner.reset();
    let outcome = b.run(&[], &build_config(1)).await;

    assert_eq!(outcome.status, BuildStatus::Success);
    assert!(b.runner.invocations().is_empty());
}

#[tokio::test]
async fn graph_can_be_cleared_and_walked_again() {
    init_tracing();

    let b = TestBuild::new(diamond_config());
    b.fs.add_file("c.src", "source");
    let first = b.run(&[], &build_config(1)).await;

    let mut graph = first.graph;
    graph.clear();
    let root = graph.lookup("root").unwrap();
    assert_eq!(graph.node(root).state(), NodeState::NoState);
    assert_eq!(graph.node(root).ref_count(), 0);

    b.runner.reset();
    let tm = Taskmaster::new(graph, first.env, &[root], &build_config(1));
    let second = with_timeout(Jobs::new(tm, Arc::new(b.runner.clone())).run()).await;

    assert_eq!(second.status, BuildStatus::Success);
    assert!(b.runner.invocations().is_empty());
}

/// A store that cannot write.
struct ReadOnlyStore {
    fail_flush: bool,
}

impl SignatureStore for ReadOnlyStore {
    fn load(&self, _key: &str) -> anyhow::Result<Option<BuildInfo>> {
        Ok(None)
    }

    fn save(&mut self, key: &str, _info: &BuildInfo) -> anyhow::Result<()> {
        Err(anyhow!("read-only store, cannot save '{key}'"))
    }

    fn prune(&mut self, _active: &[&str]) -> anyhow::Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        if self.fail_flush {
            Err(anyhow!("disk full"))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn store_save_failure_is_only_a_warning() {
    init_tracing();

    let b = TestBuild::new(fork_config());
    b.fs.add_file("a.src", "a");
    let env = BuildEnv::new(
        Arc::new(b.fs.clone()),
        Box::new(ReadOnlyStore { fail_flush: false }),
    );

    let tm = b.taskmaster_with_env(&["a"], &build_config(1), env);
    let outcome = with_timeout(Jobs::new(tm, Arc::new(b.runner.clone())).run()).await;

    assert_eq!(outcome.status, BuildStatus::Success);
    assert_eq!(state_of(&outcome, "a"), NodeState::Executed);
    assert_eq!(b.runner.invocations(), vec!["a"]);
    assert_eq!(outcome.report.warnings.len(), 1);
    assert!(
        outcome.report.warnings[0].contains("'a'"),
        "{:?}",
        outcome.report.warnings
    );
    assert!(outcome.report.summary().contains("warning"));
}

#[tokio::test]
async fn store_flush_failure_is_only_a_warning() {
    init_tracing();

    let b = TestBuild::new(fork_config());
    b.fs.add_file("a.src", "a");
    b.fs.add_file("b.src", "b");
    let env = BuildEnv::new(
        Arc::new(b.fs.clone()),
        Box::new(ReadOnlyStore { fail_flush: true }),
    );

    let tm = b.taskmaster_with_env(&[], &build_config(2), env);
    let outcome = with_timeout(Jobs::new(tm, Arc::new(b.runner.clone())).run()).await;

    assert_eq!(outcome.status, BuildStatus::Success);
    assert_eq!(b.runner.invocations().len(), 3);
    assert!(
        outcome
            .report
            .warnings
            .iter()
            .any(|w| w.contains("failed to write signature store") && w.contains("disk full")),
        "{:?}",
        outcome.report.warnings
    );
}
