// tests/task_modes.rs

mod common;

use dagbuild::node::NodeState;
use dagbuild::report::BuildStatus;
use dagbuild::types::TaskMode;
use dagbuild_test_utils::builders::{ConfigFileBuilder, NodeConfigBuilder};
use dagbuild_test_utils::{init_tracing, TestBuild};

use common::{build_config, diamond_config, mode_config, state_of};

async fn built_diamond() -> TestBuild {
    let b = TestBuild::new(diamond_config());
    b.fs.add_file("c.src", "source");
    let outcome = b.run(&[], &build_config(1)).await;
    assert_eq!(outcome.status, BuildStatus::Success);
    b.runner.reset();
    b
}

#[tokio::test]
async fn clean_removes_derived_files_and_keeps_sources() {
    init_tracing();

    let b = built_diamond().await;
    let outcome = b.run(&[], &mode_config(TaskMode::Clean)).await;

    assert_eq!(outcome.status, BuildStatus::Success);
    assert!(b.runner.invocations().is_empty());
    for node in ["a", "b", "c", "root"] {
        assert!(b.fs.contents(node).is_none(), "{node} still exists");
    }
    assert!(b.fs.contents("c.src").is_some());
}

#[tokio::test]
async fn clean_keeps_noclean_and_precious_targets() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_node(
            "all",
            NodeConfigBuilder::alias()
                .depends("cache")
                .depends("keep")
                .depends("tmp")
                .build(),
        )
        .with_node("cache", NodeConfigBuilder::new("build $TARGET").noclean(true).build())
        .with_node("keep", NodeConfigBuilder::new("build $TARGET").precious(true).build())
        .with_node(
            "tmp",
            NodeConfigBuilder::new("build $TARGET").side_effect("tmp.log").build(),
        )
        .build();
    let b = TestBuild::new(cfg);
    b.run(&[], &build_config(1)).await;
    b.fs.add_file("tmp.log", "log");

    let outcome = b.run(&[], &mode_config(TaskMode::Clean)).await;

    assert_eq!(outcome.status, BuildStatus::Success);
    assert!(b.fs.contents("cache").is_some());
    assert!(b.fs.contents("keep").is_some());
    assert!(b.fs.contents("tmp").is_none());
    assert!(b.fs.contents("tmp.log").is_none());
}

#[tokio::test]
async fn question_reports_out_of_date_without_building() {
    init_tracing();

    let b = TestBuild::new(diamond_config());
    b.fs.add_file("c.src", "source");

    let outcome = b.run(&[], &mode_config(TaskMode::Question)).await;

    assert_eq!(outcome.status, BuildStatus::OutOfDate);
    assert_eq!(outcome.status.exit_code(), 1);
    assert!(b.runner.invocations().is_empty());
    assert_eq!(outcome.report.out_of_date, vec!["c".to_string()]);
    assert!(b.fs.contents("c").is_none());
}

#[tokio::test]
async fn question_after_build_is_success() {
    init_tracing();

    let b = built_diamond().await;
    let outcome = b.run(&[], &mode_config(TaskMode::Question)).await;

    assert_eq!(outcome.status, BuildStatus::Success);
    assert!(outcome.report.out_of_date.is_empty());
    assert!(b.runner.invocations().is_empty());
}

#[tokio::test]
async fn dry_run_marks_everything_downstream_without_running_or_storing() {
    init_tracing();

    let b = TestBuild::new(diamond_config());
    b.fs.add_file("c.src", "source");

    let outcome = b.run(&[], &mode_config(TaskMode::DryRun)).await;

    assert_eq!(outcome.status, BuildStatus::Success);
    assert!(b.runner.invocations().is_empty());
    for node in ["c", "a", "b", "root"] {
        assert_eq!(state_of(&outcome, node), NodeState::Executed, "{node}");
        assert!(b.fs.contents(node).is_none());
    }
    assert!(b.store.is_empty());
}

#[tokio::test]
async fn dry_run_after_source_change_lists_only_stale_chain() {
    init_tracing();

    let b = built_diamond().await;
    b.fs.add_file("c.src", "edited");

    let outcome = b.run(&[], &mode_config(TaskMode::DryRun)).await;

    // Without running c its new bytes are unknown, so parents are assumed
    // stale too.
    assert_eq!(outcome.report.executed, vec!["c", "a", "b", "root"]);
    assert!(b.runner.invocations().is_empty());
}
