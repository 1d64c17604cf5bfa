// tests/cycle_detection.rs

mod common;

use std::time::Duration;

use dagbuild::report::BuildStatus;
use dagbuild_test_utils::builders::{ConfigFileBuilder, NodeConfigBuilder};
use dagbuild_test_utils::{init_tracing, TestBuild};

use common::{build_config, keep_going_config};

#[tokio::test]
async fn back_edge_is_reported_with_its_exact_path() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_node("A", NodeConfigBuilder::new("build $TARGET").source_file("B").build())
        .with_node("B", NodeConfigBuilder::new("build $TARGET").source_file("C").build())
        .with_node("C", NodeConfigBuilder::new("build $TARGET").source_file("A").build())
        .build();
    let b = TestBuild::new(cfg);

    let outcome = b.run(&["A"], &build_config(1)).await;

    assert_eq!(outcome.status, BuildStatus::CycleDetected);
    assert_eq!(
        outcome.report.cycles,
        vec![vec![
            "A".to_string(),
            "B".to_string(),
            "C".to_string(),
            "A".to_string()
        ]]
    );
    assert!(b.runner.invocations().is_empty());
    assert!(outcome.report.summary().contains("A -> B -> C -> A"));
}

#[tokio::test]
async fn self_dependency_is_a_cycle() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_node("loop", NodeConfigBuilder::new("build $TARGET").depends("loop").build())
        .build();
    let b = TestBuild::new(cfg);

    let outcome = b.run(&["loop"], &build_config(1)).await;

    assert_eq!(outcome.status, BuildStatus::CycleDetected);
    assert_eq!(
        outcome.report.cycles,
        vec![vec!["loop".to_string(), "loop".to_string()]]
    );
}

#[tokio::test]
async fn diamond_with_pending_child_is_not_a_cycle() {
    init_tracing();

    // A -> B, A -> C, B -> D, C -> D, D -> E. With two jobs, C is examined
    // while D still waits for E, so D is seen pending.
    let cfg = ConfigFileBuilder::new()
        .with_node(
            "A",
            NodeConfigBuilder::new("build $TARGET")
                .source_file("B")
                .source_file("C")
                .build(),
        )
        .with_node("B", NodeConfigBuilder::new("build $TARGET").source_file("D").build())
        .with_node("C", NodeConfigBuilder::new("build $TARGET").source_file("D").build())
        .with_node("D", NodeConfigBuilder::new("build $TARGET").source_file("E").build())
        .with_node("E", NodeConfigBuilder::new("build $TARGET").build())
        .build();
    let b = TestBuild::new(cfg).with_runner(|r| r.delay(Duration::from_millis(5)));

    let outcome = b.run(&["A"], &build_config(2)).await;

    assert_eq!(outcome.status, BuildStatus::Success);
    assert!(outcome.report.cycles.is_empty());
    assert_eq!(b.runner.invocations().len(), 5);
    assert_eq!(
        b.runner.invocations().iter().filter(|n| *n == "D").count(),
        1
    );
}

#[tokio::test]
async fn cycle_does_not_hide_independent_work() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_node("X", NodeConfigBuilder::new("build $TARGET").source_file("Y").build())
        .with_node("Y", NodeConfigBuilder::new("build $TARGET").source_file("X").build())
        .with_node("free", NodeConfigBuilder::new("build $TARGET").build())
        .build();
    let b = TestBuild::new(cfg);

    let outcome = b.run(&["X", "free"], &build_config(1)).await;

    assert_eq!(outcome.status, BuildStatus::CycleDetected);
    assert_eq!(b.runner.invocations(), vec!["free"]);
    assert_eq!(outcome.report.cycles.len(), 1);
    assert_eq!(outcome.report.cycles[0].first(), outcome.report.cycles[0].last());
}

/// `bad` fails after a short delay; `A -> B -> A` is walked meanwhile.
fn failure_beside_a_cycle() -> TestBuild {
    let cfg = ConfigFileBuilder::new()
        .with_node("bad", NodeConfigBuilder::new("build $TARGET").build())
        .with_node("A", NodeConfigBuilder::new("build $TARGET").source_file("B").build())
        .with_node("B", NodeConfigBuilder::new("build $TARGET").source_file("A").build())
        .build();
    TestBuild::new(cfg).with_runner(|r| r.fail("bad").delay(Duration::from_millis(20)))
}

#[tokio::test]
async fn cycle_is_reported_after_the_walk_stops_on_a_failure() {
    init_tracing();

    let b = failure_beside_a_cycle();

    let outcome = b.run(&["bad", "A"], &build_config(2)).await;

    assert_eq!(outcome.status, BuildStatus::CycleDetected);
    assert_eq!(
        outcome.report.cycles,
        vec![vec!["A".to_string(), "B".to_string(), "A".to_string()]]
    );
    assert_eq!(outcome.report.failed_nodes().collect::<Vec<_>>(), vec!["bad"]);
    assert_eq!(b.runner.invocations(), vec!["bad"]);
}

#[tokio::test]
async fn cycle_is_reported_alongside_a_failure_when_keeping_going() {
    init_tracing();

    let b = failure_beside_a_cycle();

    let outcome = b.run(&["bad", "A"], &keep_going_config(2)).await;

    assert_eq!(outcome.status, BuildStatus::CycleDetected);
    assert_eq!(
        outcome.report.cycles,
        vec![vec!["A".to_string(), "B".to_string(), "A".to_string()]]
    );
    assert_eq!(outcome.report.failed_nodes().collect::<Vec<_>>(), vec!["bad"]);
}

#[tokio::test]
async fn stopping_with_a_pending_diamond_child_is_not_a_cycle() {
    init_tracing();

    // As above, but E fails: D is still pending for C when the walk stops.
    let cfg = ConfigFileBuilder::new()
        .with_node(
            "A",
            NodeConfigBuilder::new("build $TARGET")
                .source_file("B")
                .source_file("C")
                .build(),
        )
        .with_node("B", NodeConfigBuilder::new("build $TARGET").source_file("D").build())
        .with_node("C", NodeConfigBuilder::new("build $TARGET").source_file("D").build())
        .with_node("D", NodeConfigBuilder::new("build $TARGET").source_file("E").build())
        .with_node("E", NodeConfigBuilder::new("build $TARGET").build())
        .build();
    let b = TestBuild::new(cfg).with_runner(|r| r.fail("E").delay(Duration::from_millis(5)));

    let outcome = b.run(&["A"], &build_config(2)).await;

    assert_eq!(outcome.status, BuildStatus::BuildFailed);
    assert!(outcome.report.cycles.is_empty());
    assert!(outcome.report.internal_errors.is_empty());
    assert_eq!(b.runner.invocations(), vec!["E"]);
}
