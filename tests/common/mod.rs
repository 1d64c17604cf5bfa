#![allow(dead_code)]

use dagbuild::config::ConfigFile;
use dagbuild::job::BuildOutcome;
use dagbuild::node::NodeState;
use dagbuild::types::{BuildConfig, FailurePolicy, TaskMode};
use dagbuild_test_utils::builders::{ConfigFileBuilder, NodeConfigBuilder};
use dagbuild_test_utils::fake_runner::RunEvent;

/// `root -> [a, b]`, `a -> c`, `b -> c`, with `c` built from the source
/// file `c.src`.
pub fn diamond_config() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_node(
            "root",
            NodeConfigBuilder::new("link $TARGET")
                .source_file("a")
                .source_file("b")
                .build(),
        )
        .with_node("a", NodeConfigBuilder::new("build $TARGET").source_file("c").build())
        .with_node("b", NodeConfigBuilder::new("build $TARGET").source_file("c").build())
        .with_node("c", NodeConfigBuilder::new("gen $TARGET").source_file("c.src").build())
        .build()
}

/// `root -> [a, b]` with `a` and `b` built from `a.src` and `b.src`.
pub fn fork_config() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_node(
            "root",
            NodeConfigBuilder::new("link $TARGET")
                .source_file("a")
                .source_file("b")
                .build(),
        )
        .with_node("a", NodeConfigBuilder::new("build $TARGET").source_file("a.src").build())
        .with_node("b", NodeConfigBuilder::new("build $TARGET").source_file("b.src").build())
        .build()
}

pub fn build_config(jobs: usize) -> BuildConfig {
    BuildConfig::new(jobs, FailurePolicy::Stop, TaskMode::Build)
}

pub fn keep_going_config(jobs: usize) -> BuildConfig {
    BuildConfig::new(jobs, FailurePolicy::KeepGoing, TaskMode::Build)
}

pub fn mode_config(mode: TaskMode) -> BuildConfig {
    BuildConfig::new(1, FailurePolicy::Stop, mode)
}

pub fn state_of(outcome: &BuildOutcome, key: &str) -> NodeState {
    let id = outcome
        .graph
        .lookup(key)
        .unwrap_or_else(|| panic!("no node '{key}'"));
    outcome.graph.node(id).state()
}

/// Position of an event in the runner's log.
pub fn position(events: &[RunEvent], event: &RunEvent) -> usize {
    events
        .iter()
        .position(|e| e == event)
        .unwrap_or_else(|| panic!("event {event:?} not recorded in {events:?}"))
}

pub fn started(node: &str) -> RunEvent {
    RunEvent::Started(node.to_string())
}

pub fn finished(node: &str) -> RunEvent {
    RunEvent::Finished(node.to_string())
}
