// tests/property_scheduler.rs

use std::collections::{BTreeSet, HashSet};

use proptest::prelude::*;

use dagbuild::config::ConfigFile;
use dagbuild::errors::TaskError;
use dagbuild::node::NodeState;
use dagbuild::task::Task;
use dagbuild::types::{BuildConfig, FailurePolicy, TaskMode};
use dagbuild_test_utils::builders::{ConfigFileBuilder, NodeConfigBuilder};
use dagbuild_test_utils::TestBuild;

/// A random DAG: node `n{i}` may only depend on `n{j}` with `j < i`.
#[derive(Debug, Clone)]
struct Dag {
    deps: Vec<BTreeSet<usize>>,
}

impl Dag {
    fn name(i: usize) -> String {
        format!("n{i}")
    }

    fn config(&self) -> ConfigFile {
        let mut builder = ConfigFileBuilder::new();
        for (i, deps) in self.deps.iter().enumerate() {
            let mut node = NodeConfigBuilder::new("build $TARGET");
            for d in deps {
                node = node.source_file(&Self::name(*d));
            }
            builder = builder.with_node(&Self::name(i), node.build());
        }
        builder.build()
    }

    /// Nodes that are failing or depend (transitively) on a failing node.
    fn tainted(&self, failing: &BTreeSet<usize>) -> BTreeSet<usize> {
        let mut tainted = BTreeSet::new();
        // Dependencies always have a smaller index.
        for (i, deps) in self.deps.iter().enumerate() {
            if failing.contains(&i) || deps.iter().any(|d| tainted.contains(d)) {
                tainted.insert(i);
            }
        }
        tainted
    }
}

fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = Dag> {
    (1..=max_nodes).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n).prop_map(
            |raw| {
                let deps = raw
                    .into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        if i == 0 {
                            BTreeSet::new()
                        } else {
                            picks.into_iter().map(|p| p % i).collect()
                        }
                    })
                    .collect();
                Dag { deps }
            },
        )
    })
}

/// What the simulated job loop observed.
#[derive(Debug, Default)]
struct Trace {
    dispatched: Vec<String>,
    states: Vec<(String, NodeState)>,
}

/// Drive a taskmaster by hand, completing in-flight tasks in the order
/// chosen by `picks`, and check the bookkeeping after every step.
fn simulate(
    dag: &Dag,
    jobs: usize,
    keep_going: bool,
    failing: &BTreeSet<usize>,
    picks: &[usize],
) -> Result<Trace, TestCaseError> {
    let build = TestBuild::new(dag.config());
    let config = BuildConfig::new(jobs, FailurePolicy::from_keep_going(keep_going), TaskMode::Build);
    let mut tm = build.taskmaster(&[], &config);

    let failing: HashSet<String> = failing.iter().map(|i| Dag::name(*i)).collect();
    let mut picks = picks.iter().copied().cycle();
    let mut in_flight: Vec<Task> = Vec::new();
    let mut trace = Trace::default();
    let mut failure_seen = false;

    loop {
        while in_flight.len() < jobs {
            let Some(mut task) = tm.next_task() else {
                break;
            };
            if let Err(e) = tm.verify_invariants() {
                return Err(TestCaseError::fail(format!("after next_task: {e}")));
            }

            if let Err(err) = task.prepare(&mut tm) {
                task.failed(&mut tm, err);
                prop_assert!(task.postprocess(&mut tm).is_ok());
                continue;
            }
            if !task.needs_execute(&tm) {
                prop_assert!(task.executed(&mut tm).is_ok());
                prop_assert!(task.postprocess(&mut tm).is_ok());
                continue;
            }

            let key = tm.graph().key(task.node()).to_string();
            prop_assert!(
                keep_going || !failure_seen,
                "{key} dispatched after a failure under the stop policy"
            );
            for child in tm.graph().children(task.node()) {
                let state = tm.graph().node(child).state();
                prop_assert!(
                    matches!(state, NodeState::Executed | NodeState::UpToDate),
                    "{key} dispatched while child {} is {state}",
                    tm.graph().key(child)
                );
            }
            trace.dispatched.push(key);
            in_flight.push(task);
        }

        if in_flight.is_empty() {
            break;
        }

        let idx = picks.next().unwrap_or(0) % in_flight.len();
        let mut task = in_flight.swap_remove(idx);
        let key = tm.graph().key(task.node()).to_string();
        if failing.contains(&key) {
            failure_seen = true;
            task.failed(&mut tm, TaskError::build(key.as_str(), "simulated failure"));
        } else {
            prop_assert!(task.executed(&mut tm).is_ok());
        }
        prop_assert!(task.postprocess(&mut tm).is_ok());
        if let Err(e) = tm.verify_invariants() {
            return Err(TestCaseError::fail(format!("after completing {key}: {e}")));
        }
    }

    let cleanup = tm.cleanup();
    prop_assert!(cleanup.is_ok(), "acyclic graph reported {:?}", cleanup);

    let graph = tm.graph();
    trace.states = graph
        .ids()
        .map(|id| (graph.key(id).to_string(), graph.node(id).state()))
        .collect();
    Ok(trace)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn every_node_builds_once_in_dependency_order(
        dag in dag_strategy(12),
        jobs in 1..5usize,
        picks in proptest::collection::vec(any::<usize>(), 1..32),
    ) {
        let trace = simulate(&dag, jobs, false, &BTreeSet::new(), &picks)?;

        let unique: HashSet<&String> = trace.dispatched.iter().collect();
        prop_assert_eq!(unique.len(), trace.dispatched.len());
        prop_assert_eq!(trace.dispatched.len(), dag.deps.len());
        for (key, state) in &trace.states {
            prop_assert_eq!(*state, NodeState::Executed, "{} not executed", key);
        }
    }

    #[test]
    fn keep_going_finishes_everything_not_downstream_of_a_failure(
        dag in dag_strategy(12),
        jobs in 1..5usize,
        failing_raw in proptest::collection::vec(any::<usize>(), 0..4),
        picks in proptest::collection::vec(any::<usize>(), 1..32),
    ) {
        let n = dag.deps.len();
        let failing: BTreeSet<usize> = failing_raw.into_iter().map(|f| f % n).collect();
        let tainted = dag.tainted(&failing);

        let trace = simulate(&dag, jobs, true, &failing, &picks)?;

        let unique: HashSet<&String> = trace.dispatched.iter().collect();
        prop_assert_eq!(unique.len(), trace.dispatched.len());
        for i in 0..n {
            let key = Dag::name(i);
            let state = trace
                .states
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, s)| *s);
            if tainted.contains(&i) {
                prop_assert_eq!(state, Some(NodeState::Failed), "{} should have failed", key);
            } else {
                prop_assert_eq!(state, Some(NodeState::Executed), "{} should be built", key);
            }
        }
    }

    #[test]
    fn stop_policy_never_dispatches_after_a_failure(
        dag in dag_strategy(12),
        jobs in 1..5usize,
        failing_raw in proptest::collection::vec(any::<usize>(), 1..3),
        picks in proptest::collection::vec(any::<usize>(), 1..32),
    ) {
        let n = dag.deps.len();
        let failing: BTreeSet<usize> = failing_raw.into_iter().map(|f| f % n).collect();

        // The dispatch check lives inside `simulate`.
        let trace = simulate(&dag, jobs, false, &failing, &picks)?;

        let unique: HashSet<&String> = trace.dispatched.iter().collect();
        prop_assert_eq!(unique.len(), trace.dispatched.len());
    }
}
