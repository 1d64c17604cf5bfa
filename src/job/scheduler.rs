// src/job/scheduler.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::env::BuildEnv;
use crate::errors::TaskError;
use crate::exec::{ActionRunner, WorkItem};
use crate::fs::FileSystem;
use crate::job::JobEvent;
use crate::node::NodeGraph;
use crate::report::{BuildReport, BuildStatus};
use crate::task::{Task, TaskId};
use crate::taskmaster::Taskmaster;

/// Everything left after a pass: the verdict, the report, and the graph and
/// environment for callers that want to run another pass.
pub struct BuildOutcome {
    pub status: BuildStatus,
    pub report: BuildReport,
    pub graph: NodeGraph,
    pub env: BuildEnv,
}

impl fmt::Debug for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildOutcome")
            .field("status", &self.status)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

/// Drains a [`Taskmaster`] with at most `max_parallel` tasks in flight.
///
/// With `max_parallel == 1` the order of execution is exactly the walk
/// order.
pub struct Jobs {
    tm: Taskmaster,
    runner: Arc<dyn ActionRunner>,
    fs: Arc<dyn FileSystem>,
    max_parallel: usize,
    event_tx: mpsc::Sender<JobEvent>,
    event_rx: mpsc::Receiver<JobEvent>,
    in_flight: HashMap<TaskId, Task>,
    interrupted: bool,
}

impl fmt::Debug for Jobs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jobs")
            .field("max_parallel", &self.max_parallel)
            .field("in_flight", &self.in_flight.len())
            .field("interrupted", &self.interrupted)
            .finish_non_exhaustive()
    }
}

impl Jobs {
    pub fn new(tm: Taskmaster, runner: Arc<dyn ActionRunner>) -> Self {
        let max_parallel = tm.config().max_parallel.max(1);
        let fs = Arc::clone(&tm.env().fs);
        let (event_tx, event_rx) = mpsc::channel(max_parallel.max(64));
        Self {
            tm,
            runner,
            fs,
            max_parallel,
            event_tx,
            event_rx,
            in_flight: HashMap::new(),
            interrupted: false,
        }
    }

    /// Sender for out-of-band events such as [`JobEvent::InterruptRequested`].
    pub fn event_sender(&self) -> mpsc::Sender<JobEvent> {
        self.event_tx.clone()
    }

    pub fn taskmaster(&self) -> &Taskmaster {
        &self.tm
    }

    /// Run until no task is ready and none is in flight.
    pub async fn run(mut self) -> BuildOutcome {
        info!(max_parallel = self.max_parallel, "job scheduler started");

        loop {
            while let Ok(event) = self.event_rx.try_recv() {
                self.handle_event(event);
            }

            while self.in_flight.len() < self.max_parallel {
                let Some(task) = self.tm.next_task() else {
                    break;
                };
                self.start(task);

                while let Ok(event) = self.event_rx.try_recv() {
                    self.handle_event(event);
                }
            }

            if self.in_flight.is_empty() {
                break;
            }

            debug!(in_flight = self.in_flight.len(), "waiting for a task to finish");
            match self.event_rx.recv().await {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }

        self.finish()
    }

    fn handle_event(&mut self, event: JobEvent) {
        match event {
            JobEvent::TaskFinished { task_id, result } => match self.in_flight.remove(&task_id) {
                Some(task) => self.complete(task, result),
                None => warn!(task_id = %task_id, "completion for unknown task"),
            },
            JobEvent::InterruptRequested => {
                if !self.interrupted {
                    warn!(
                        in_flight = self.in_flight.len(),
                        "interrupt requested; waiting for running tasks to finish"
                    );
                    self.interrupted = true;
                    self.tm.report.interrupted = true;
                    self.tm.stop();
                }
            }
        }
    }

    /// Prepare a task and either finish it inline or hand it to a worker.
    fn start(&mut self, mut task: Task) {
        if let Err(err) = task.prepare(&mut self.tm) {
            self.complete(task, Err(err));
            return;
        }

        if !task.needs_execute(&self.tm) {
            self.complete(task, Ok(()));
            return;
        }

        let item = match task.work_item(&mut self.tm) {
            Ok(item) => item,
            Err(err) => {
                self.complete(task, Err(err));
                return;
            }
        };

        if item.is_inline() {
            let result = item.run_inline(self.fs.as_ref());
            self.complete(task, result);
            return;
        }

        self.spawn(task, item);
    }

    fn spawn(&mut self, task: Task, item: WorkItem) {
        let task_id = task.id();
        let node = self.tm.graph().key(task.node()).to_string();
        debug!(task_id = %task_id, node = %node, "dispatching task to worker");

        let tx = self.event_tx.clone();
        let runner = Arc::clone(&self.runner);
        let fs = Arc::clone(&self.fs);
        tokio::spawn(async move {
            // A panicking runner becomes a build failure of this task.
            let result = match tokio::spawn(item.run(runner, fs)).await {
                Ok(result) => result,
                Err(join_err) => Err(TaskError::build(
                    node.as_str(),
                    format!("worker failed: {join_err}"),
                )),
            };
            if tx
                .send(JobEvent::TaskFinished { task_id, result })
                .await
                .is_err()
            {
                debug!(task_id = %task_id, "job scheduler gone; dropping result");
            }
        });

        self.in_flight.insert(task_id, task);
    }

    /// `executed`/`failed` followed by `postprocess`, on the coordinator.
    fn complete(&mut self, mut task: Task, result: Result<(), TaskError>) {
        // Only in-flight tasks complete after an interrupt.
        let result = if self.interrupted {
            Err(TaskError::Interrupted {
                node: self.tm.graph().key(task.node()).to_string(),
            })
        } else {
            result
        };

        match result {
            Ok(()) => {
                if let Err(err) = task.executed(&mut self.tm) {
                    task.failed(&mut self.tm, err);
                }
            }
            Err(err) => task.failed(&mut self.tm, err),
        }

        if let Err(err) = task.postprocess(&mut self.tm) {
            self.tm.record_internal(err);
        }
    }

    fn finish(mut self) -> BuildOutcome {
        if let Err(err) = self.tm.cleanup() {
            self.tm.report.record_failure(&err);
        }
        if let Err(e) = self.tm.env.store.flush() {
            warn!(error = %e, "failed to write signature store");
            self.tm
                .report
                .warnings
                .push(format!("failed to write signature store: {e:#}"));
        }

        let (graph, env, report) = self.tm.into_parts();
        let status = report.status();
        info!(status = status.as_str(), "build finished");

        BuildOutcome {
            status,
            report,
            graph,
            env,
        }
    }
}
