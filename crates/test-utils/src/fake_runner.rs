use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;

use dagbuild::exec::{ActionRequest, ActionResult, ActionRunner};
use dagbuild::fs::FileSystem;
use dagbuild::fs::mock::MockFileSystem;
use dagbuild::job::JobEvent;

/// What the fake runner saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Started(String),
    Finished(String),
}

#[derive(Default)]
struct State {
    events: Vec<RunEvent>,
    running: usize,
    max_running: usize,
    interrupt: Option<(String, mpsc::Sender<JobEvent>)>,
}

/// An `ActionRunner` that never spawns a process:
/// - records start/finish order and peak concurrency
/// - writes every target into a `MockFileSystem` on success
/// - fails configured nodes with a fixed diagnostic
/// - optionally sends `InterruptRequested` when a given node starts.
#[derive(Clone)]
pub struct FakeRunner {
    fs: MockFileSystem,
    failing: Arc<HashSet<String>>,
    outputs: Arc<HashMap<String, String>>,
    delay: Option<Duration>,
    state: Arc<Mutex<State>>,
}

impl FakeRunner {
    pub fn new(fs: MockFileSystem) -> Self {
        Self {
            fs,
            failing: Arc::new(HashSet::new()),
            outputs: Arc::new(HashMap::new()),
            delay: None,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Make the action of `node` fail.
    pub fn fail(mut self, node: &str) -> Self {
        Arc::make_mut(&mut self.failing).insert(node.to_string());
        self
    }

    /// Write `content` into `node` instead of the command line.
    pub fn output(mut self, node: &str, content: &str) -> Self {
        Arc::make_mut(&mut self.outputs).insert(node.to_string(), content.to_string());
        self
    }

    /// Sleep inside every action so that parallel runs overlap.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Request an interrupt through `tx` as soon as `node` starts.
    pub fn interrupt_when_started(&self, node: &str, tx: mpsc::Sender<JobEvent>) {
        self.lock().interrupt = Some((node.to_string(), tx));
    }

    /// Nodes whose action was invoked, in start order.
    pub fn invocations(&self) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                RunEvent::Started(n) => Some(n.clone()),
                RunEvent::Finished(_) => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.lock().events.clone()
    }

    /// Highest number of actions that were running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.lock().max_running
    }

    /// Forget everything recorded so far.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.events.clear();
        state.running = 0;
        state.max_running = 0;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn run_inner(&self, req: &ActionRequest) -> ActionResult {
        let interrupt = {
            let mut state = self.lock();
            state.events.push(RunEvent::Started(req.node.clone()));
            state.running += 1;
            state.max_running = state.max_running.max(state.running);
            match &state.interrupt {
                Some((node, tx)) if *node == req.node => Some(tx.clone()),
                _ => None,
            }
        };

        if let Some(tx) = interrupt {
            let _ = tx.send(JobEvent::InterruptRequested).await;
        }

        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let result = if self.failing.contains(&req.node) {
            ActionResult::failed(format!("fake failure of {}", req.node))
        } else {
            for target in &req.targets {
                let content = self
                    .outputs
                    .get(target)
                    .cloned()
                    .unwrap_or_else(|| req.command.clone());
                self.fs
                    .write(Path::new(target), content.as_bytes())
                    .expect("mock write cannot fail");
            }
            ActionResult::ok()
        };

        let mut state = self.lock();
        state.running -= 1;
        state.events.push(RunEvent::Finished(req.node.clone()));
        result
    }
}

impl ActionRunner for FakeRunner {
    fn run<'a>(
        &'a self,
        req: &'a ActionRequest,
    ) -> Pin<Box<dyn Future<Output = ActionResult> + Send + 'a>> {
        Box::pin(self.run_inner(req))
    }
}
