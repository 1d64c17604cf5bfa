// src/exec/runner.rs

//! Running one expanded action.

use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Everything a runner needs to execute a task's action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    /// Key of the task's primary target.
    pub node: String,
    /// Command line with `$TARGET`-style variables already expanded.
    pub command: String,
    pub targets: Vec<String>,
    pub sources: Vec<String>,
    /// Working directory; empty means the current directory.
    pub cwd: PathBuf,
}

/// Outcome of one action invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub success: bool,
    pub diagnostic: String,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            diagnostic: String::new(),
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Runs actions on behalf of the job scheduler.
///
/// Production code uses [`ShellActionRunner`]; tests plug in a recording
/// fake. Implementations run on worker tasks and must not touch the graph.
pub trait ActionRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        req: &'a ActionRequest,
    ) -> Pin<Box<dyn Future<Output = ActionResult> + Send + 'a>>;
}

/// Runs the command through the platform shell.
#[derive(Debug, Clone)]
pub struct ShellActionRunner {
    /// Number of trailing stderr lines kept for the failure diagnostic.
    stderr_tail: usize,
}

impl Default for ShellActionRunner {
    fn default() -> Self {
        Self { stderr_tail: 20 }
    }
}

impl ShellActionRunner {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run_inner(&self, req: &ActionRequest) -> Result<ActionResult> {
        info!(node = %req.node, cmd = %req.command, "running action");

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&req.command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&req.command);
            c
        };

        if !req.cwd.as_os_str().is_empty() {
            cmd.current_dir(&req.cwd);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning action for '{}'", req.node))?;

        // Drain stderr, keeping a tail for the diagnostic.
        let tail_len = self.stderr_tail.max(1);
        let stderr_task = child.stderr.take().map(|stderr| {
            let node = req.node.clone();
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(tail_len);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(node = %node, "stderr: {}", line);
                    if tail.len() == tail_len {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                tail.into_iter().collect::<Vec<_>>().join("\n")
            })
        });

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for action of '{}'", req.node))?;

        let stderr_tail = match stderr_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        let code = status.code().unwrap_or(-1);
        info!(
            node = %req.node,
            exit_code = code,
            success = status.success(),
            "action exited"
        );

        if status.success() {
            Ok(ActionResult::ok())
        } else if stderr_tail.is_empty() {
            Ok(ActionResult::failed(format!("exit code {code}")))
        } else {
            Ok(ActionResult::failed(format!(
                "exit code {code}\n{stderr_tail}"
            )))
        }
    }
}

impl ActionRunner for ShellActionRunner {
    fn run<'a>(
        &'a self,
        req: &'a ActionRequest,
    ) -> Pin<Box<dyn Future<Output = ActionResult> + Send + 'a>> {
        Box::pin(async move {
            match self.run_inner(req).await {
                Ok(result) => result,
                Err(err) => ActionResult::failed(format!("{err:#}")),
            }
        })
    }
}
