use std::str::FromStr;

use serde::Deserialize;

/// What happens to the rest of the build when an action fails.
///
/// - `Stop`: let in-flight tasks finish, then halt without dispatching
///   anything new (default).
/// - `KeepGoing`: mark the failed subtree and keep building independent work.
///
/// Static graph defects (missing dependencies) never stop the walk,
/// regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    Stop,
    KeepGoing,
}

impl FailurePolicy {
    pub fn from_keep_going(keep_going: bool) -> Self {
        if keep_going {
            FailurePolicy::KeepGoing
        } else {
            FailurePolicy::Stop
        }
    }
}

/// What "building" a ready node means for this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TaskMode {
    /// Run actions for out-of-date targets.
    #[default]
    Build,
    /// Remove every derived target.
    Clean,
    /// Only report whether targets are up to date.
    Question,
    /// Print the commands that would run.
    DryRun,
}

impl FromStr for TaskMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "build" => Ok(TaskMode::Build),
            "clean" => Ok(TaskMode::Clean),
            "question" => Ok(TaskMode::Question),
            "dry-run" | "dry_run" => Ok(TaskMode::DryRun),
            other => Err(format!(
                "invalid mode: {other} (expected \"build\", \"clean\", \"question\" or \"dry-run\")"
            )),
        }
    }
}

/// Where build signatures are persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignatureStoreMode {
    /// Store signatures in a TOML file (`.dagbuild/signatures.toml`).
    #[default]
    File,
    /// Keep signatures in memory only (lost on exit).
    Memory,
}

/// Immutable per-invocation settings, assembled once from the CLI and the
/// `[config]` section and handed to the taskmaster and the job scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildConfig {
    /// Maximum number of concurrently executing tasks (at least 1).
    pub max_parallel: usize,
    pub failure_policy: FailurePolicy,
    pub mode: TaskMode,
}

impl BuildConfig {
    pub fn new(max_parallel: usize, failure_policy: FailurePolicy, mode: TaskMode) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            failure_policy,
            mode,
        }
    }

    pub fn keep_going(&self) -> bool {
        self.failure_policy == FailurePolicy::KeepGoing
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self::new(1, FailurePolicy::Stop, TaskMode::Build)
    }
}
