// src/report.rs

//! Outcome of one build pass.

use std::fmt::Write as _;

use crate::errors::{ErrorKind, TaskError};

/// Final status of an invocation, most severe condition first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStatus {
    Success,
    /// Question mode found something to rebuild.
    OutOfDate,
    BuildFailed,
    UserError,
    CycleDetected,
    InternalError,
    Interrupted,
}

impl BuildStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            BuildStatus::Success => 0,
            BuildStatus::OutOfDate => 1,
            BuildStatus::BuildFailed => 2,
            BuildStatus::UserError => 3,
            BuildStatus::CycleDetected => 4,
            BuildStatus::InternalError => 5,
            BuildStatus::Interrupted => 130,
        }
    }

    pub fn is_success(self) -> bool {
        self == BuildStatus::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Success => "success",
            BuildStatus::OutOfDate => "out_of_date",
            BuildStatus::BuildFailed => "build_failed",
            BuildStatus::UserError => "user_error",
            BuildStatus::CycleDetected => "cycle_detected",
            BuildStatus::InternalError => "internal_error",
            BuildStatus::Interrupted => "interrupted",
        }
    }
}

/// A failure that originated at `node` (not one inherited from a child).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub node: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Everything worth telling the user after a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Targets whose action ran successfully, in completion order.
    pub executed: Vec<String>,
    /// Derived targets found current.
    pub up_to_date: Vec<String>,
    /// Originating failures, one per failed task.
    pub failures: Vec<FailureRecord>,
    /// Nodes skipped because something below them failed.
    pub not_built: Vec<String>,
    /// Targets question mode found stale.
    pub out_of_date: Vec<String>,
    /// Non-fatal problems, e.g. signature store writes that failed.
    pub warnings: Vec<String>,
    pub cycles: Vec<Vec<String>>,
    pub internal_errors: Vec<String>,
    pub interrupted: bool,
}

impl BuildReport {
    pub(crate) fn record_failure(&mut self, err: &TaskError) {
        match err {
            TaskError::Cycle { cycles } => self.cycles.extend(cycles.iter().cloned()),
            TaskError::Internal(msg) => self.internal_errors.push(msg.clone()),
            TaskError::Interrupted { .. } => self.interrupted = true,
            TaskError::User { node, .. } | TaskError::Build { node, .. } => {
                self.failures.push(FailureRecord {
                    node: node.clone(),
                    kind: err.kind(),
                    message: err.to_string(),
                });
            }
        }
    }

    pub fn failed_nodes(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.node.as_str())
    }

    pub fn status(&self) -> BuildStatus {
        let has = |kind: ErrorKind| self.failures.iter().any(|f| f.kind == kind);

        if self.interrupted {
            BuildStatus::Interrupted
        } else if !self.internal_errors.is_empty() {
            BuildStatus::InternalError
        } else if !self.cycles.is_empty() {
            BuildStatus::CycleDetected
        } else if has(ErrorKind::Build) {
            BuildStatus::BuildFailed
        } else if has(ErrorKind::User) {
            BuildStatus::UserError
        } else if !self.out_of_date.is_empty() {
            BuildStatus::OutOfDate
        } else {
            BuildStatus::Success
        }
    }

    /// Multi-line, human-readable summary naming every failed target.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "{} executed, {} up to date",
            self.executed.len(),
            self.up_to_date.len()
        );
        if !self.failures.is_empty() {
            let _ = write!(out, ", {} failed", self.failures.len());
        }
        if !self.not_built.is_empty() {
            let _ = write!(out, ", {} not built", self.not_built.len());
        }

        for f in &self.failures {
            let _ = write!(out, "\n  error: {}", f.message);
        }
        if !self.cycles.is_empty() {
            let _ = write!(out, "\n  {}", TaskError::Cycle {
                cycles: self.cycles.clone()
            });
        }
        for msg in &self.internal_errors {
            let _ = write!(out, "\n  internal error: {msg}");
        }
        for t in &self.out_of_date {
            let _ = write!(out, "\n  out of date: {t}");
        }
        for w in &self.warnings {
            let _ = write!(out, "\n  warning: {w}");
        }
        if self.interrupted {
            out.push_str("\n  build interrupted");
        }
        out
    }
}
