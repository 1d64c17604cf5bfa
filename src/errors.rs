// src/errors.rs

//! Crate-wide error types.
//!
//! - [`DagbuildError`] covers failures of the surrounding machinery
//!   (configuration, IO, TOML).
//! - [`TaskError`] is the build-time taxonomy: every problem a task can hit
//!   while the graph is walked and executed ends up as one of these.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagbuildError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialisation error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of a [`TaskError`], used for reporting and for the
/// final exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    User,
    Build,
    Cycle,
    Internal,
    Interrupted,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Static graph defect: missing dependency, failed scan, bad declaration.
    #[error("{message}")]
    User { node: String, message: String },

    /// The action ran and reported failure.
    #[error("building `{node}' failed: {message}")]
    Build { node: String, message: String },

    /// One or more dependency cycles, each as a path that starts and ends on
    /// the same node.
    #[error("{}", describe_cycles(.cycles))]
    Cycle { cycles: Vec<Vec<String>> },

    /// Scheduler bookkeeping went wrong.
    #[error("internal error: {0}")]
    Internal(String),

    /// The build was interrupted while this task was in flight.
    #[error("interrupted while building `{node}'")]
    Interrupted { node: String },
}

impl TaskError {
    pub fn user(node: impl Into<String>, message: impl Into<String>) -> Self {
        TaskError::User {
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn build(node: impl Into<String>, message: impl Into<String>) -> Self {
        TaskError::Build {
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::User { .. } => ErrorKind::User,
            TaskError::Build { .. } => ErrorKind::Build,
            TaskError::Cycle { .. } => ErrorKind::Cycle,
            TaskError::Internal(_) => ErrorKind::Internal,
            TaskError::Interrupted { .. } => ErrorKind::Interrupted,
        }
    }

    /// Node the error is attached to, when there is one.
    pub fn node(&self) -> Option<&str> {
        match self {
            TaskError::User { node, .. }
            | TaskError::Build { node, .. }
            | TaskError::Interrupted { node } => Some(node),
            TaskError::Cycle { .. } | TaskError::Internal(_) => None,
        }
    }
}

fn describe_cycles(cycles: &[Vec<String>]) -> String {
    let mut desc = String::from("Found dependency cycle(s):");
    for cycle in cycles {
        desc.push_str("\n  ");
        desc.push_str(&cycle.join(" -> "));
    }
    desc
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagbuildError>;
