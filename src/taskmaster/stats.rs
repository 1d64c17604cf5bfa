// src/taskmaster/stats.rs

use tracing::debug;

/// Per-pass counters of what the walk did with each candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub considered: u64,
    pub already_handled: u64,
    /// Scanning failed; the node was handed out with a pending error.
    pub problem: u64,
    pub child_failed: u64,
    /// Times a node had to wait on an unfinished child.
    pub not_built: u64,
    pub side_effects: u64,
    pub build: u64,
}

impl WalkStats {
    pub fn log(&self) {
        debug!(
            considered = self.considered,
            already_handled = self.already_handled,
            problem = self.problem,
            child_failed = self.child_failed,
            not_built = self.not_built,
            side_effects = self.side_effects,
            build = self.build,
            "walk statistics"
        );
    }
}
