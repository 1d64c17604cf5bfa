// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::TaskMode;

/// Command-line arguments for `dagbuild`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagbuild",
    version,
    about = "Incremental, dependency-ordered builds with bounded parallelism.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the build description (TOML).
    #[arg(long, value_name = "PATH", default_value = "Dagbuild.toml")]
    pub config: String,

    /// Maximum number of actions running at once (overrides `[config].jobs`).
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Keep building independent targets after a failure.
    #[arg(short = 'k', long)]
    pub keep_going: bool,

    /// What to do with out-of-date targets.
    #[arg(long, value_enum, default_value_t = TaskMode::Build)]
    pub mode: TaskMode,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGBUILD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the description and print its nodes in dependency order
    /// without building anything.
    #[arg(long)]
    pub plan: bool,

    /// Targets to build; defaults to `[config].default_targets` or every
    /// node nothing else depends on.
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_make_style_flags() {
        let args = CliArgs::try_parse_from([
            "dagbuild", "-j", "4", "-k", "--mode", "dry-run", "app", "lib.a",
        ])
        .unwrap();
        assert_eq!(args.jobs, Some(4));
        assert!(args.keep_going);
        assert_eq!(args.mode, TaskMode::DryRun);
        assert_eq!(args.targets, vec!["app".to_string(), "lib.a".to_string()]);
        assert_eq!(args.config, "Dagbuild.toml");
    }
}
