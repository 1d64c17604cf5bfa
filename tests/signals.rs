// tests/signals.rs

// A separate test binary: the signal reaches every listener in the process.

#![cfg(unix)]

use std::fs;

use clap::Parser;
use tempfile::TempDir;

use dagbuild::cli::CliArgs;
use dagbuild::report::BuildStatus;
use dagbuild::run;
use dagbuild_test_utils::{init_tracing, with_timeout};

#[tokio::test]
async fn hangup_interrupts_the_build() {
    init_tracing();

    let dir = TempDir::new().unwrap();
    let config = dir.path().join("Dagbuild.toml");
    fs::write(
        &config,
        r#"
[node."slow.txt"]
cmd = "sleep 0.2; kill -HUP $PPID; sleep 0.5; echo done > $TARGET"

[node."after.txt"]
cmd = "cp $SOURCE $TARGET"
sources = ["slow.txt"]
"#,
    )
    .unwrap();

    let args = CliArgs::try_parse_from([
        "dagbuild",
        "--config",
        config.to_str().unwrap(),
        "after.txt",
    ])
    .unwrap();
    let status = with_timeout(run(args)).await.unwrap();

    assert_eq!(status, BuildStatus::Interrupted);
    assert_eq!(status.exit_code(), 130);
    assert!(!dir.path().join("after.txt").exists());
}
