// tests/shell_build.rs

#![cfg(unix)]

use std::fs;
use std::path::Path;

use clap::Parser;
use tempfile::TempDir;

use dagbuild::cli::CliArgs;
use dagbuild::report::BuildStatus;
use dagbuild::run;
use dagbuild_test_utils::{init_tracing, with_timeout};

fn write_project(dir: &Path, description: &str) -> String {
    let config = dir.join("Dagbuild.toml");
    fs::write(&config, description).unwrap();
    config.to_string_lossy().into_owned()
}

fn args(config: &str, extra: &[&str]) -> CliArgs {
    let mut argv = vec!["dagbuild", "--config", config];
    argv.extend_from_slice(extra);
    CliArgs::try_parse_from(argv).unwrap()
}

const COPY: &str = r#"
[node."out.txt"]
cmd = "cat $SOURCE > $TARGET"
sources = ["in.txt"]
"#;

#[tokio::test]
async fn builds_with_the_shell_and_records_signatures() {
    init_tracing();

    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("in.txt"), "hello\n").unwrap();
    let config = write_project(dir.path(), COPY);

    let status = with_timeout(run(args(&config, &[]))).await.unwrap();

    assert_eq!(status, BuildStatus::Success);
    assert_eq!(fs::read_to_string(dir.path().join("out.txt")).unwrap(), "hello\n");
    let store = fs::read_to_string(dir.path().join(".dagbuild/signatures.toml")).unwrap();
    assert!(store.contains("out.txt"));

    let status = with_timeout(run(args(&config, &["--mode", "question"]))).await.unwrap();
    assert_eq!(status, BuildStatus::Success);

    fs::write(dir.path().join("in.txt"), "changed\n").unwrap();
    let status = with_timeout(run(args(&config, &["--mode", "question"]))).await.unwrap();
    assert_eq!(status, BuildStatus::OutOfDate);

    let status = with_timeout(run(args(&config, &[]))).await.unwrap();
    assert_eq!(status, BuildStatus::Success);
    assert_eq!(fs::read_to_string(dir.path().join("out.txt")).unwrap(), "changed\n");
}

#[tokio::test]
async fn failing_command_is_a_build_failure() {
    init_tracing();

    let dir = TempDir::new().unwrap();
    let config = write_project(
        dir.path(),
        r#"
[node.broken]
cmd = "echo nope >&2; exit 3"
"#,
    );

    let status = with_timeout(run(args(&config, &["-k"]))).await.unwrap();

    assert_eq!(status, BuildStatus::BuildFailed);
    assert_eq!(status.exit_code(), 2);
}

#[tokio::test]
async fn clean_removes_what_the_build_produced() {
    init_tracing();

    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("in.txt"), "hello\n").unwrap();
    let config = write_project(dir.path(), COPY);

    with_timeout(run(args(&config, &[]))).await.unwrap();
    assert!(dir.path().join("out.txt").exists());

    let status = with_timeout(run(args(&config, &["--mode", "clean"]))).await.unwrap();

    assert_eq!(status, BuildStatus::Success);
    assert!(!dir.path().join("out.txt").exists());
    assert!(dir.path().join("in.txt").exists());
}

#[tokio::test]
async fn plan_does_not_build() {
    init_tracing();

    let dir = TempDir::new().unwrap();
    let config = write_project(dir.path(), COPY);

    let status = with_timeout(run(args(&config, &["--plan"]))).await.unwrap();

    assert_eq!(status, BuildStatus::Success);
    assert!(!dir.path().join("out.txt").exists());
}

#[tokio::test]
async fn invalid_description_is_an_error() {
    init_tracing();

    let dir = TempDir::new().unwrap();
    let config = write_project(dir.path(), "[config]\njobs = 0\n[node.x]\ncmd = \"true\"\n");

    assert!(with_timeout(run(args(&config, &[]))).await.is_err());
}
