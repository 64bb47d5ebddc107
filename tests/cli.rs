// tests/cli.rs

//! Command-line behaviour of the tpupd binary: option validation and
//! exit codes.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn tpupd(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tpupd"))
        .args(args)
        .arg("--path-prefix")
        .arg(root.join("root"))
        .arg("--state-dir")
        .arg(root.join("state"))
        .arg("--config")
        .arg(root.join("config.toml"))
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

#[test]
fn test_version_without_repo_is_usage_error() {
    let temp = TempDir::new().unwrap();
    let output = tpupd(temp.path(), &["update", "--version", "30"]);
    assert_eq!(output.status.code(), Some(3));
    // Rejected before anything was created
    assert!(!temp.path().join("root").exists());
    assert!(!temp.path().join("state").exists());
}

#[test]
fn test_latest_without_repo_updates_all() {
    let temp = TempDir::new().unwrap();
    let output = tpupd(temp.path(), &["update", "--version", "latest"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_conflicting_modes() {
    let temp = TempDir::new().unwrap();
    let output = tpupd(temp.path(), &["update", "--status", "--download"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_invalid_config_file() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("config.toml"), "state_dir = 42\n").unwrap();
    let output = tpupd(temp.path(), &["update", "--status"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_no_repositories_is_success() {
    let temp = TempDir::new().unwrap();
    let output = tpupd(temp.path(), &["update", "--status"]);
    assert_eq!(output.status.code(), Some(0));

    let output = tpupd(temp.path(), &["update"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_unknown_repository_exit_code() {
    let temp = TempDir::new().unwrap();
    let output = tpupd(temp.path(), &["update", "--repo", "extras", "-V", "30"]);
    assert_eq!(output.status.code(), Some(7));
}

#[test]
fn test_completions() {
    let output = Command::new(env!("CARGO_BIN_EXE_tpupd"))
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("tpupd"));
}
