//! End-to-end tests of the `tsync` binary.

mod common;

use std::path::Path;
use std::process::Output;

use assert_cmd::Command;
use tempfile::TempDir;
use tsync::storage::SqliteStore;

use common::{bare_remote, populate};

fn tsync(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tsync").unwrap();
    for var in ["TSYNC_DIR", "TSYNC_DB", "TSYNC_ACTOR", "TSYNC_TOKEN", "TSYNC_USERNAME", "TSYNC_PASSWORD", "TSYNC_SSH_KEY", "RUST_LOG"] {
        cmd.env_remove(var);
    }
    cmd.arg("--dir").arg(dir).args(["--actor", "tester", "--no-color"]);
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Initialized working copy holding `users` and `events`.
fn working_copy() -> TempDir {
    let dir = TempDir::new().unwrap();
    tsync(dir.path()).arg("init").assert().success();
    let mut store = SqliteStore::open(&dir.path().join(".tsync/tsync.db")).unwrap();
    populate(&mut store, 25);
    dir
}

#[test]
fn test_init_creates_state_dir() {
    let dir = TempDir::new().unwrap();
    tsync(dir.path()).arg("init").assert().success();

    assert!(dir.path().join(".tsync/tsync.db").exists());
    assert!(dir.path().join(".tsync/ledger.json").exists());
    assert!(dir.path().join(".tsync/.gitignore").exists());

    let output = tsync(dir.path()).arg("init").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Already initialized"));

    tsync(dir.path()).args(["init", "--force"]).assert().success();
}

#[test]
fn test_commands_outside_working_copy_fail() {
    let dir = TempDir::new().unwrap();
    for args in [&["status"][..], &["log"], &["add", "."], &["commit", "-m", "x"]] {
        let output = tsync(dir.path()).args(args).output().unwrap();
        assert_eq!(output.status.code(), Some(1), "{args:?}");
        assert!(stderr(&output).contains("Not initialized"), "{args:?}");
    }
}

#[test]
fn test_stage_commit_and_log() {
    let dir = working_copy();

    let output = tsync(dir.path()).args(["status", "--porcelain"]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(stdout(&output), "?? events\n?? users\n");

    tsync(dir.path()).args(["add", "users"]).assert().success();
    let output = tsync(dir.path()).args(["status", "--porcelain"]).output().unwrap();
    assert_eq!(stdout(&output), "?? events\nA users\n");

    tsync(dir.path()).args(["commit", "-m", "load users"]).assert().success();
    let output = tsync(dir.path()).args(["log", "--oneline"]).output().unwrap();
    assert!(output.status.success());
    let log = stdout(&output);
    assert_eq!(log.lines().count(), 1);
    assert!(log.trim_end().ends_with(" load users"));

    // Committing clears the staged set
    let output = tsync(dir.path()).args(["status", "--porcelain"]).output().unwrap();
    assert_eq!(stdout(&output), "?? events\n?? users\n");
}

#[test]
fn test_add_dot_stages_everything() {
    let dir = working_copy();
    let output = tsync(dir.path()).args(["--json", "add", "."]).output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["staged"], serde_json::json!(["events", "users"]));
    assert_eq!(json["newly_staged"], 2);
}

#[test]
fn test_add_unknown_table() {
    let dir = working_copy();
    let output = tsync(dir.path()).args(["add", "users", "missing"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Table not found: missing"));

    // Nothing staged when any name is unknown
    let output = tsync(dir.path()).args(["status", "--porcelain"]).output().unwrap();
    assert!(!stdout(&output).contains("A users"));
}

#[test]
fn test_commit_with_nothing_staged_reports_json_error() {
    let dir = working_copy();
    let output = tsync(dir.path()).args(["--json", "commit", "-m", "empty"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let json: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(json["error"]["code"], "NOTHING_STAGED");
    assert!(json["error"]["hint"].is_string());
}

#[test]
fn test_push_then_clone() {
    let dir = working_copy();
    let remotes = TempDir::new().unwrap();
    let remote = bare_remote(remotes.path());
    let url = remote.display().to_string();

    tsync(dir.path()).args(["add", "."]).assert().success();
    tsync(dir.path()).args(["commit", "-m", "first export"]).assert().success();

    let output = tsync(dir.path())
        .args(["--json", "push", "--chunk-size", "1024", &url])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["pushed"], true);
    assert_eq!(json["message"], "first export");

    // The pushed tables now count as exported
    let output = tsync(dir.path()).args(["status", "--porcelain"]).output().unwrap();
    assert_eq!(stdout(&output), "M events\nM users\n");

    let target = TempDir::new().unwrap();
    let clone_dir = target.path().join("copy");
    let output = tsync(target.path())
        .arg("clone")
        .arg(&url)
        .arg(&clone_dir)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));

    let store = SqliteStore::open(&clone_dir.join(".tsync/tsync.db")).unwrap();
    assert_eq!(store.list_tables().unwrap(), vec!["events", "users"]);
    assert_eq!(store.row_count("events").unwrap(), 25);
    assert_eq!(store.row_count("users").unwrap(), 3);

    // Later pulls reuse the recorded remote
    tsync(&clone_dir).arg("pull").assert().success();
}

#[test]
fn test_clone_failure_can_be_retried() {
    let remotes = TempDir::new().unwrap();
    let missing = remotes.path().join("later.git");
    let url = missing.display().to_string();
    let target = TempDir::new().unwrap();
    let clone_dir = target.path().join("copy");

    let output = tsync(target.path()).arg("clone").arg(&url).arg(&clone_dir).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("not found"), "{}", stderr(&output));
    assert!(!clone_dir.exists());

    let dir = working_copy();
    let remote = bare_remote(remotes.path());
    std::fs::rename(&remote, &missing).unwrap();
    tsync(dir.path()).args(["push", &url]).assert().success();

    let output = tsync(target.path()).arg("clone").arg(&url).arg(&clone_dir).output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(clone_dir.join(".tsync/tsync.db").exists());
}

#[test]
fn test_pull_without_remote_fails() {
    let dir = working_copy();
    let output = tsync(dir.path()).arg("pull").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Invalid argument"));
}

#[test]
fn test_column_strategy_requires_partition_column() {
    let dir = working_copy();
    let output = tsync(dir.path())
        .args(["push", "--strategy", "column-based", "/nowhere.git"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("--partition-column"));
}

#[test]
fn test_completions() {
    let output = tsync(Path::new(".")).args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("tsync"));
}
