//! Push and pull against local repositories.

mod common;

use std::fs;

use tempfile::TempDir;
use tsync::ledger::Ledger;
use tsync::model::{Row, TableMetadata, Value};
use tsync::storage::{Encoding, SqliteStore, collect_rows};
use tsync::sync::{
    ExportSettings, ExportStats, ImportMode, PushRequest, RemoteError, SyncError, pull, push,
    table_metadata_path,
};

use common::{bare_remote, commit_tree, populate, remote, work_remote};

fn rows(store: &SqliteStore, table: &str) -> Vec<Row> {
    let mut source = store.open_full_source(table).unwrap();
    collect_rows(source.as_mut()).unwrap()
}

fn ledger(dir: &TempDir, name: &str) -> Ledger {
    Ledger::open(&dir.path().join(name)).unwrap()
}

fn small_chunks() -> PushRequest {
    PushRequest {
        settings: ExportSettings {
            max_chunk_size: 4 * 1024,
            large_file_threshold: 2 * 1024,
            ..ExportSettings::default()
        },
        message: Some("nightly export".into()),
        ..PushRequest::default()
    }
}

#[test]
fn test_push_then_pull_round_trip() {
    let dir = TempDir::new().unwrap();
    let remote_path = bare_remote(dir.path());
    let spec = remote(&remote_path, "main");

    let mut source = SqliteStore::open_memory().unwrap();
    populate(&mut source, 2_000);
    let mut source_ledger = ledger(&dir, "a.json");

    let pushed = push(&source, &mut source_ledger, &spec, &small_chunks()).unwrap();
    assert!(pushed.pushed);
    assert!(pushed.commit.is_some());
    assert_eq!(pushed.message, "nightly export");
    assert_eq!(pushed.stats.total_rows(), 2_003);
    let events = pushed.stats.tables.iter().find(|t| t.table == "events").unwrap();
    assert!(events.chunked);
    assert!(events.chunks > 1);
    assert_eq!(source_ledger.remote_url(), Some(spec.url.as_str()));

    let bare = git2::Repository::open_bare(&remote_path).unwrap();
    let head = bare.find_reference("refs/heads/main").unwrap().peel_to_commit().unwrap();
    assert_eq!(head.message(), Some("nightly export"));
    let tree = head.tree().unwrap();
    assert!(tree.get_path(std::path::Path::new(".tablesync/manifest.json")).is_ok());
    assert!(tree.get_path(std::path::Path::new("data/users/users_000001.csv")).is_ok());
    assert!(tree.get_path(std::path::Path::new(".gitattributes")).is_ok());

    let mut target = SqliteStore::open_memory().unwrap();
    let mut target_ledger = ledger(&dir, "b.json");
    let pulled = pull(&mut target, &mut target_ledger, &spec, false, false).unwrap();

    assert_eq!(pulled.stats.mode, ImportMode::Metadata);
    assert!(pulled.stats.skipped.is_empty());
    assert_eq!(pulled.stats.total_rows(), 2_003);
    assert_eq!(target.list_tables().unwrap(), vec!["events", "users"]);
    assert_eq!(rows(&target, "events"), rows(&source, "events"));
    assert_eq!(rows(&target, "users"), rows(&source, "users"));
    assert_eq!(target.table_encoding("users").unwrap(), Encoding::Ordinal);
    assert_eq!(target.table_schema("users").unwrap(), source.table_schema("users").unwrap());
    assert_eq!(target.current_branch().unwrap(), "main");
    assert_eq!(target_ledger.remote_url(), Some(spec.url.as_str()));
    assert!(target_ledger.last_pull().is_some());
}

#[test]
fn test_second_push_with_no_changes_creates_no_commit() {
    let dir = TempDir::new().unwrap();
    let remote_path = bare_remote(dir.path());
    let spec = remote(&remote_path, "main");

    let mut store = SqliteStore::open_memory().unwrap();
    populate(&mut store, 10);
    let mut ledger = ledger(&dir, "l.json");

    let first = push(&store, &mut ledger, &spec, &PushRequest::default()).unwrap();
    assert!(first.commit.is_some());

    let second = push(&store, &mut ledger, &spec, &PushRequest::default()).unwrap();
    assert!(second.commit.is_none());
    assert!(!second.pushed);
}

#[test]
fn test_push_follow_up_changes_advance_remote() {
    let dir = TempDir::new().unwrap();
    let remote_path = bare_remote(dir.path());
    let spec = remote(&remote_path, "main");

    let mut store = SqliteStore::open_memory().unwrap();
    populate(&mut store, 10);
    let mut ledger = ledger(&dir, "l.json");
    push(&store, &mut ledger, &spec, &PushRequest::default()).unwrap();

    store.drop_table("events").unwrap();
    let outcome = push(&store, &mut ledger, &spec, &PushRequest::default()).unwrap();
    assert!(outcome.pushed);

    let bare = git2::Repository::open_bare(&remote_path).unwrap();
    let head = bare.find_reference("refs/heads/main").unwrap().peel_to_commit().unwrap();
    assert_eq!(head.parent_count(), 1);
    let tree = head.tree().unwrap();
    assert!(tree.get_path(std::path::Path::new("data/events")).is_err());
    assert!(tree.get_path(std::path::Path::new(".tablesync/tables/events.json")).is_err());
}

#[test]
fn test_dry_run_push_leaves_remote_untouched() {
    let dir = TempDir::new().unwrap();
    let remote_path = bare_remote(dir.path());
    let spec = remote(&remote_path, "main");

    let mut store = SqliteStore::open_memory().unwrap();
    populate(&mut store, 50);
    let mut ledger = ledger(&dir, "l.json");

    let request = PushRequest {
        dry_run: true,
        ..PushRequest::default()
    };
    let outcome = push(&store, &mut ledger, &spec, &request).unwrap();
    assert!(outcome.dry_run);
    assert!(!outcome.pushed);
    assert!(outcome.commit.is_none());
    assert_eq!(outcome.stats.total_rows(), 53);
    assert!(ledger.remote_url().is_none());

    let bare = git2::Repository::open_bare(&remote_path).unwrap();
    assert!(bare.find_reference("refs/heads/main").is_err());
}

#[test]
fn test_pull_preserves_local_only_tables() {
    let dir = TempDir::new().unwrap();
    let remote_path = bare_remote(dir.path());
    let spec = remote(&remote_path, "main");

    let mut source = SqliteStore::open_memory().unwrap();
    populate(&mut source, 5);
    push(&source, &mut ledger(&dir, "a.json"), &spec, &PushRequest::default()).unwrap();

    let mut target = SqliteStore::open_memory().unwrap();
    target
        .create_table("notes", &common::events_schema(), Encoding::Ordinal)
        .unwrap();
    target
        .insert_rows("notes", [vec![Value::Int(1), Value::Null, Value::Null, Value::Null]])
        .unwrap();

    pull(&mut target, &mut ledger(&dir, "b.json"), &spec, false, false).unwrap();
    assert_eq!(target.list_tables().unwrap(), vec!["events", "notes", "users"]);
    assert_eq!(target.row_count("notes").unwrap(), 1);
}

#[test]
fn test_pull_refuses_to_discard_staged_tables() {
    let dir = TempDir::new().unwrap();
    let remote_path = bare_remote(dir.path());
    let spec = remote(&remote_path, "main");

    let mut store = SqliteStore::open_memory().unwrap();
    populate(&mut store, 5);
    let mut l = ledger(&dir, "l.json");
    push(&store, &mut l, &spec, &PushRequest::default()).unwrap();

    l.stage("users");
    let err = pull(&mut store, &mut l, &spec, false, false).unwrap_err();
    assert!(matches!(err, SyncError::StagedChanges { count: 1 }));

    // Dry runs change nothing, so staged tables do not block them
    let dry = pull(&mut store, &mut l, &spec, false, true).unwrap();
    assert!(dry.dry_run);
    assert_eq!(l.staged(), ["users"]);

    pull(&mut store, &mut l, &spec, true, false).unwrap();
    assert!(l.staged().is_empty());
}

#[test]
fn test_pull_missing_branch() {
    let dir = TempDir::new().unwrap();
    let remote_path = bare_remote(dir.path());

    let mut store = SqliteStore::open_memory().unwrap();
    populate(&mut store, 5);
    let mut l = ledger(&dir, "l.json");
    push(&store, &mut l, &remote(&remote_path, "main"), &PushRequest::default()).unwrap();

    let err = pull(&mut store, &mut l, &remote(&remote_path, "nope"), false, false).unwrap_err();
    assert!(matches!(
        err,
        SyncError::Remote(RemoteError::BranchNotFound { ref branch, .. }) if branch == "nope"
    ));
}

#[test]
fn test_pull_missing_repository() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist.git");

    let mut store = SqliteStore::open_memory().unwrap();
    let err = pull(&mut store, &mut ledger(&dir, "l.json"), &remote(&missing, "main"), false, false)
        .unwrap_err();
    assert!(matches!(err, SyncError::Remote(RemoteError::RepositoryNotFound { .. })));
}

#[test]
fn test_push_to_named_branch() {
    let dir = TempDir::new().unwrap();
    let remote_path = bare_remote(dir.path());

    let mut store = SqliteStore::open_memory().unwrap();
    populate(&mut store, 5);
    let mut l = ledger(&dir, "l.json");
    push(&store, &mut l, &remote(&remote_path, "main"), &PushRequest::default()).unwrap();

    store.drop_table("events").unwrap();
    push(&store, &mut l, &remote(&remote_path, "snapshot"), &PushRequest::default()).unwrap();

    let mut target = SqliteStore::open_memory().unwrap();
    pull(&mut target, &mut ledger(&dir, "t.json"), &remote(&remote_path, "snapshot"), false, false)
        .unwrap();
    assert_eq!(target.list_tables().unwrap(), vec!["users"]);
    assert_eq!(target.current_branch().unwrap(), "snapshot");
}

#[test]
fn test_pull_skips_table_with_corrupt_metadata() {
    let dir = TempDir::new().unwrap();
    let (remote_path, repo) = work_remote(dir.path());

    let mut store = SqliteStore::open_memory().unwrap();
    populate(&mut store, 20);
    let stats: ExportStats = tsync::sync::Exporter::new(&store, &remote_path, ExportSettings::default())
        .export()
        .unwrap();
    assert_eq!(stats.tables.len(), 2);

    let meta_path = table_metadata_path(&remote_path, "events");
    let mut meta = TableMetadata::load(&meta_path).unwrap();
    meta.chunks[0].row_count += 7;
    fs::write(&meta_path, serde_json::to_string_pretty(&meta).unwrap()).unwrap();
    commit_tree(&repo, "export with a bad chunk");

    let mut target = SqliteStore::open_memory().unwrap();
    let outcome = pull(&mut target, &mut ledger(&dir, "l.json"), &remote(&remote_path, "main"), false, false)
        .unwrap();

    assert_eq!(outcome.stats.tables.len(), 1);
    assert_eq!(outcome.stats.tables[0].table, "users");
    assert_eq!(outcome.stats.skipped.len(), 1);
    assert_eq!(outcome.stats.skipped[0].table, "events");
    assert!(!target.has_table("events").unwrap());
    assert_eq!(target.row_count("users").unwrap(), 3);
}

#[test]
fn test_pull_without_metadata_is_best_effort() {
    let dir = TempDir::new().unwrap();
    let (remote_path, repo) = work_remote(dir.path());
    fs::create_dir_all(remote_path.join("exports")).unwrap();
    fs::write(
        remote_path.join("exports/cities.csv"),
        "name,country,population\nOslo,NO,709037\n\"Washington, D.C.\",US,689545\n",
    )
    .unwrap();
    fs::write(remote_path.join("notes.txt"), "not a table\n").unwrap();
    commit_tree(&repo, "raw files");

    let mut target = SqliteStore::open_memory().unwrap();
    let outcome = pull(&mut target, &mut ledger(&dir, "l.json"), &remote(&remote_path, "main"), false, false)
        .unwrap();

    assert_eq!(outcome.stats.mode, ImportMode::BestEffort);
    assert_eq!(outcome.stats.tables.len(), 1);
    assert_eq!(outcome.stats.tables[0].table, "cities");
    assert_eq!(
        rows(&target, "cities")[1],
        vec![
            Value::Text("Washington, D.C.".into()),
            Value::Text("US".into()),
            Value::Text("689545".into()),
        ]
    );
    // Best-effort pulls do not adopt the remote branch
    assert_eq!(target.current_branch().unwrap(), "main");
}
