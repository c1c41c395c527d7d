//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use git2::{Repository, RepositoryInitOptions, Signature};
use tsync::model::{Column, ColumnType, Row, Schema, Value};
use tsync::storage::{Encoding, SqliteStore};
use tsync::sync::{AuthMethod, RemoteSpec};

/// Empty bare repository whose HEAD names `main`.
pub fn bare_remote(dir: &Path) -> PathBuf {
    let path = dir.join("remote.git");
    let repo = Repository::init_bare(&path).unwrap();
    repo.set_head("refs/heads/main").unwrap();
    path
}

/// Non-bare repository on `main`, for hand-built remote trees.
pub fn work_remote(dir: &Path) -> (PathBuf, Repository) {
    let path = dir.join("remote");
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = Repository::init_opts(&path, &opts).unwrap();
    (path, repo)
}

/// Commit every file in a non-bare repository.
pub fn commit_tree(repo: &Repository, message: &str) {
    let mut index = repo.index().unwrap();
    index.add_all(["*"], git2::IndexAddOption::DEFAULT, None).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("fixture", "fixture@localhost").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents).unwrap();
}

pub fn remote(path: &Path, branch: &str) -> RemoteSpec {
    RemoteSpec {
        url: path.display().to_string(),
        branch: branch.to_string(),
        auth: AuthMethod::Anonymous,
    }
}

pub fn users_schema() -> Schema {
    Schema::new(vec![
        Column::new("id", ColumnType::Integer).primary_key(),
        Column::new("name", ColumnType::Text),
        Column::new("email", ColumnType::Text),
        Column::new("active", ColumnType::Boolean),
    ])
}

pub fn events_schema() -> Schema {
    Schema::new(vec![
        Column::new("seq", ColumnType::Integer).not_null(),
        Column::new("kind", ColumnType::Text),
        Column::new("weight", ColumnType::Real),
        Column::new("payload", ColumnType::Blob),
    ])
}

/// Keyed `users` (3 rows) and ordinal `events` (`events` rows).
#[allow(clippy::cast_precision_loss)]
pub fn populate(store: &mut SqliteStore, events: i64) {
    store.create_table("users", &users_schema(), Encoding::Keyed).unwrap();
    let users: Vec<Row> = vec![
        vec![
            Value::Int(2),
            Value::Text("Bob Smith".into()),
            Value::Text("bob@example.com".into()),
            Value::Bool(false),
        ],
        vec![
            Value::Int(1),
            Value::Text("Alice Johnson".into()),
            Value::Text("alice@example.com".into()),
            Value::Bool(true),
        ],
        vec![
            Value::Int(3),
            Value::Text("Quote \"Q\", Esq.\nline two".into()),
            Value::Null,
            Value::Bool(true),
        ],
    ];
    store.insert_rows("users", users).unwrap();

    store.create_table("events", &events_schema(), Encoding::Ordinal).unwrap();
    let rows = (0..events).map(|i| {
        vec![
            Value::Int(i),
            Value::Text(if i % 3 == 0 { String::new() } else { format!("kind-{}", i % 7) }),
            Value::Float(i as f64 * 0.5),
            if i % 4 == 0 {
                Value::Null
            } else {
                Value::Blob(i.to_le_bytes()[..2].to_vec())
            },
        ]
    });
    store.insert_rows("events", rows).unwrap();
}
