//! Push and pull against a remote repository.
//!
//! Both directions work in a scratch clone that lives in a temporary
//! directory for the duration of one call and is removed when the call
//! returns, whether it succeeded or not.

use chrono::Utc;
use serde::Serialize;
use tempfile::TempDir;
use tracing::info;

use crate::ledger::Ledger;
use crate::storage::SqliteStore;
use crate::sync::export::{ExportSettings, Exporter};
use crate::sync::import::Importer;
use crate::sync::remote::{
    AuthMethod, checkout_branch, clone_or_init, clone_repo, commit_all, head_is_born, push_branch,
};
use crate::sync::types::{ExportStats, ImportMode, ImportStats, SyncError, SyncResult};

/// Where to sync, and how to authenticate.
#[derive(Debug, Clone)]
pub struct RemoteSpec {
    pub url: String,
    pub branch: String,
    pub auth: AuthMethod,
}

/// Options for [`push`].
#[derive(Debug, Clone, Default)]
pub struct PushRequest {
    pub settings: ExportSettings,
    /// Commit message; defaults to the latest ledger commit, then a
    /// generated one.
    pub message: Option<String>,
    pub dry_run: bool,
    pub force: bool,
}

/// What a push did.
#[derive(Debug, Clone, Serialize)]
pub struct PushOutcome {
    pub url: String,
    pub branch: String,
    pub stats: ExportStats,
    pub message: String,
    /// Commit created on the remote branch; `None` when the export matched
    /// the remote tree or on a dry run.
    pub commit: Option<String>,
    pub pushed: bool,
    pub dry_run: bool,
}

/// What a pull did.
#[derive(Debug, Clone, Serialize)]
pub struct PullOutcome {
    pub url: String,
    pub branch: String,
    pub stats: ImportStats,
    pub dry_run: bool,
}

/// Commit message used when the caller gives none.
///
/// # Errors
///
/// Returns an error if the store cannot report its branch or head.
pub fn default_push_message(store: &SqliteStore, ledger: &Ledger) -> SyncResult<String> {
    if let Some(commit) = ledger.latest_commit() {
        return Ok(commit.message.clone());
    }
    let head = store.head()?;
    Ok(format!(
        "Export from {}@{} at {}",
        store.current_branch()?,
        head.get(..12).unwrap_or(&head),
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ))
}

/// Export the store into the remote branch and push it.
///
/// The remote is cloned, or initialized when it does not exist yet. A dry
/// run stops after the export, before anything is committed or sent.
///
/// # Errors
///
/// Returns classified remote errors (authentication, not found,
/// non-fast-forward) and any export error.
pub fn push(
    store: &SqliteStore,
    ledger: &mut Ledger,
    remote: &RemoteSpec,
    request: &PushRequest,
) -> SyncResult<PushOutcome> {
    let scratch = TempDir::new()?;
    let workdir = scratch.path().join("repo");

    let repo = clone_or_init(&remote.url, &workdir, &remote.auth)?;
    checkout_branch(&repo, &remote.url, &remote.branch, true)?;

    let stats = Exporter::new(store, &workdir, request.settings.clone()).export()?;
    let message = match &request.message {
        Some(message) => message.clone(),
        None => default_push_message(store, ledger)?,
    };

    let mut outcome = PushOutcome {
        url: remote.url.clone(),
        branch: remote.branch.clone(),
        stats,
        message,
        commit: None,
        pushed: false,
        dry_run: request.dry_run,
    };
    if request.dry_run {
        info!(url = %remote.url, "dry run, nothing committed");
        return Ok(outcome);
    }

    outcome.commit = commit_all(&repo, &outcome.message)?.map(|oid| oid.to_string());
    if head_is_born(&repo) {
        push_branch(&repo, &remote.url, &remote.branch, request.force, &remote.auth)?;
        outcome.pushed = true;
    }
    ledger.record_export(&remote.url);

    info!(
        url = %remote.url,
        branch = %remote.branch,
        tables = outcome.stats.tables.len(),
        commit = outcome.commit.as_deref().unwrap_or("unchanged"),
        "push complete"
    );
    Ok(outcome)
}

/// Import the remote branch into the store.
///
/// Refuses to discard staged tables unless `force` is set. A dry run reads
/// and validates everything and changes nothing locally.
///
/// # Errors
///
/// Returns `StagedChanges`, classified remote errors, or import errors.
pub fn pull(
    store: &mut SqliteStore,
    ledger: &mut Ledger,
    remote: &RemoteSpec,
    force: bool,
    dry_run: bool,
) -> SyncResult<PullOutcome> {
    if !force && !dry_run && !ledger.staged().is_empty() {
        return Err(SyncError::StagedChanges {
            count: ledger.staged().len(),
        });
    }

    let scratch = TempDir::new()?;
    let workdir = scratch.path().join("repo");

    let repo = clone_repo(&remote.url, &workdir, &remote.auth)?;
    checkout_branch(&repo, &remote.url, &remote.branch, false)?;

    let stats = Importer::new(store, &workdir).dry_run(dry_run).import()?;
    if !dry_run {
        if stats.mode == ImportMode::Metadata {
            store.set_branch(&remote.branch)?;
        }
        ledger.record_pull(&remote.url);
    }

    info!(
        url = %remote.url,
        branch = %remote.branch,
        tables = stats.tables.len(),
        skipped = stats.skipped.len(),
        dry_run,
        "pull complete"
    );
    Ok(PullOutcome {
        url: remote.url.clone(),
        branch: remote.branch.clone(),
        stats,
        dry_run,
    })
}
