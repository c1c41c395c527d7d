//! Local staging area and commit ledger.
//!
//! The ledger gives the CLI git-like `add`/`commit`/`status`/`log` on top of
//! snapshot export. It lives in `.tsync/ledger.json` in the working copy and
//! never reaches the remote.
//!
//! Table state is computed on demand and is deliberately approximate: it
//! records whether a table was staged since the last export, not whether
//! its contents changed.
//!
//! A [`Ledger`] is opened at command start and saved at command end.
//! Concurrent commands against one working copy are not coordinated.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sync::atomic_write;

/// File name of the ledger inside the working copy's state directory.
pub const LEDGER_FILE: &str = "ledger.json";

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger file is corrupt: {0}")]
    Json(#[from] serde_json::Error),

    #[error("nothing staged to commit")]
    NothingStaged,

    #[error("commit message is empty")]
    EmptyMessage,
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// One local commit. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: String,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub tables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_database_ref: Option<String>,
}

impl CommitRecord {
    /// Seven-character id prefix for one-line listings.
    #[must_use]
    pub fn short_id(&self) -> &str {
        let hex = self.id.strip_prefix("commit_").unwrap_or(&self.id);
        hex.get(..7).unwrap_or(hex)
    }
}

/// Per-table state, derived from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableState {
    /// No export has been recorded for this working copy.
    Untracked,
    /// Exported before, not staged since.
    Modified,
    /// In the staged set.
    Staged,
}

impl TableState {
    /// Short code for `status --porcelain`.
    #[must_use]
    pub const fn porcelain(&self) -> &'static str {
        match self {
            Self::Untracked => "??",
            Self::Modified => "M",
            Self::Staged => "A",
        }
    }
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Untracked => "untracked",
            Self::Modified => "modified",
            Self::Staged => "staged",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct LedgerState {
    #[serde(default)]
    remote_url: Option<String>,
    #[serde(default)]
    last_pull: Option<DateTime<Utc>>,
    #[serde(default)]
    last_export: Option<DateTime<Utc>>,
    #[serde(default)]
    staged: Vec<String>,
    #[serde(default)]
    commits: Vec<CommitRecord>,
}

/// Handle to the on-disk ledger.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    state: LedgerState,
}

impl Ledger {
    /// Load the ledger at `path`, or start an empty one if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        let state = if path.exists() {
            serde_json::from_str(&fs::read_to_string(path)?)?
        } else {
            LedgerState::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    /// Write the ledger back atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> LedgerResult<()> {
        let json = serde_json::to_string_pretty(&self.state)?;
        atomic_write(&self.path, &json)?;
        debug!(path = %self.path.display(), "ledger saved");
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn remote_url(&self) -> Option<&str> {
        self.state.remote_url.as_deref()
    }

    #[must_use]
    pub fn last_pull(&self) -> Option<DateTime<Utc>> {
        self.state.last_pull
    }

    #[must_use]
    pub fn last_export(&self) -> Option<DateTime<Utc>> {
        self.state.last_export
    }

    /// Staged tables, in staging order.
    #[must_use]
    pub fn staged(&self) -> &[String] {
        &self.state.staged
    }

    /// Stage a table. Staging an already staged table is a no-op.
    ///
    /// Returns true if the table was newly staged.
    pub fn stage(&mut self, table: &str) -> bool {
        if self.state.staged.iter().any(|t| t == table) {
            return false;
        }
        self.state.staged.push(table.to_string());
        true
    }

    /// Stage every table in `tables`, keeping their order.
    ///
    /// Returns the number of newly staged tables.
    pub fn stage_all<S: AsRef<str>>(&mut self, tables: &[S]) -> usize {
        tables.iter().filter(|t| self.stage(t.as_ref())).count()
    }

    /// Record a commit covering exactly the staged tables, then clear them.
    ///
    /// # Errors
    ///
    /// Returns `NothingStaged` or `EmptyMessage`.
    pub fn commit(
        &mut self,
        message: &str,
        author: &str,
        source_database_ref: Option<String>,
    ) -> LedgerResult<CommitRecord> {
        if self.state.staged.is_empty() {
            return Err(LedgerError::NothingStaged);
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(LedgerError::EmptyMessage);
        }

        let record = CommitRecord {
            id: format!("commit_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]),
            message: message.to_string(),
            author: author.to_string(),
            timestamp: Utc::now(),
            tables: std::mem::take(&mut self.state.staged),
            source_database_ref,
        };
        self.state.commits.push(record.clone());
        Ok(record)
    }

    /// State of each table, in the order given.
    #[must_use]
    pub fn status<S: AsRef<str>>(&self, tables: &[S]) -> Vec<(String, TableState)> {
        tables
            .iter()
            .map(|t| {
                let name = t.as_ref();
                (name.to_string(), self.table_state(name))
            })
            .collect()
    }

    #[must_use]
    pub fn table_state(&self, table: &str) -> TableState {
        if self.state.staged.iter().any(|t| t == table) {
            TableState::Staged
        } else if self.state.last_export.is_some() {
            TableState::Modified
        } else {
            TableState::Untracked
        }
    }

    /// Commits, newest first, at most `limit` of them.
    #[must_use]
    pub fn log(&self, limit: Option<usize>) -> Vec<&CommitRecord> {
        self.state
            .commits
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Most recent commit, if any.
    #[must_use]
    pub fn latest_commit(&self) -> Option<&CommitRecord> {
        self.state.commits.last()
    }

    /// Note a completed pull. Staged state may be stale afterwards, so it is
    /// cleared.
    pub fn record_pull(&mut self, remote_url: &str) {
        self.state.remote_url = Some(remote_url.to_string());
        self.state.last_pull = Some(Utc::now());
        self.state.last_export = Some(Utc::now());
        self.state.staged.clear();
    }

    /// Note a completed export to `remote_url`.
    pub fn record_export(&mut self, remote_url: &str) {
        self.state.remote_url = Some(remote_url.to_string());
        self.state.last_export = Some(Utc::now());
    }
}
