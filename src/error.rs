//! Error types for the tablesync CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - A single failure exit code (1) for every error
//! - Context-aware recovery hints
//! - Structured JSON output for `--json` consumers

use std::path::PathBuf;
use thiserror::Error;

use crate::chunking::ChunkError;
use crate::ledger::LedgerError;
use crate::model::MetadataError;
use crate::storage::{SourceError, StoreError};
use crate::sync::{RemoteError, SyncError};

/// Result type alias for tablesync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes.
///
/// Each code maps to a SCREAMING_SNAKE string. Scripts match on the string;
/// the process exit code is 1 for all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Working copy
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,
    TableNotFound,

    // Validation
    InvalidArgument,
    NothingStaged,
    StagedChanges,

    // Remote
    AuthenticationFailure,
    RepositoryNotFound,
    NonFastForward,
    BranchNotFound,
    TransportError,

    // Data
    CorruptMetadata,
    ReadFailure,
    ChunkWriteFailure,

    // I/O
    IoError,
    JsonError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::TableNotFound => "TABLE_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NothingStaged => "NOTHING_STAGED",
            Self::StagedChanges => "STAGED_CHANGES",
            Self::AuthenticationFailure => "AUTHENTICATION_FAILURE",
            Self::RepositoryNotFound => "REPOSITORY_NOT_FOUND",
            Self::NonFastForward => "NON_FAST_FORWARD",
            Self::BranchNotFound => "BRANCH_NOT_FOUND",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::CorruptMetadata => "CORRUPT_METADATA",
            Self::ReadFailure => "READ_FAILURE",
            Self::ChunkWriteFailure => "CHUNK_WRITE_FAILURE",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
        }
    }

    /// Process exit code. Every failure exits with 1.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        1
    }

    /// Whether retrying with corrected input can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument
                | Self::NothingStaged
                | Self::AuthenticationFailure
                | Self::NonFastForward
                | Self::TransportError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in tablesync CLI operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: no working copy at {path}")]
    NotInitialized { path: String },

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Table not found: {name}")]
    TableNotFound { name: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Store(StoreError),

    #[error("{0}")]
    Ledger(#[from] LedgerError),

    #[error("{0}")]
    Sync(#[from] SyncError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TableNotFound(name) => Self::TableNotFound { name },
            other => Self::Store(other),
        }
    }
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::TableNotFound { .. } => ErrorCode::TableNotFound,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Store(e) => store_code(e),
            Self::Ledger(LedgerError::NothingStaged) => ErrorCode::NothingStaged,
            Self::Ledger(LedgerError::EmptyMessage) => ErrorCode::InvalidArgument,
            Self::Ledger(LedgerError::Io(_)) => ErrorCode::IoError,
            Self::Ledger(LedgerError::Json(_)) => ErrorCode::JsonError,
            Self::Sync(e) => sync_code(e),
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
        }
    }

    /// Process exit code.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Recovery hint for the user, if one applies.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        let hint = match self.error_code() {
            ErrorCode::NotInitialized => {
                "Run `tsync init` to create a working copy, or `tsync clone <repo-url>`"
            }
            ErrorCode::AlreadyInitialized => "Use `tsync init --force` to reinitialize",
            ErrorCode::TableNotFound => "Run `tsync status` to list the tables in this working copy",
            ErrorCode::NothingStaged => {
                "Stage tables first with `tsync add <table>` or `tsync add .`"
            }
            ErrorCode::StagedChanges => {
                "Commit and push staged tables first, or pass --force to discard staging"
            }
            ErrorCode::AuthenticationFailure => {
                "Check your credentials: --token (TSYNC_TOKEN), --username/--password, or \
                 --ssh-key (TSYNC_SSH_KEY). Tokens need read and write access to the repository"
            }
            ErrorCode::RepositoryNotFound => {
                "Check the repository URL and that your credentials can see it"
            }
            ErrorCode::NonFastForward => {
                "The remote has commits you don't have. Run `tsync pull` first, \
                 or push with --force to overwrite the remote branch"
            }
            ErrorCode::BranchNotFound => "Push the branch first, or pull an existing branch",
            ErrorCode::CorruptMetadata => {
                "The remote export is inconsistent; push it again from a good source"
            }
            ErrorCode::ChunkWriteFailure => {
                "Check free disk space in the temporary directory and retry"
            }
            ErrorCode::InvalidArgument
            | ErrorCode::DatabaseError
            | ErrorCode::TransportError
            | ErrorCode::ReadFailure
            | ErrorCode::IoError
            | ErrorCode::JsonError => return None,
        };
        Some(hint.to_string())
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

fn store_code(e: &StoreError) -> ErrorCode {
    match e {
        StoreError::TableNotFound(_) => ErrorCode::TableNotFound,
        StoreError::TableAlreadyExists(_)
        | StoreError::InvalidTableName { .. }
        | StoreError::ArityMismatch { .. } => ErrorCode::InvalidArgument,
        StoreError::ReadFailure { .. } => ErrorCode::ReadFailure,
        StoreError::Database(_) => ErrorCode::DatabaseError,
        StoreError::Json(_) => ErrorCode::JsonError,
    }
}

fn sync_code(e: &SyncError) -> ErrorCode {
    match e {
        SyncError::Io(_) => ErrorCode::IoError,
        SyncError::Json(_) => ErrorCode::JsonError,
        SyncError::Store(inner) => store_code(inner),
        SyncError::Source(_) | SyncError::Chunk(ChunkError::Source(_)) => ErrorCode::ReadFailure,
        SyncError::Chunk(ChunkError::ChunkWriteFailure { .. }) => ErrorCode::ChunkWriteFailure,
        SyncError::Chunk(ChunkError::UnknownStrategy(_)) => ErrorCode::InvalidArgument,
        SyncError::Chunk(ChunkError::Read { .. } | ChunkError::Malformed { .. })
        | SyncError::Metadata(MetadataError::CorruptMetadata { .. })
        | SyncError::Ddl(_) => ErrorCode::CorruptMetadata,
        SyncError::Metadata(MetadataError::Io(_)) | SyncError::Unreadable { .. } => ErrorCode::IoError,
        SyncError::Metadata(MetadataError::Json(_)) => ErrorCode::JsonError,
        SyncError::Remote(remote) => match remote {
            RemoteError::AuthenticationFailure { .. } => ErrorCode::AuthenticationFailure,
            RemoteError::RepositoryNotFound { .. } => ErrorCode::RepositoryNotFound,
            RemoteError::NonFastForward { .. } => ErrorCode::NonFastForward,
            RemoteError::BranchNotFound { .. } => ErrorCode::BranchNotFound,
            RemoteError::Transport(_) => ErrorCode::TransportError,
        },
        SyncError::StagedChanges { .. } => ErrorCode::StagedChanges,
    }
}

impl From<SourceError> for Error {
    fn from(err: SourceError) -> Self {
        Self::Sync(SyncError::Source(err))
    }
}

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Self {
        Self::Sync(SyncError::Remote(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_failure_exits_one() {
        let errors = [
            Error::InvalidArgument("x".into()),
            Error::NotInitialized { path: "/w".into() },
            Error::from(RemoteError::RepositoryNotFound { url: "u".into() }),
            Error::Ledger(LedgerError::NothingStaged),
        ];
        for e in errors {
            assert_eq!(e.exit_code(), 1);
        }
    }

    #[test]
    fn test_remote_errors_carry_hints() {
        let e = Error::from(RemoteError::NonFastForward {
            branch: "main".into(),
            message: "rejected".into(),
        });
        assert_eq!(e.error_code(), ErrorCode::NonFastForward);
        assert!(e.hint().unwrap().contains("tsync pull"));

        let e = Error::from(RemoteError::AuthenticationFailure {
            url: "u".into(),
            message: "401".into(),
        });
        assert!(e.hint().unwrap().contains("--token"));
    }

    #[test]
    fn test_store_not_found_maps_to_table_not_found() {
        let e = Error::from(StoreError::TableNotFound("users".into()));
        assert!(matches!(e, Error::TableNotFound { .. }));
        assert_eq!(e.error_code().as_str(), "TABLE_NOT_FOUND");
    }

    #[test]
    fn test_structured_json() {
        let json = Error::Ledger(LedgerError::NothingStaged).to_structured_json();
        assert_eq!(json["error"]["code"], "NOTHING_STAGED");
        assert_eq!(json["error"]["exit_code"], 1);
        assert!(json["error"]["hint"].is_string());
    }
}
