//! Sync statistics and errors.

use serde::Serialize;

use crate::chunking::ChunkError;
use crate::model::{DdlError, MetadataError};
use crate::storage::{SourceError, StoreError};
use crate::sync::remote::RemoteError;

/// Result of exporting one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableExportStats {
    pub table: String,
    pub rows: u64,
    pub chunks: usize,
    pub size_bytes: u64,
    /// Split by the chunking strategy rather than written as one chunk.
    pub chunked: bool,
    /// Some chunk exceeds the large-file threshold.
    pub large: bool,
    /// Cells that fell back to lossy text.
    pub degraded_cells: u64,
}

/// Statistics for an export operation.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExportStats {
    pub tables: Vec<TableExportStats>,
}

impl ExportStats {
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.tables.iter().map(|t| t.size_bytes).sum()
    }

    #[must_use]
    pub fn total_chunks(&self) -> usize {
        self.tables.iter().map(|t| t.chunks).sum()
    }

    #[must_use]
    pub fn degraded_cells(&self) -> u64 {
        self.tables.iter().map(|t| t.degraded_cells).sum()
    }

    /// Returns true if no table was exported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Where an import took its table definitions from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Trusted manifest, schema and chunk metadata.
    #[default]
    Metadata,
    /// No metadata; files classified by extension.
    BestEffort,
}

/// Result of importing one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableImportStats {
    pub table: String,
    pub rows: u64,
    pub chunks: usize,
    /// File the table came from, for best-effort imports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

/// A table that was not imported, and why.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedTable {
    pub table: String,
    pub reason: String,
}

/// Statistics for an import operation.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportStats {
    pub mode: ImportMode,
    pub tables: Vec<TableImportStats>,
    pub skipped: Vec<SkippedTable>,
}

impl ImportStats {
    #[must_use]
    pub fn new(mode: ImportMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }

    pub fn skip(&mut self, table: &str, reason: impl ToString) {
        self.skipped.push(SkippedTable {
            table: table.to_string(),
            reason: reason.to_string(),
        });
    }
}

/// Sync-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("invalid schema.sql: {0}")]
    Ddl(#[from] DdlError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Pull would discard staged tables.
    #[error("{count} staged table(s) would be discarded by pull")]
    StagedChanges { count: usize },

    /// A best-effort archive could not be read.
    #[error("cannot import {file}: {reason}")]
    Unreadable { file: String, reason: String },
}

impl From<git2::Error> for SyncError {
    fn from(err: git2::Error) -> Self {
        Self::Remote(RemoteError::from(err))
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
