//! Self-describing metadata written alongside exported chunk files.
//!
//! - [`ChunkInfo`] - one per chunk file
//! - [`TableMetadata`] - one per exported table (`.tablesync/tables/<t>.json`)
//! - [`RepositoryManifest`] - one per export (`.tablesync/manifest.json`)
//!
//! Field names are camelCase on disk so the files stay readable from other
//! tooling on the hosting side.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Half-open ordinal interval `[start, end)` of table rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u64; 2]", into = "[u64; 2]")]
pub struct RowRange {
    pub start: u64,
    pub end: u64,
}

impl RowRange {
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl From<[u64; 2]> for RowRange {
    fn from([start, end]: [u64; 2]) -> Self {
        Self { start, end }
    }
}

impl From<RowRange> for [u64; 2] {
    fn from(r: RowRange) -> Self {
        [r.start, r.end]
    }
}

/// One chunk file of an exported table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkInfo {
    /// File name relative to the table's data directory.
    pub file_name: String,
    pub row_count: u64,
    /// Final on-disk size, header included.
    pub size_bytes: u64,
    pub row_range: RowRange,
    /// Partition predicate; only set by the column-based strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Chunk manifest and schema for one exported table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    pub table_name: String,
    pub chunking_strategy_name: String,
    pub max_chunk_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_column: Option<String>,
    pub chunks: Vec<ChunkInfo>,
    #[serde(rename = "schemaDDL")]
    pub schema_ddl: String,
    pub created_at: DateTime<Utc>,
}

/// Errors from loading or validating metadata.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt metadata for table {table}: {reason}")]
    CorruptMetadata { table: String, reason: String },
}

pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

impl TableMetadata {
    /// Total rows across all chunks.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.chunks.iter().map(|c| c.row_count).sum()
    }

    /// Total bytes across all chunk files.
    #[must_use]
    pub fn total_size_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.size_bytes).sum()
    }

    /// Chunks in file-name order, which is logical row order.
    #[must_use]
    pub fn sorted_chunks(&self) -> Vec<ChunkInfo> {
        let mut chunks = self.chunks.clone();
        chunks.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        chunks
    }

    /// Check that chunk row ranges partition `[0, n)`.
    ///
    /// Every file name must be `<table>_NNNNNN.csv`. Ordered by file name,
    /// each range must start where the previous one ended, the first must
    /// start at zero, and each `row_count` must equal its range length.
    ///
    /// # Errors
    ///
    /// Returns `CorruptMetadata` describing the first violation found.
    pub fn validate(&self) -> MetadataResult<()> {
        let corrupt = |reason: String| MetadataError::CorruptMetadata {
            table: self.table_name.clone(),
            reason,
        };

        if let Some(stray) = self
            .chunks
            .iter()
            .find(|c| !is_chunk_file_name(&self.table_name, &c.file_name))
        {
            return Err(corrupt(format!(
                "chunk file name {:?} is not of the form {}_NNNNNN.csv",
                stray.file_name, self.table_name
            )));
        }

        let mut expected_start = 0u64;
        for chunk in self.sorted_chunks() {
            if chunk.row_range.start != expected_start {
                let kind = if chunk.row_range.start > expected_start { "gap" } else { "overlap" };
                return Err(corrupt(format!(
                    "{kind} before {}: expected row {expected_start}, range starts at {}",
                    chunk.file_name, chunk.row_range.start
                )));
            }
            if chunk.row_range.end < chunk.row_range.start {
                return Err(corrupt(format!(
                    "{} has inverted range [{}, {})",
                    chunk.file_name, chunk.row_range.start, chunk.row_range.end
                )));
            }
            if chunk.row_range.len() != chunk.row_count {
                return Err(corrupt(format!(
                    "{} declares {} rows but covers [{}, {})",
                    chunk.file_name, chunk.row_count, chunk.row_range.start, chunk.row_range.end
                )));
            }
            expected_start = chunk.row_range.end;
        }
        Ok(())
    }

    /// Take `previous.created_at` if nothing else differs, so re-exporting
    /// an unchanged table writes identical metadata.
    pub fn keep_timestamp_if_unchanged(&mut self, previous: &Self) {
        let created_at = self.created_at;
        self.created_at = previous.created_at;
        if self != previous {
            self.created_at = created_at;
        }
    }

    /// Read and validate a table metadata file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable, malformed, or fails
    /// [`validate`](Self::validate).
    pub fn load(path: &Path) -> MetadataResult<Self> {
        let meta: Self = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        meta.validate()?;
        Ok(meta)
    }
}

/// Whether `name` is a chunk file of `table`: `<table>_` followed by six
/// digits and `.csv`, with no path components.
#[must_use]
pub fn is_chunk_file_name(table: &str, name: &str) -> bool {
    if table.is_empty() || table.contains(['/', '\\']) || table.starts_with('.') {
        return false;
    }
    name.strip_prefix(table)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix(".csv"))
        .is_some_and(|index| index.len() == 6 && index.bytes().all(|b| b.is_ascii_digit()))
}

/// Per-table line of the repository manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub table_name: String,
    pub chunk_count: usize,
    pub total_rows: u64,
    pub total_size_bytes: u64,
    pub chunking_enabled: bool,
    /// Some chunk exceeds the host's large-file threshold.
    pub large_file_flag: bool,
}

/// Chunking parameters recorded with each export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkingConfig {
    pub strategy: String,
    pub max_chunk_size: u64,
    pub large_file_threshold: u64,
    pub row_threshold: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_column: Option<String>,
}

/// Root manifest of an exported repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryManifest {
    pub tool_version: String,
    pub exported_at: DateTime<Utc>,
    pub exported_by: String,
    pub source_branch: String,
    pub source_commit: String,
    pub tables: Vec<TableSummary>,
    pub chunking_config: ChunkingConfig,
}

impl RepositoryManifest {
    /// Read a manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or malformed.
    pub fn load(path: &Path) -> MetadataResult<Self> {
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }

    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.total_rows).sum()
    }

    /// Take `previous.exported_at` if nothing else differs.
    pub fn keep_timestamp_if_unchanged(&mut self, previous: &Self) {
        let exported_at = self.exported_at;
        self.exported_at = previous.exported_at;
        if self != previous {
            self.exported_at = exported_at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(name: &str, start: u64, end: u64) -> ChunkInfo {
        ChunkInfo {
            file_name: name.to_string(),
            row_count: end - start,
            size_bytes: 10,
            row_range: RowRange::new(start, end),
            filter: None,
        }
    }

    fn meta(chunks: Vec<ChunkInfo>) -> TableMetadata {
        TableMetadata {
            table_name: "users".to_string(),
            chunking_strategy_name: "size-based".to_string(),
            max_chunk_size: 100,
            partition_column: None,
            chunks,
            schema_ddl: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_validate_accepts_out_of_order_listing() {
        let m = meta(vec![chunk("users_000002.csv", 5, 9), chunk("users_000001.csv", 0, 5)]);
        assert!(m.validate().is_ok());
        assert_eq!(m.total_rows(), 9);
    }

    #[test]
    fn test_validate_empty_table() {
        assert!(meta(vec![]).validate().is_ok());
    }

    #[test]
    fn test_validate_detects_gap() {
        let m = meta(vec![chunk("users_000001.csv", 0, 5), chunk("users_000002.csv", 6, 9)]);
        let err = m.validate().unwrap_err();
        assert!(err.to_string().contains("gap"));
    }

    #[test]
    fn test_validate_detects_overlap() {
        let m = meta(vec![chunk("users_000001.csv", 0, 5), chunk("users_000002.csv", 4, 9)]);
        let err = m.validate().unwrap_err();
        assert!(matches!(err, MetadataError::CorruptMetadata { .. }));
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_validate_detects_nonzero_start() {
        let m = meta(vec![chunk("users_000001.csv", 1, 5)]);
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_validate_detects_row_count_mismatch() {
        let mut c = chunk("users_000001.csv", 0, 5);
        c.row_count = 4;
        assert!(meta(vec![c]).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_foreign_file_names() {
        for name in [
            "/etc/passwd",
            "../secrets/users_000001.csv",
            "users_000001.csv/../../key",
            "users_1.csv",
            "orders_000001.csv",
            "users_00000a.csv",
        ] {
            let err = meta(vec![chunk(name, 0, 2)]).validate().unwrap_err();
            assert!(err.to_string().contains("not of the form"), "{name}");
        }
    }

    #[test]
    fn test_chunk_file_name_needs_a_plain_table_name() {
        assert!(is_chunk_file_name("users", "users_000042.csv"));
        assert!(!is_chunk_file_name("../users", "../users_000001.csv"));
        assert!(!is_chunk_file_name("", "_000001.csv"));
    }

    #[test]
    fn test_chunk_info_json_shape() {
        let json = serde_json::to_value(chunk("users_000001.csv", 0, 2)).unwrap();
        assert_eq!(json["fileName"], "users_000001.csv");
        assert_eq!(json["rowCount"], 2);
        assert_eq!(json["rowRange"], serde_json::json!([0, 2]));
        assert!(json.get("filter").is_none());
    }

    #[test]
    fn test_keep_timestamp_only_when_unchanged() {
        let mut earlier = meta(vec![chunk("users_000001.csv", 0, 2)]);
        earlier.created_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let mut same = meta(vec![chunk("users_000001.csv", 0, 2)]);
        same.keep_timestamp_if_unchanged(&earlier);
        assert_eq!(same.created_at, earlier.created_at);

        let mut grown = meta(vec![chunk("users_000001.csv", 0, 3)]);
        let now = grown.created_at;
        grown.keep_timestamp_if_unchanged(&earlier);
        assert_eq!(grown.created_at, now);
    }

    #[test]
    fn test_table_metadata_ddl_key() {
        let json = serde_json::to_value(meta(vec![])).unwrap();
        assert!(json.get("schemaDDL").is_some());
        assert_eq!(json["chunkingStrategyName"], "size-based");
    }
}
