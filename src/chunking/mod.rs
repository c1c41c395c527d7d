//! Chunking strategies and the multi-file chunk codec.
//!
//! A [`ChunkingStrategy`] decides whether a table needs splitting, writes
//! it as chunk files, and reads those files back as one row stream.
//!
//! # Submodules
//!
//! - [`csv`] - Record encoding and streaming record reader
//! - [`writer`] - [`MultiChunkWriter`]
//! - [`reader`] - [`MultiChunkReader`]
//! - [`size`] - [`SizeBasedStrategy`], the default
//! - [`column`] - [`ColumnBasedStrategy`], partition-column contract

pub mod column;
pub mod csv;
pub mod reader;
pub mod size;
pub mod writer;

use std::fmt;
use std::path::Path;

pub use column::ColumnBasedStrategy;
pub use reader::MultiChunkReader;
pub use size::{SizeBasedStrategy, estimate_table_size};
pub use writer::MultiChunkWriter;

use crate::model::ChunkInfo;
use crate::storage::source::{RowSource, SourceError};

/// Highest chunk index that keeps six-digit names in logical order.
pub const MAX_CHUNK_INDEX: usize = 999_999;

/// Rows sampled when estimating a table's exported size.
pub const SIZE_SAMPLE_ROWS: u64 = 100;

/// File name of the `index`-th (1-based) chunk of `table`.
#[must_use]
pub fn chunk_file_name(table: &str, index: usize) -> String {
    format!("{table}_{index:06}.csv")
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// IO failure mid-export. Chunk files already written are left in place.
    #[error("failed to write chunk {file}: {source}")]
    ChunkWriteFailure {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read chunk {file}: {source}")]
    Read {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed chunk {file} at line {line}: {reason}")]
    Malformed {
        file: String,
        line: u64,
        reason: String,
    },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("unknown chunking strategy: {0}")]
    UnknownStrategy(String),
}

impl ChunkError {
    pub(crate) fn write_failure(file: impl fmt::Display, source: std::io::Error) -> Self {
        Self::ChunkWriteFailure {
            file: file.to_string(),
            source,
        }
    }
}

pub type ChunkResult<T> = std::result::Result<T, ChunkError>;

/// How a table is split into chunk files and read back.
pub trait ChunkingStrategy {
    /// Name recorded in table metadata and used to pick the strategy on import.
    fn name(&self) -> &'static str;

    fn max_chunk_size(&self) -> u64;

    /// Partition column, for strategies that split by column value.
    fn partition_column(&self) -> Option<&str> {
        None
    }

    /// Whether a table of the given estimated size should be split.
    fn should_chunk(&self, table: &str, estimated_size: u64) -> bool;

    /// Write `source` as chunk files of `table` under `output_dir`.
    ///
    /// # Errors
    ///
    /// Returns `ChunkWriteFailure` on IO errors and propagates source errors.
    fn create_chunks(
        &self,
        table: &str,
        source: &mut dyn RowSource,
        output_dir: &Path,
    ) -> ChunkResult<Vec<ChunkInfo>>;

    /// Open `chunks` under `input_dir` as one ordered row stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the first chunk cannot be opened.
    fn reassemble_chunks(&self, chunks: &[ChunkInfo], input_dir: &Path) -> ChunkResult<MultiChunkReader> {
        MultiChunkReader::open(input_dir, chunks)
    }
}

/// Build a strategy by its recorded name.
///
/// # Errors
///
/// Returns `UnknownStrategy` for names no strategy answers to.
pub fn strategy_for(
    name: &str,
    max_chunk_size: u64,
    partition_column: Option<String>,
) -> ChunkResult<Box<dyn ChunkingStrategy>> {
    match name {
        size::NAME => Ok(Box::new(SizeBasedStrategy::new(max_chunk_size))),
        column::NAME => Ok(Box::new(ColumnBasedStrategy::new(
            max_chunk_size,
            partition_column.unwrap_or_default(),
        ))),
        other => Err(ChunkError::UnknownStrategy(other.to_string())),
    }
}
