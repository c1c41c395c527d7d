//! Partition-column chunking.
//!
//! The contract is one chunk per distinct value of `partition_column` (for
//! example one chunk per day), with each chunk's `filter` naming its
//! partition. Until partitioned writing lands, chunks are produced by the
//! size-based algorithm and carry no filter.

use std::path::Path;

use tracing::debug;

use crate::chunking::{ChunkResult, ChunkingStrategy, SizeBasedStrategy};
use crate::model::ChunkInfo;
use crate::storage::source::RowSource;

pub const NAME: &str = "column-based";

#[derive(Debug, Clone)]
pub struct ColumnBasedStrategy {
    partition_column: String,
    fallback: SizeBasedStrategy,
}

impl ColumnBasedStrategy {
    #[must_use]
    pub fn new(max_chunk_size: u64, partition_column: impl Into<String>) -> Self {
        Self {
            partition_column: partition_column.into(),
            fallback: SizeBasedStrategy::new(max_chunk_size),
        }
    }
}

impl ChunkingStrategy for ColumnBasedStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn max_chunk_size(&self) -> u64 {
        self.fallback.max_chunk_size()
    }

    fn partition_column(&self) -> Option<&str> {
        Some(&self.partition_column)
    }

    fn should_chunk(&self, table: &str, estimated_size: u64) -> bool {
        self.fallback.should_chunk(table, estimated_size)
    }

    fn create_chunks(
        &self,
        table: &str,
        source: &mut dyn RowSource,
        output_dir: &Path,
    ) -> ChunkResult<Vec<ChunkInfo>> {
        debug!(
            table,
            partition_column = %self.partition_column,
            "partitioned writing not available, using size-based chunks"
        );
        self.fallback.create_chunks(table, source, output_dir)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::model::{Schema, Value};
    use crate::storage::source::VecRowSource;

    #[test]
    fn test_delegates_to_size_based() {
        let dir = TempDir::new().unwrap();
        let strategy = ColumnBasedStrategy::new(1, "day");
        let rows = (0..3).map(|i| vec![Value::Text(format!("2024-01-0{i}"))]).collect();
        let mut source = VecRowSource::new(Schema::untyped(&["day"]), rows);
        let chunks = strategy.create_chunks("events", &mut source, dir.path()).unwrap();

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.filter.is_none()));
        assert_eq!(strategy.partition_column(), Some("day"));
    }
}
