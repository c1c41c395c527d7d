//! Size-bounded chunking, the default strategy.

use std::path::Path;

use tracing::debug;

use crate::chunking::csv::{encode_header, encode_row};
use crate::chunking::{ChunkResult, ChunkingStrategy, MultiChunkWriter};
use crate::model::ChunkInfo;
use crate::storage::source::RowSource;

pub const NAME: &str = "size-based";

/// Splits a table into chunks of at most `max_chunk_size` bytes each.
///
/// The bound is per chunk and advisory: a single row larger than the bound
/// still goes whole into its own chunk.
#[derive(Debug, Clone)]
pub struct SizeBasedStrategy {
    max_chunk_size: u64,
}

impl SizeBasedStrategy {
    #[must_use]
    pub fn new(max_chunk_size: u64) -> Self {
        Self { max_chunk_size }
    }
}

impl ChunkingStrategy for SizeBasedStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn max_chunk_size(&self) -> u64 {
        self.max_chunk_size
    }

    fn should_chunk(&self, table: &str, estimated_size: u64) -> bool {
        let chunk = estimated_size > self.max_chunk_size;
        debug!(table, estimated_size, max = self.max_chunk_size, chunk, "chunking decision");
        chunk
    }

    fn create_chunks(
        &self,
        table: &str,
        source: &mut dyn RowSource,
        output_dir: &Path,
    ) -> ChunkResult<Vec<ChunkInfo>> {
        let mut writer = MultiChunkWriter::new(table, source.schema(), output_dir, self.max_chunk_size)?;
        while let Some(row) = source.next_row()? {
            writer.write_row(&row)?;
        }
        writer.finish()
    }
}

/// Estimate the exported size of a table from a sample of its first rows.
///
/// Averages the encoded length of up to `sample`'s rows and scales it to
/// `total_rows`, plus one header line.
///
/// # Errors
///
/// Propagates source errors.
pub fn estimate_table_size(sample: &mut dyn RowSource, total_rows: u64) -> ChunkResult<u64> {
    let header = encode_header(&sample.schema().column_names()).len() as u64;
    let mut sampled = 0u64;
    let mut bytes = 0u64;
    while let Some(row) = sample.next_row()? {
        sampled += 1;
        bytes += encode_row(&row).len() as u64;
    }
    if sampled == 0 {
        return Ok(header);
    }
    Ok(header + (bytes / sampled).saturating_mul(total_rows))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::model::{Column, ColumnType, Row, RowRange, Schema, Value};
    use crate::storage::source::{VecRowSource, collect_rows};

    fn users_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", ColumnType::Integer).primary_key(),
            Column::new("name", ColumnType::Text),
            Column::new("email", ColumnType::Text),
        ])
    }

    fn users() -> Vec<Row> {
        vec![
            vec![
                Value::Int(1),
                Value::Text("Alice Johnson".into()),
                Value::Text("alice@example.com".into()),
            ],
            vec![
                Value::Int(2),
                Value::Text("Bob Smith".into()),
                Value::Text("bob@example.com".into()),
            ],
        ]
    }

    fn numbered(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| vec![Value::Int(i as i64), Value::Text(format!("row-{i}"))])
            .collect()
    }

    fn two_col() -> Schema {
        Schema::new(vec![
            Column::new("n", ColumnType::Integer),
            Column::new("label", ColumnType::Text),
        ])
    }

    fn export(schema: Schema, rows: Vec<Row>, max: u64) -> (TempDir, Vec<ChunkInfo>) {
        let dir = TempDir::new().unwrap();
        let strategy = SizeBasedStrategy::new(max);
        let mut source = VecRowSource::new(schema, rows);
        let chunks = strategy.create_chunks("t", &mut source, dir.path()).unwrap();
        (dir, chunks)
    }

    fn reassemble(dir: &TempDir, chunks: &[ChunkInfo], schema: &Schema) -> Vec<Row> {
        let strategy = SizeBasedStrategy::new(0);
        let mut reader = strategy.reassemble_chunks(chunks, dir.path()).unwrap();
        collect_rows(&mut reader)
            .unwrap()
            .into_iter()
            .map(|r| schema.coerce_row(r))
            .collect()
    }

    fn assert_partition(chunks: &[ChunkInfo], n: u64) {
        let mut sorted = chunks.to_vec();
        sorted.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        let mut next = 0;
        for c in &sorted {
            assert!(c.row_count > 0 || n == 0, "empty chunk {}", c.file_name);
            assert_eq!(c.row_range.start, next);
            assert_eq!(c.row_range.len(), c.row_count);
            next = c.row_range.end;
        }
        assert_eq!(next, n);
        assert_eq!(chunks.iter().map(|c| c.row_count).sum::<u64>(), n);
    }

    #[test]
    fn test_users_single_chunk() {
        let dir = TempDir::new().unwrap();
        let strategy = SizeBasedStrategy::new(50 * 1024 * 1024);
        let mut source = VecRowSource::new(users_schema(), users());
        let chunks = strategy.create_chunks("users", &mut source, dir.path()).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].file_name, "users_000001.csv");
        assert_eq!(chunks[0].row_count, 2);

        let text = fs::read_to_string(dir.path().join("users_000001.csv")).unwrap();
        assert_eq!(
            text,
            "id,name,email\n1,Alice Johnson,alice@example.com\n2,Bob Smith,bob@example.com\n"
        );
        assert_eq!(chunks[0].size_bytes, text.len() as u64);
    }

    #[test]
    fn test_users_split_after_first_row() {
        let header = "id,name,email\n".len() as u64;
        let first = "1,Alice Johnson,alice@example.com\n".len() as u64;
        let dir = TempDir::new().unwrap();
        let strategy = SizeBasedStrategy::new(header + first);
        let mut source = VecRowSource::new(users_schema(), users());
        let chunks = strategy.create_chunks("users", &mut source, dir.path()).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].row_range, crate::model::RowRange::new(0, 1));
        assert_eq!(chunks[1].row_range, crate::model::RowRange::new(1, 2));
        for c in &chunks {
            let text = fs::read_to_string(dir.path().join(&c.file_name)).unwrap();
            assert!(text.starts_with("id,name,email\n"));
        }

        let rows = reassemble(&dir, &chunks, &users_schema());
        assert_eq!(rows, users());
    }

    #[test]
    fn test_header_appears_once_in_stream() {
        let (dir, chunks) = export(two_col(), numbered(50), 40);
        assert!(chunks.len() > 1);
        let strategy = SizeBasedStrategy::new(40);
        let mut reader = strategy.reassemble_chunks(&chunks, dir.path()).unwrap();
        assert_eq!(reader.schema().column_names(), vec!["n", "label"]);
        let rows = collect_rows(&mut reader).unwrap();
        assert_eq!(rows.len(), 50);
        assert!(rows.iter().all(|r| r[1] != Value::Text("label".into())));
    }

    #[test]
    fn test_chunk_coverage_for_many_sizes() {
        for max in [1, 20, 37, 64, 200, 10_000] {
            for n in [0, 1, 2, 17, 300] {
                let (_dir, chunks) = export(two_col(), numbered(n), max);
                assert_partition(&chunks, n as u64);
            }
        }
    }

    #[test]
    fn test_round_trip_zero_one_many() {
        for n in [0, 1, 1_500] {
            let (dir, chunks) = export(two_col(), numbered(n), 256);
            assert_eq!(reassemble(&dir, &chunks, &two_col()), numbered(n));
        }
    }

    #[test]
    fn test_empty_table_writes_header_only_chunk() {
        let (dir, chunks) = export(two_col(), Vec::new(), 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].file_name, "t_000001.csv");
        assert_eq!(chunks[0].row_count, 0);
        assert_eq!(chunks[0].row_range, RowRange::new(0, 0));
        let text = fs::read_to_string(dir.path().join("t_000001.csv")).unwrap();
        assert_eq!(text, "n,label\n");
    }

    #[test]
    fn test_oversized_row_gets_its_own_chunk() {
        let big = "x".repeat(500);
        let rows = vec![vec![Value::Int(1), Value::Text(big)]];
        let (dir, chunks) = export(two_col(), rows.clone(), 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].row_count, 1);
        assert!(chunks[0].size_bytes > 50);
        assert_eq!(reassemble(&dir, &chunks, &two_col()), rows);
    }

    #[test]
    fn test_oversized_row_between_small_rows() {
        let rows = vec![
            vec![Value::Int(1), Value::Text("a".into())],
            vec![Value::Int(2), Value::Text("y".repeat(300))],
            vec![Value::Int(3), Value::Text("b".into())],
        ];
        let (dir, chunks) = export(two_col(), rows.clone(), 30);
        assert_eq!(chunks.len(), 3);
        assert_partition(&chunks, 3);
        assert_eq!(reassemble(&dir, &chunks, &two_col()), rows);
    }

    #[test]
    fn test_awkward_values_survive() {
        let schema = Schema::new(vec![
            Column::new("t", ColumnType::Text),
            Column::new("b", ColumnType::Blob),
            Column::new("f", ColumnType::Real),
            Column::new("ok", ColumnType::Boolean),
        ]);
        let rows = vec![
            vec![
                Value::Text("comma, \"quote\"\nnewline".into()),
                Value::Blob(vec![0, 1, 254]),
                Value::Float(2.0),
                Value::Bool(false),
            ],
            vec![Value::Text(String::new()), Value::Null, Value::Null, Value::Null],
            vec![Value::Text("  spaced  ".into()), Value::Blob(Vec::new()), Value::Float(-0.5), Value::Bool(true)],
        ];
        let (dir, chunks) = export(schema.clone(), rows.clone(), 40);
        assert_eq!(reassemble(&dir, &chunks, &schema), rows);
    }

    #[test]
    fn test_estimate_scales_sample() {
        let mut sample = VecRowSource::new(two_col(), numbered(10));
        let per_row = "0,row-0\n".len() as u64;
        let est = estimate_table_size(&mut sample, 1_000).unwrap();
        assert!(est >= per_row * 1_000);
        assert!(est < per_row * 1_000 * 2);

        let mut empty = VecRowSource::new(two_col(), Vec::new());
        assert_eq!(estimate_table_size(&mut empty, 0).unwrap(), "n,label\n".len() as u64);
    }

    #[test]
    fn test_should_chunk_threshold() {
        let s = SizeBasedStrategy::new(100);
        assert!(!s.should_chunk("t", 100));
        assert!(s.should_chunk("t", 101));
    }
}
