//! Writes one logical table as a sequence of size-bounded chunk files.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::chunking::csv::{encode_header, encode_row};
use crate::chunking::{ChunkError, ChunkResult, MAX_CHUNK_INDEX, chunk_file_name};
use crate::model::{ChunkInfo, Row, RowRange, Schema};

struct OpenChunk {
    file_name: String,
    path: PathBuf,
    writer: BufWriter<File>,
    start: u64,
    rows: u64,
    size: u64,
}

/// Streaming chunk writer.
///
/// Chunk files are opened lazily on the first row that needs them, so a
/// chunk is only ever empty when the whole table is: an empty table still
/// gets one header-only chunk. A row that alone exceeds `max_chunk_size` is
/// written whole into its own chunk.
pub struct MultiChunkWriter {
    table: String,
    dir: PathBuf,
    header: String,
    max_chunk_size: u64,
    current: Option<OpenChunk>,
    chunks: Vec<ChunkInfo>,
    rows_written: u64,
}

impl MultiChunkWriter {
    /// Prepare a writer that places chunks of `table` in `dir`.
    ///
    /// # Errors
    ///
    /// Returns `ChunkWriteFailure` if the directory cannot be created.
    pub fn new(table: &str, schema: &Schema, dir: &Path, max_chunk_size: u64) -> ChunkResult<Self> {
        fs::create_dir_all(dir).map_err(|e| ChunkError::write_failure(dir.display(), e))?;
        Ok(Self {
            table: table.to_string(),
            dir: dir.to_path_buf(),
            header: encode_header(&schema.column_names()),
            max_chunk_size,
            current: None,
            chunks: Vec::new(),
            rows_written: 0,
        })
    }

    /// Append one row, rolling over to a new chunk when the current one
    /// would exceed the size bound.
    ///
    /// # Errors
    ///
    /// Returns `ChunkWriteFailure` on any IO error.
    pub fn write_row(&mut self, row: &Row) -> ChunkResult<()> {
        let line = encode_row(row);
        let row_size = line.len() as u64;

        if let Some(chunk) = &self.current {
            if chunk.rows > 0 && chunk.size.saturating_add(row_size) > self.max_chunk_size {
                self.finalize_current()?;
            }
        }

        let chunk = match self.current.take() {
            Some(chunk) => chunk,
            None => self.open_next()?,
        };
        let chunk = self.current.insert(chunk);

        chunk
            .writer
            .write_all(line.as_bytes())
            .map_err(|e| ChunkError::write_failure(&chunk.file_name, e))?;
        chunk.rows += 1;
        chunk.size += row_size;
        self.rows_written += 1;
        Ok(())
    }

    /// Finalize the last chunk and return every chunk written, in order.
    ///
    /// # Errors
    ///
    /// Returns `ChunkWriteFailure` if the final flush fails.
    pub fn finish(mut self) -> ChunkResult<Vec<ChunkInfo>> {
        if self.current.is_none() && self.chunks.is_empty() {
            let header_only = self.open_next()?;
            self.current = Some(header_only);
        }
        self.finalize_current()?;
        Ok(self.chunks)
    }

    #[must_use]
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    fn open_next(&mut self) -> ChunkResult<OpenChunk> {
        let index = self.chunks.len() + 1;
        if index > MAX_CHUNK_INDEX {
            return Err(ChunkError::write_failure(
                &self.table,
                std::io::Error::other(format!("more than {MAX_CHUNK_INDEX} chunks")),
            ));
        }

        let file_name = chunk_file_name(&self.table, index);
        let path = self.dir.join(&file_name);
        let file = File::create(&path).map_err(|e| ChunkError::write_failure(&file_name, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(self.header.as_bytes())
            .map_err(|e| ChunkError::write_failure(&file_name, e))?;

        Ok(OpenChunk {
            file_name,
            path,
            writer,
            start: self.rows_written,
            rows: 0,
            size: self.header.len() as u64,
        })
    }

    fn finalize_current(&mut self) -> ChunkResult<()> {
        let Some(chunk) = self.current.take() else {
            return Ok(());
        };
        let OpenChunk {
            file_name,
            path,
            writer,
            start,
            rows,
            ..
        } = chunk;

        let file = writer
            .into_inner()
            .map_err(|e| ChunkError::write_failure(&file_name, e.into_error()))?;
        file.sync_all()
            .map_err(|e| ChunkError::write_failure(&file_name, e))?;
        let size_bytes = fs::metadata(&path)
            .map_err(|e| ChunkError::write_failure(&file_name, e))?
            .len();

        debug!(table = %self.table, chunk = %file_name, rows, size_bytes, "chunk written");
        self.chunks.push(ChunkInfo {
            file_name,
            row_count: rows,
            size_bytes,
            row_range: RowRange::new(start, start + rows),
            filter: None,
        });
        Ok(())
    }
}
