//! Reads a sequence of chunk files back as one logical row stream.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::chunking::csv::{CsvError, CsvReader, Record};
use crate::chunking::{ChunkError, ChunkResult};
use crate::model::{ChunkInfo, Row, Schema, Value};
use crate::storage::source::{RowSource, SourceError, SourceResult};

type ChunkCsv = CsvReader<BufReader<File>>;

/// Row source over the data rows of several chunk files, in file-name order.
///
/// The first chunk's header defines the (untyped) schema. Every later
/// chunk's header is read, checked against it, and dropped, so the header
/// appears once in the logical stream. End of stream is reported only after
/// the last chunk is exhausted.
pub struct MultiChunkReader {
    dir: PathBuf,
    pending: VecDeque<String>,
    current: Option<(String, ChunkCsv)>,
    header: Record,
    schema: Schema,
    rows_read: u64,
}

impl MultiChunkReader {
    /// Open the chunks listed in `chunks`, located in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the first chunk cannot be opened or has no header.
    pub fn open(dir: &Path, chunks: &[ChunkInfo]) -> ChunkResult<Self> {
        let mut names: Vec<String> = chunks.iter().map(|c| c.file_name.clone()).collect();
        names.sort();
        let mut pending: VecDeque<String> = names.into();

        let mut reader = Self {
            dir: dir.to_path_buf(),
            pending: VecDeque::new(),
            current: None,
            header: Vec::new(),
            schema: Schema::default(),
            rows_read: 0,
        };

        if let Some(first) = pending.pop_front() {
            let (csv, header) = reader.open_chunk(&first)?;
            let names: Vec<String> = header.iter().map(|h| h.clone().unwrap_or_default()).collect();
            reader.schema = Schema::untyped(&names);
            reader.header = header;
            reader.current = Some((first, csv));
        }
        reader.pending = pending;
        Ok(reader)
    }

    #[must_use]
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    fn open_chunk(&self, file_name: &str) -> ChunkResult<(ChunkCsv, Record)> {
        let path = self.dir.join(file_name);
        let file = File::open(&path).map_err(|e| ChunkError::Read {
            file: file_name.to_string(),
            source: e,
        })?;
        let mut csv = CsvReader::new(BufReader::new(file));
        let header = csv
            .read_record()
            .map_err(|e| ChunkError::from_csv(file_name, e))?
            .ok_or_else(|| ChunkError::Malformed {
                file: file_name.to_string(),
                line: 1,
                reason: "missing header".to_string(),
            })?;
        debug!(chunk = %file_name, "opened chunk");
        Ok((csv, header))
    }

    fn advance(&mut self) -> ChunkResult<Option<Row>> {
        loop {
            let Some((name, csv)) = self.current.as_mut() else {
                let Some(next) = self.pending.pop_front() else {
                    return Ok(None);
                };
                let (csv, header) = self.open_chunk(&next)?;
                if header != self.header {
                    return Err(ChunkError::Malformed {
                        file: next,
                        line: 1,
                        reason: "header differs from first chunk".to_string(),
                    });
                }
                self.current = Some((next, csv));
                continue;
            };

            match csv.read_record().map_err(|e| ChunkError::from_csv(name, e))? {
                Some(record) => {
                    if record.len() != self.schema.len() {
                        return Err(ChunkError::Malformed {
                            file: name.clone(),
                            line: csv.line(),
                            reason: format!(
                                "expected {} fields, found {}",
                                self.schema.len(),
                                record.len()
                            ),
                        });
                    }
                    self.rows_read += 1;
                    return Ok(Some(
                        record
                            .into_iter()
                            .map(|f| f.map_or(Value::Null, Value::Text))
                            .collect(),
                    ));
                }
                None => self.current = None,
            }
        }
    }
}

impl RowSource for MultiChunkReader {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_row(&mut self) -> SourceResult<Option<Row>> {
        self.advance().map_err(|e| match e {
            ChunkError::Source(inner) => inner,
            ChunkError::Read { file, source } => SourceError::Io {
                source_name: file,
                error: source,
            },
            other => SourceError::read_failure("chunk set", other),
        })
    }
}

impl ChunkError {
    pub(crate) fn from_csv(file: &str, e: CsvError) -> Self {
        match e {
            CsvError::Io(source) => Self::Read {
                file: file.to_string(),
                source,
            },
            CsvError::Malformed { line, reason } => Self::Malformed {
                file: file.to_string(),
                line,
                reason,
            },
        }
    }
}
