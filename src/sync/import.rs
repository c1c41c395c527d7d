//! Import of a repository tree into the local store.
//!
//! Two paths, never mixed:
//!
//! - **Metadata**: the tree carries `.tablesync/manifest.json`. The schema in
//!   `.tablesync/schema.sql` is applied, and each table is replaced by the
//!   rows of its chunk files in a single store transaction. A table whose
//!   metadata or chunks fail validation is skipped and its local copy, if
//!   any, is left as it was; the rest of the repository still imports.
//! - **Best effort**: no manifest. Files are classified by extension
//!   (`.csv`, `.tsv`, gzip-compressed variants, SQLite archives) and each one
//!   becomes a new table. Existing local tables are never touched.
//!
//! Lossy text written on export is not re-parsed beyond the declared column
//! type; a cell that does not parse stays text.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::chunking::csv::CsvReader;
use crate::chunking::{MultiChunkReader, strategy_for};
use crate::model::{
    Column, ColumnType, RepositoryManifest, Row, Schema, TableMetadata, Value, quote_ident,
};
use crate::storage::source::convert_sql_cell;
use crate::storage::{Encoding, RowSource, SqliteStore, StoreError, validate_table_name};
use crate::sync::export::{
    MANIFEST_FILE, METADATA_DIR, SCHEMA_FILE, table_data_dir, table_metadata_path,
};
use crate::sync::types::{ImportMode, ImportStats, SyncError, SyncResult, TableImportStats};

/// Whether `root` holds an exported tree with a manifest.
#[must_use]
pub fn has_metadata(root: &Path) -> bool {
    root.join(METADATA_DIR).join(MANIFEST_FILE).is_file()
}

/// Importer for repository trees.
pub struct Importer<'a> {
    store: &'a mut SqliteStore,
    root: PathBuf,
    dry_run: bool,
}

impl<'a> Importer<'a> {
    #[must_use]
    pub fn new(store: &'a mut SqliteStore, root: &Path) -> Self {
        Self {
            store,
            root: root.to_path_buf(),
            dry_run: false,
        }
    }

    /// Read and validate everything, but leave the store untouched.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Import the tree, choosing the path by the presence of a manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest or schema document is unreadable, or
    /// the store fails. Per-table problems are reported as skipped tables.
    pub fn import(&mut self) -> SyncResult<ImportStats> {
        if has_metadata(&self.root) {
            self.import_with_metadata()
        } else {
            warn!(root = %self.root.display(), "no tablesync metadata, falling back to best-effort import");
            self.import_best_effort()
        }
    }

    // ==================
    // Metadata
    // ==================

    fn import_with_metadata(&mut self) -> SyncResult<ImportStats> {
        let meta_dir = self.root.join(METADATA_DIR);
        let manifest = RepositoryManifest::load(&meta_dir.join(MANIFEST_FILE))?;

        let schema_path = meta_dir.join(SCHEMA_FILE);
        let schema_sql = if schema_path.exists() {
            fs::read_to_string(&schema_path)?
        } else {
            String::new()
        };
        let schemas: HashMap<String, Schema> = Schema::parse_ddl(&schema_sql)?.into_iter().collect();

        let mut stats = ImportStats::new(ImportMode::Metadata);
        for summary in &manifest.tables {
            let table = summary.table_name.as_str();
            if let Err(e) = validate_table_name(table) {
                warn!(table, error = %e, "skipping table with an unusable name");
                stats.skip(table, e);
                continue;
            }

            let meta = match TableMetadata::load(&table_metadata_path(&self.root, table)) {
                Ok(meta) if meta.table_name == table => meta,
                Ok(meta) => {
                    warn!(table, found = %meta.table_name, "metadata describes another table");
                    stats.skip(table, format!("metadata describes table {}", meta.table_name));
                    continue;
                }
                Err(e) => {
                    warn!(table, error = %e, "skipping table with unusable metadata");
                    stats.skip(table, e);
                    continue;
                }
            };

            let schema = match schemas.get(table) {
                Some(schema) => schema.clone(),
                None => match Schema::parse_ddl(&meta.schema_ddl) {
                    Ok(mut parsed) if parsed.len() == 1 => parsed.remove(0).1,
                    _ => {
                        warn!(table, "no schema for table");
                        stats.skip(table, "no schema definition");
                        continue;
                    }
                },
            };

            match self.import_table(table, &schema, &meta) {
                Ok(rows) => {
                    info!(table, rows, chunks = meta.chunks.len(), "imported table");
                    stats.tables.push(TableImportStats {
                        table: table.to_string(),
                        rows,
                        chunks: meta.chunks.len(),
                        source_file: None,
                    });
                }
                Err(reason) => {
                    warn!(table, %reason, "skipping table");
                    stats.skip(table, reason);
                }
            }
        }
        Ok(stats)
    }

    /// Import one table. Errors specific to this table come back as the
    /// skip reason; a local table of the same name is left as it was.
    fn import_table(&mut self, table: &str, schema: &Schema, meta: &TableMetadata) -> Result<u64, String> {
        let dir = table_data_dir(&self.root, table);
        let mut reader = if meta.chunks.is_empty() {
            None
        } else if meta.chunks.len() == 1 {
            Some(MultiChunkReader::open(&dir, &meta.chunks).map_err(|e| e.to_string())?)
        } else {
            let strategy = strategy_for(
                &meta.chunking_strategy_name,
                meta.max_chunk_size,
                meta.partition_column.clone(),
            )
            .map_err(|e| e.to_string())?;
            Some(
                strategy
                    .reassemble_chunks(&meta.chunks, &dir)
                    .map_err(|e| e.to_string())?,
            )
        };

        if let Some(reader) = &reader {
            let header = reader.schema().column_names();
            if header != schema.column_names() {
                return Err(format!(
                    "chunk header [{}] does not match schema [{}]",
                    header.join(", "),
                    schema.column_names().join(", ")
                ));
            }
        }

        if self.dry_run {
            let mut rows = 0u64;
            if let Some(reader) = reader.as_mut() {
                while reader.next_row().map_err(|e| e.to_string())?.is_some() {
                    rows += 1;
                }
            }
            return check_row_count(meta, rows);
        }

        let rows = std::iter::from_fn(|| {
            let reader = reader.as_mut()?;
            match reader.next_row() {
                Ok(Some(row)) => Some(Ok(schema.coerce_row(row))),
                Ok(None) => None,
                Err(e) => Some(Err(StoreError::ReadFailure {
                    table: table.to_string(),
                    reason: e.to_string(),
                })),
            }
        });
        self.store
            .load_table(table, schema, Encoding::Ordinal, rows, |written| {
                match check_row_count(meta, written) {
                    Ok(_) => Ok(()),
                    Err(reason) => Err(StoreError::ReadFailure {
                        table: table.to_string(),
                        reason,
                    }),
                }
            })
            .map_err(|e| e.to_string())
    }

    // ==================
    // Best effort
    // ==================

    fn import_best_effort(&mut self) -> SyncResult<ImportStats> {
        let mut stats = ImportStats::new(ImportMode::BestEffort);
        let mut files = Vec::new();
        collect_files(&self.root, &mut files)?;
        files.sort();

        for path in files {
            let Some(kind) = FileKind::classify(&path) else {
                continue;
            };
            let relative = path
                .strip_prefix(&self.root)
                .unwrap_or(&path)
                .display()
                .to_string();
            debug!(file = %relative, ?kind, "best-effort candidate");

            let result = match kind {
                FileKind::Archive => self.import_archive(&path, &relative, &mut stats),
                FileKind::Delimited { delimiter, gzip } => {
                    self.import_delimited(&path, &relative, kind.table_name(&path), delimiter, gzip, &mut stats)
                }
            };
            if let Err(e) = result {
                warn!(file = %relative, error = %e, "skipping unreadable file");
                stats.skip(&relative, e);
            }
        }
        Ok(stats)
    }

    /// Check that a best-effort table can be created here.
    fn admit(&self, table: &str) -> Result<(), String> {
        validate_table_name(table).map_err(|e| e.to_string())?;
        match self.store.has_table(table) {
            Ok(false) => Ok(()),
            Ok(true) => Err("table already exists locally".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    fn import_delimited(
        &mut self,
        path: &Path,
        relative: &str,
        table: String,
        delimiter: char,
        gzip: bool,
        stats: &mut ImportStats,
    ) -> SyncResult<()> {
        if let Err(reason) = self.admit(&table) {
            stats.skip(&table, reason);
            return Ok(());
        }

        let file = File::open(path)?;
        let inner: Box<dyn BufRead> = if gzip {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        let mut csv = CsvReader::with_delimiter(inner, delimiter);
        let unreadable = |reason: String| SyncError::Unreadable {
            file: relative.to_string(),
            reason,
        };

        let Some(header) = csv.read_record().map_err(|e| unreadable(e.to_string()))? else {
            stats.skip(&table, "empty file");
            return Ok(());
        };
        let names: Vec<String> = header.into_iter().map(Option::unwrap_or_default).collect();
        let schema = Schema::untyped(&names);
        let width = schema.len();

        if self.dry_run {
            let mut rows = 0u64;
            while csv.read_record().map_err(|e| unreadable(e.to_string()))?.is_some() {
                rows += 1;
            }
            stats.tables.push(best_effort_stats(&table, rows, relative));
            return Ok(());
        }

        if let Err(e) = self.store.create_table(&table, &schema, Encoding::Ordinal) {
            stats.skip(&table, e);
            return Ok(());
        }

        let mut failure = None;
        let mut reshaped = 0u64;
        let rows = std::iter::from_fn(|| match csv.read_record() {
            Ok(Some(record)) => {
                if record.len() != width {
                    reshaped += 1;
                }
                let mut row: Row = record
                    .into_iter()
                    .map(|field| field.map_or(Value::Null, Value::Text))
                    .collect();
                row.resize(width, Value::Null);
                Some(row)
            }
            Ok(None) => None,
            Err(e) => {
                failure = Some(e);
                None
            }
        });
        let inserted = self.store.insert_rows(&table, rows);

        let rows = match (inserted, failure) {
            (Ok(rows), None) => rows,
            (Err(e), _) => {
                self.discard(&table);
                return Err(unreadable(e.to_string()));
            }
            (Ok(_), Some(e)) => {
                self.discard(&table);
                return Err(unreadable(e.to_string()));
            }
        };
        if reshaped > 0 {
            warn!(table = %table, reshaped, "rows padded or truncated to the header width");
        }
        info!(table = %table, rows, file = relative, "imported table (best effort)");
        stats.tables.push(best_effort_stats(&table, rows, relative));
        Ok(())
    }

    fn import_archive(&mut self, path: &Path, relative: &str, stats: &mut ImportStats) -> SyncResult<()> {
        let unreadable = |e: rusqlite::Error| SyncError::Unreadable {
            file: relative.to_string(),
            reason: e.to_string(),
        };
        let archive = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(unreadable)?;

        let tables: Vec<String> = {
            let mut stmt = archive
                .prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' \
                     AND name NOT LIKE 'sqlite_%' ORDER BY name",
                )
                .map_err(unreadable)?;
            stmt.query_map([], |row| row.get(0))
                .map_err(unreadable)?
                .collect::<Result<_, _>>()
                .map_err(unreadable)?
        };

        for table in tables {
            if let Err(reason) = self.admit(&table) {
                stats.skip(&table, reason);
                continue;
            }
            let schema = archive_schema(&archive, &table).map_err(unreadable)?;
            if schema.is_empty() {
                stats.skip(&table, "no columns");
                continue;
            }

            let mut stmt = archive
                .prepare(&format!("SELECT * FROM {}", quote_ident(&table)))
                .map_err(unreadable)?;
            let types: Vec<ColumnType> = schema.columns().iter().map(|c| c.column_type).collect();

            if self.dry_run {
                let mut rows = stmt.query([]).map_err(unreadable)?;
                let mut count = 0u64;
                while rows.next().map_err(unreadable)?.is_some() {
                    count += 1;
                }
                stats.tables.push(best_effort_stats(&table, count, relative));
                continue;
            }

            if let Err(e) = self.store.create_table(&table, &schema, Encoding::Ordinal) {
                stats.skip(&table, e);
                continue;
            }

            let mut cursor = stmt.query([]).map_err(unreadable)?;
            let mut failure = None;
            let mut degraded = 0u64;
            let rows = std::iter::from_fn(|| match cursor.next() {
                Ok(Some(sql_row)) => {
                    let mut row = Vec::with_capacity(types.len());
                    for (i, ty) in types.iter().enumerate() {
                        match sql_row.get_ref(i) {
                            Ok(cell) => {
                                let (value, exact) = convert_sql_cell(cell, *ty);
                                if !exact {
                                    degraded += 1;
                                }
                                row.push(value);
                            }
                            Err(e) => {
                                failure = Some(e);
                                return None;
                            }
                        }
                    }
                    Some(row)
                }
                Ok(None) => None,
                Err(e) => {
                    failure = Some(e);
                    None
                }
            });
            let inserted = self.store.insert_rows(&table, rows);

            match (inserted, failure) {
                (Ok(rows), None) => {
                    if degraded > 0 {
                        warn!(table = %table, degraded, "cells imported as lossy text");
                    }
                    info!(table = %table, rows, file = relative, "imported table (best effort)");
                    stats.tables.push(best_effort_stats(&table, rows, relative));
                }
                (Err(e), _) => {
                    self.discard(&table);
                    stats.skip(&table, e);
                }
                (Ok(_), Some(e)) => {
                    self.discard(&table);
                    stats.skip(&table, e);
                }
            }
        }
        Ok(())
    }

    fn discard(&mut self, table: &str) {
        if let Err(e) = self.store.drop_table(table) {
            warn!(table, error = %e, "could not drop partially imported table");
        }
    }
}

fn check_row_count(meta: &TableMetadata, rows: u64) -> Result<u64, String> {
    let expected = meta.total_rows();
    if rows == expected {
        Ok(rows)
    } else {
        Err(format!("metadata declares {expected} rows but chunks hold {rows}"))
    }
}

fn best_effort_stats(table: &str, rows: u64, relative: &str) -> TableImportStats {
    TableImportStats {
        table: table.to_string(),
        rows,
        chunks: 1,
        source_file: Some(relative.to_string()),
    }
}

fn archive_schema(conn: &Connection, table: &str) -> rusqlite::Result<Schema> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let columns = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let declared: String = row.get::<_, Option<String>>(2)?.unwrap_or_default();
            let not_null: i64 = row.get(3)?;
            let pk: i64 = row.get(5)?;
            let mut column = Column::new(name, ColumnType::from_sql_name(&declared));
            if not_null != 0 {
                column = column.not_null();
            }
            if pk != 0 {
                column = column.primary_key();
            }
            Ok(column)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Schema::new(columns))
}

/// Walk `dir`, skipping `.git`, and collect regular files.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if entry.file_name() == ".git" {
                continue;
            }
            collect_files(&path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

/// Importable file formats, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Delimited { delimiter: char, gzip: bool },
    Archive,
}

impl FileKind {
    const SUFFIXES: [(&'static str, Self); 7] = [
        (".csv.gz", Self::Delimited { delimiter: ',', gzip: true }),
        (".tsv.gz", Self::Delimited { delimiter: '\t', gzip: true }),
        (".csv", Self::Delimited { delimiter: ',', gzip: false }),
        (".tsv", Self::Delimited { delimiter: '\t', gzip: false }),
        (".sqlite3", Self::Archive),
        (".sqlite", Self::Archive),
        (".db", Self::Archive),
    ];

    fn classify(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        Self::SUFFIXES
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix) && name.len() > suffix.len())
            .map(|(_, kind)| *kind)
    }

    /// Table name for a delimited file: the file name without its suffix.
    fn table_name(self, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let lower = name.to_ascii_lowercase();
        Self::SUFFIXES
            .iter()
            .find(|(suffix, kind)| *kind == self && lower.ends_with(suffix))
            .map_or(name.clone(), |(suffix, _)| name[..name.len() - suffix.len()].to_string())
    }
}
