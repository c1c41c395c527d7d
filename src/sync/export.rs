//! Snapshot export of the local store into a repository tree.
//!
//! # Snapshot Mode
//!
//! Every export regenerates the whole tree: `data/`, `.tablesync/` and the
//! generated files are removed first, then each table is written as chunk
//! files plus its metadata. Git tracks the history.
//!
//! Timestamps from the previous export in the tree are kept for tables (and
//! the manifest) whose content did not change, so re-exporting unchanged
//! data leaves the tree identical and produces no commit.
//!
//! # Layout
//!
//! ```text
//! .tablesync/manifest.json
//! .tablesync/schema.sql
//! .tablesync/tables/<table>.json
//! data/<table>/<table>_000001.csv
//! README.md
//! .gitattributes            (only when some chunk is large)
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::chunking::{
    ChunkingStrategy, SIZE_SAMPLE_ROWS, SizeBasedStrategy, estimate_table_size, strategy_for,
};
use crate::config::{DEFAULT_CHUNK_SIZE, LARGE_FILE_THRESHOLD, ROW_THRESHOLD};
use crate::model::{ChunkingConfig, RepositoryManifest, TableMetadata, TableSummary};
use crate::storage::{SqliteStore, validate_table_name};
use crate::sync::file::{atomic_write, remove_tree};
use crate::sync::readme::{render_gitattributes, render_readme};
use crate::sync::types::{ExportStats, SyncResult, TableExportStats};

/// Metadata directory at the root of an exported tree.
pub const METADATA_DIR: &str = ".tablesync";

/// Chunk data directory at the root of an exported tree.
pub const DATA_DIR: &str = "data";

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SCHEMA_FILE: &str = "schema.sql";
pub const TABLES_DIR: &str = "tables";

/// Path of a table's metadata file under `root`.
#[must_use]
pub fn table_metadata_path(root: &Path, table: &str) -> PathBuf {
    root.join(METADATA_DIR).join(TABLES_DIR).join(format!("{table}.json"))
}

/// Path of a table's chunk directory under `root`.
#[must_use]
pub fn table_data_dir(root: &Path, table: &str) -> PathBuf {
    root.join(DATA_DIR).join(table)
}

/// Export parameters.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub strategy: String,
    pub max_chunk_size: u64,
    pub large_file_threshold: u64,
    pub row_threshold: u64,
    pub partition_column: Option<String>,
    pub exported_by: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            strategy: crate::chunking::size::NAME.to_string(),
            max_chunk_size: DEFAULT_CHUNK_SIZE,
            large_file_threshold: LARGE_FILE_THRESHOLD,
            row_threshold: ROW_THRESHOLD,
            partition_column: None,
            exported_by: "unknown".to_string(),
        }
    }
}

impl ExportSettings {
    fn chunking_config(&self) -> ChunkingConfig {
        ChunkingConfig {
            strategy: self.strategy.clone(),
            max_chunk_size: self.max_chunk_size,
            large_file_threshold: self.large_file_threshold,
            row_threshold: self.row_threshold,
            partition_column: self.partition_column.clone(),
        }
    }
}

/// Metadata of the export already present in the output tree.
#[derive(Debug, Default)]
struct PreviousExport {
    manifest: Option<RepositoryManifest>,
    tables: HashMap<String, TableMetadata>,
}

impl PreviousExport {
    /// Read whatever is readable; anything missing or malformed is ignored.
    fn load(root: &Path) -> Self {
        let Ok(manifest) = RepositoryManifest::load(&root.join(METADATA_DIR).join(MANIFEST_FILE)) else {
            return Self::default();
        };
        let tables = manifest
            .tables
            .iter()
            .filter(|t| validate_table_name(&t.table_name).is_ok())
            .filter_map(|t| TableMetadata::load(&table_metadata_path(root, &t.table_name)).ok())
            .map(|meta| (meta.table_name.clone(), meta))
            .collect();
        Self {
            manifest: Some(manifest),
            tables,
        }
    }
}

/// Exporter for repository trees.
///
/// Tables are exported one at a time in name order, each in a single
/// forward pass over its row source.
pub struct Exporter<'a> {
    store: &'a SqliteStore,
    output_dir: PathBuf,
    settings: ExportSettings,
}

impl<'a> Exporter<'a> {
    #[must_use]
    pub fn new(store: &'a SqliteStore, output_dir: &Path, settings: ExportSettings) -> Self {
        Self {
            store,
            output_dir: output_dir.to_path_buf(),
            settings,
        }
    }

    /// Get the output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Export every table, then write the schema, manifest and README.
    ///
    /// # Errors
    ///
    /// Returns an error if a table cannot be read or a file cannot be
    /// written. Chunk files already written for the failing table are left
    /// in place.
    pub fn export(&self) -> SyncResult<ExportStats> {
        let previous = PreviousExport::load(&self.output_dir);
        remove_tree(&self.output_dir.join(DATA_DIR))?;
        remove_tree(&self.output_dir.join(METADATA_DIR))?;
        let attributes = self.output_dir.join(".gitattributes");
        if attributes.exists() {
            fs::remove_file(&attributes)?;
        }

        let strategy = strategy_for(
            &self.settings.strategy,
            self.settings.max_chunk_size,
            self.settings.partition_column.clone(),
        )?;

        let mut stats = ExportStats::default();
        let mut metadata = Vec::new();
        let mut ddl = Vec::new();

        for table in self.store.list_tables()? {
            let (table_stats, meta) = self.export_table(&table, strategy.as_ref(), &previous)?;
            ddl.push(meta.schema_ddl.clone());
            stats.tables.push(table_stats);
            metadata.push(meta);
        }

        let meta_dir = self.output_dir.join(METADATA_DIR);
        let mut schema_sql = ddl.join("\n\n");
        if !schema_sql.is_empty() {
            schema_sql.push('\n');
        }
        atomic_write(&meta_dir.join(SCHEMA_FILE), &schema_sql)?;

        let mut manifest = RepositoryManifest {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            exported_by: self.settings.exported_by.clone(),
            source_branch: self.store.current_branch()?,
            source_commit: self.store.head()?,
            tables: metadata
                .iter()
                .zip(&stats.tables)
                .map(|(meta, s)| TableSummary {
                    table_name: meta.table_name.clone(),
                    chunk_count: meta.chunks.len(),
                    total_rows: meta.total_rows(),
                    total_size_bytes: meta.total_size_bytes(),
                    chunking_enabled: s.chunked,
                    large_file_flag: s.large,
                })
                .collect(),
            chunking_config: self.settings.chunking_config(),
        };
        if let Some(prev) = &previous.manifest {
            manifest.keep_timestamp_if_unchanged(prev);
        }
        atomic_write(
            &meta_dir.join(MANIFEST_FILE),
            &serde_json::to_string_pretty(&manifest)?,
        )?;

        atomic_write(&self.output_dir.join("README.md"), &render_readme(&manifest, &metadata))?;
        if let Some(attrs) = render_gitattributes(&manifest) {
            atomic_write(&attributes, &attrs)?;
        }

        info!(
            tables = stats.tables.len(),
            rows = stats.total_rows(),
            chunks = stats.total_chunks(),
            "export complete"
        );
        Ok(stats)
    }

    fn export_table(
        &self,
        table: &str,
        strategy: &dyn ChunkingStrategy,
        previous: &PreviousExport,
    ) -> SyncResult<(TableExportStats, TableMetadata)> {
        let schema = self.store.table_schema(table)?;
        let rows = self.store.row_count(table)?;

        let estimated = {
            let mut sample = self.store.open_source(table, 0, SIZE_SAMPLE_ROWS)?;
            estimate_table_size(sample.as_mut(), rows)?
        };
        let chunked = strategy.should_chunk(table, estimated) || rows > self.settings.row_threshold;

        let dir = table_data_dir(&self.output_dir, table);
        let mut source = self.store.open_full_source(table)?;
        let chunks = if chunked {
            strategy.create_chunks(table, source.as_mut(), &dir)?
        } else {
            SizeBasedStrategy::new(u64::MAX).create_chunks(table, source.as_mut(), &dir)?
        };

        let degraded = source.degraded_cells();
        if degraded > 0 {
            warn!(table, degraded, "cells exported as lossy text");
        }

        let mut meta = TableMetadata {
            table_name: table.to_string(),
            chunking_strategy_name: strategy.name().to_string(),
            max_chunk_size: strategy.max_chunk_size(),
            partition_column: strategy.partition_column().map(str::to_string),
            chunks,
            schema_ddl: schema.to_ddl(table),
            created_at: Utc::now(),
        };
        if let Some(prev) = previous.tables.get(table) {
            meta.keep_timestamp_if_unchanged(prev);
        }
        atomic_write(
            &table_metadata_path(&self.output_dir, table),
            &serde_json::to_string_pretty(&meta)?,
        )?;

        let table_stats = TableExportStats {
            table: table.to_string(),
            rows: meta.total_rows(),
            chunks: meta.chunks.len(),
            size_bytes: meta.total_size_bytes(),
            chunked,
            large: meta
                .chunks
                .iter()
                .any(|c| c.size_bytes > self.settings.large_file_threshold),
            degraded_cells: degraded,
        };
        info!(
            table,
            rows = table_stats.rows,
            chunks = table_stats.chunks,
            chunked,
            "exported table"
        );
        Ok((table_stats, meta))
    }
}
