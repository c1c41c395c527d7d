//! Working copy status and sync result display.
//!
//! Status is computed from the local store (tables, row counts, branch) and
//! the ledger (staging, remote, last export). Tables are reported as
//! staged, modified or untracked; contents are never compared.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::ledger::{Ledger, TableState};
use crate::storage::{Encoding, SqliteStore};
use crate::sync::types::{ExportStats, ImportMode, ImportStats, SyncResult};

/// One table line of `status`.
#[derive(Debug, Clone, Serialize)]
pub struct TableStatus {
    pub name: String,
    pub state: TableState,
    pub rows: u64,
    pub encoding: Encoding,
}

/// Snapshot of a working copy.
#[derive(Debug, Clone, Serialize)]
pub struct WorkingCopyStatus {
    pub branch: String,
    pub head: String,
    pub remote_url: Option<String>,
    pub last_pull: Option<DateTime<Utc>>,
    pub last_export: Option<DateTime<Utc>>,
    pub tables: Vec<TableStatus>,
    pub staged: Vec<String>,
    pub commits: usize,
}

/// Gather status for the working copy.
///
/// # Errors
///
/// Returns an error if store queries fail.
pub fn get_status(store: &SqliteStore, ledger: &Ledger) -> SyncResult<WorkingCopyStatus> {
    let names = store.list_tables()?;
    let mut tables = Vec::with_capacity(names.len());
    for (name, state) in ledger.status(&names) {
        tables.push(TableStatus {
            rows: store.row_count(&name)?,
            encoding: store.table_encoding(&name)?,
            name,
            state,
        });
    }

    Ok(WorkingCopyStatus {
        branch: store.current_branch()?,
        head: store.head()?,
        remote_url: ledger.remote_url().map(str::to_string),
        last_pull: ledger.last_pull(),
        last_export: ledger.last_export(),
        tables,
        staged: ledger.staged().to_vec(),
        commits: ledger.log(None).len(),
    })
}

/// `<code> <table>` lines for scripts.
pub fn print_porcelain(status: &WorkingCopyStatus) {
    for table in &status.tables {
        println!("{} {}", table.state.porcelain(), table.name);
    }
}

/// Print status to stdout in a human-readable format.
pub fn print_status(status: &WorkingCopyStatus) {
    println!("On branch {}", status.branch.bold());
    match &status.remote_url {
        Some(url) => println!("Remote: {url}"),
        None => println!("{}", "No remote recorded (push or clone to set one).".dimmed()),
    }
    if let Some(at) = status.last_export {
        println!("Last export: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(at) = status.last_pull {
        println!("Last pull:   {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!();

    if status.tables.is_empty() {
        println!("{}", "No tables.".dimmed());
        return;
    }

    let section = |state: TableState, title: &str, hint: &str| {
        let rows: Vec<&TableStatus> = status.tables.iter().filter(|t| t.state == state).collect();
        if rows.is_empty() {
            return;
        }
        println!("{title}");
        println!("  {}", hint.dimmed());
        for t in rows {
            let line = format!("{:<10} {} ({} rows)", format!("{}:", t.state), t.name, t.rows);
            let colored = match state {
                TableState::Staged => line.green(),
                TableState::Modified => line.yellow(),
                TableState::Untracked => line.red(),
            };
            println!("  {colored}");
        }
        println!();
    };

    section(
        TableState::Staged,
        "Tables staged for commit:",
        "(use \"tsync commit -m <msg>\" to record them)",
    );
    section(
        TableState::Modified,
        "Tables not staged:",
        "(use \"tsync add <table>\" to stage)",
    );
    section(
        TableState::Untracked,
        "Untracked tables:",
        "(never exported; use \"tsync add .\" then \"tsync push\")",
    );
}

/// Print a push/export summary.
pub fn print_export_stats(stats: &ExportStats, dry_run: bool) {
    let title = if dry_run { "Export preview (dry run)" } else { "Exported" };
    println!("{}", title.bold());
    if stats.is_empty() {
        println!("  {}", "No tables to export.".dimmed());
        return;
    }
    for t in &stats.tables {
        let mut line = format!(
            "  {} - {} rows, {} chunk(s), {}",
            t.table,
            t.rows,
            t.chunks,
            format_size(t.size_bytes)
        );
        if t.large {
            line.push_str(&format!(" {}", "[large file]".yellow()));
        }
        println!("{line}");
    }
    println!(
        "  {}: {} rows in {} chunk(s), {}",
        "Total".bold(),
        stats.total_rows(),
        stats.total_chunks(),
        format_size(stats.total_bytes())
    );
    let degraded = stats.degraded_cells();
    if degraded > 0 {
        println!(
            "  {}",
            format!("{degraded} cell(s) could not be converted and were exported as text").yellow()
        );
    }
}

/// Print a pull/clone summary, labelling best-effort imports.
pub fn print_import_stats(stats: &ImportStats, dry_run: bool) {
    match (stats.mode, dry_run) {
        (ImportMode::Metadata, false) => println!("{}", "Imported".bold()),
        (ImportMode::Metadata, true) => println!("{}", "Import preview (dry run)".bold()),
        (ImportMode::BestEffort, _) => {
            println!(
                "{}",
                "Best-effort import: no tablesync metadata found on the remote".yellow().bold()
            );
            println!(
                "  {}",
                "Tables were guessed from file extensions; existing tables were left untouched."
                    .dimmed()
            );
        }
    }

    for t in &stats.tables {
        match &t.source_file {
            Some(file) => println!("  {} - {} rows (from {file})", t.table, t.rows),
            None => println!("  {} - {} rows, {} chunk(s)", t.table, t.rows, t.chunks),
        }
    }
    for s in &stats.skipped {
        println!("  {} {} - {}", "skipped".red(), s.table, s.reason);
    }
    if stats.tables.is_empty() && stats.skipped.is_empty() {
        println!("  {}", "Nothing to import.".dimmed());
    }
}

/// Format a byte size as a human-readable string.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::ledger::LEDGER_FILE;
    use crate::model::{Column, ColumnType, Schema};

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(50 * 1024 * 1024), "50.0 MB");
    }

    #[test]
    fn test_get_status_reports_states() {
        let dir = TempDir::new().unwrap();
        let mut store = SqliteStore::open_memory().unwrap();
        let schema = Schema::new(vec![Column::new("id", ColumnType::Integer)]);
        store.create_table("a", &schema, Encoding::Ordinal).unwrap();
        store.create_table("b", &schema, Encoding::Keyed).unwrap();

        let mut ledger = Ledger::open(&dir.path().join(LEDGER_FILE)).unwrap();
        let status = get_status(&store, &ledger).unwrap();
        assert!(status.tables.iter().all(|t| t.state == TableState::Untracked));

        ledger.record_export("file:///r");
        ledger.stage("b");
        let status = get_status(&store, &ledger).unwrap();
        assert_eq!(status.tables[0].state, TableState::Modified);
        assert_eq!(status.tables[1].state, TableState::Staged);
        assert_eq!(status.tables[1].encoding, Encoding::Keyed);
        assert_eq!(status.branch, "main");
    }
}
