//! Catalog schema for the local table store.
//!
//! User tables live beside three bookkeeping tables:
//! - `tsync_tables` - one row per user table (encoding + schema JSON)
//! - `tsync_keyed_rows` - row payloads for keyed-encoding tables
//! - `tsync_meta` - key/value store for branch and head hash

use rusqlite::{Connection, Result};

/// Current catalog version, recorded in `tsync_meta`.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Name prefix reserved for catalog tables.
pub const RESERVED_PREFIX: &str = "tsync_";

pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS tsync_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tsync_tables (
    name TEXT PRIMARY KEY,
    encoding TEXT NOT NULL CHECK (encoding IN ('ordinal', 'keyed')),
    schema_json TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Keyed encoding: rows ordered by row_key, forward traversal only
CREATE TABLE IF NOT EXISTS tsync_keyed_rows (
    table_name TEXT NOT NULL,
    row_key TEXT NOT NULL,
    payload TEXT NOT NULL,
    PRIMARY KEY (table_name, row_key)
) WITHOUT ROWID;
";

/// Apply pragmas and the catalog schema. Idempotent.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO tsync_meta (key, value) VALUES ('schema_version', ?1)",
        [CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO tsync_meta (key, value) VALUES ('branch', 'main')",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO tsync_meta (key, value) VALUES ('head', '')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        apply_schema(&conn).unwrap();

        let branch: String = conn
            .query_row("SELECT value FROM tsync_meta WHERE key = 'branch'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(branch, "main");
    }
}
