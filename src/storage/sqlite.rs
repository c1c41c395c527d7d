//! SQLite-backed local table store.
//!
//! This is the working copy's versioned table store: a catalog of user
//! tables, each stored in one of two encodings, plus a branch name and a
//! head hash that advances on every mutation.
//!
//! Mutations go through [`SqliteStore::mutate`], which runs the closure in
//! an IMMEDIATE transaction and folds the operation into the head hash.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::model::{Row, Schema, Value, quote_ident};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::schema::{RESERVED_PREFIX, apply_schema};
use crate::storage::source::{KeyedRowSource, OrdinalRowSource, RowSource};

/// Hidden dense ordinal column on ordinal-encoded tables.
const ORD_COLUMN: &str = "_ord";

/// Separator between primary-key parts in keyed row keys.
const KEY_SEPARATOR: char = '\u{1f}';

/// Physical row encoding of a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Rows addressable by ordinal position; supports range reads.
    #[default]
    Ordinal,
    /// Rows ordered by key; forward traversal only.
    Keyed,
}

impl Encoding {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ordinal => "ordinal",
            Self::Keyed => "keyed",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ordinal" => Ok(Self::Ordinal),
            "keyed" => Ok(Self::Keyed),
            _ => Err(format!("Unknown encoding: {s}")),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::from(rusqlite::types::Null),
            Self::Int(i) => ToSqlOutput::from(*i),
            Self::Float(f) => ToSqlOutput::from(*f),
            Self::Bool(b) => ToSqlOutput::from(i64::from(*b)),
            Self::Text(s) => ToSqlOutput::from(s.as_str()),
            Self::Blob(b) => ToSqlOutput::from(b.as_slice()),
        })
    }
}

/// Check that a table name is usable both in SQL and as a directory name.
///
/// # Errors
///
/// Returns `InvalidTableName` describing the problem.
pub fn validate_table_name(name: &str) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidTableName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > 128 {
        return Err(invalid("name is longer than 128 bytes"));
    }
    if name == "." || name == ".." || name.starts_with('.') {
        return Err(invalid("name may not start with '.'"));
    }
    if name.starts_with(RESERVED_PREFIX) || name.starts_with("sqlite_") {
        return Err(invalid("name uses a reserved prefix"));
    }
    if name.chars().any(|c| c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')) {
        return Err(invalid("name contains a character that is not valid in file names"));
    }
    Ok(())
}

/// SQLite-based table store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a store at the given path, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or the
    /// catalog schema fails to apply.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a store with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5000)))?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Underlying connection, for read-only use.
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run a mutation in an IMMEDIATE transaction and advance the head hash.
    ///
    /// # Errors
    ///
    /// Returns the closure's error; the transaction is rolled back.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> StoreResult<R>
    where
        F: FnOnce(&Transaction) -> StoreResult<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let result = f(&tx)?;

        let previous: String = tx.query_row(
            "SELECT value FROM tsync_meta WHERE key = 'head'",
            [],
            |row| row.get(0),
        )?;
        let mut hasher = Sha256::new();
        hasher.update(previous.as_bytes());
        hasher.update(b"\n");
        hasher.update(op.as_bytes());
        let head = format!("{:x}", hasher.finalize());
        tx.execute("UPDATE tsync_meta SET value = ?1 WHERE key = 'head'", [&head])?;

        tx.commit()?;
        debug!(op, head = %&head[..12], "store mutated");
        Ok(result)
    }

    // ==================
    // Versioning
    // ==================

    /// Current branch name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn current_branch(&self) -> StoreResult<String> {
        self.meta("branch").map(|b| b.unwrap_or_else(|| "main".to_string()))
    }

    /// Switch the recorded branch name.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_branch(&mut self, branch: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO tsync_meta (key, value) VALUES ('branch', ?1)",
            [branch],
        )?;
        Ok(())
    }

    /// Head hash; empty for a store that was never mutated.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn head(&self) -> StoreResult<String> {
        self.meta("head").map(Option::unwrap_or_default)
    }

    fn meta(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM tsync_meta WHERE key = ?1", [key], |row| row.get(0))
            .optional()?)
    }

    // ==================
    // Catalog
    // ==================

    /// All user tables, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_tables(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM tsync_tables ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn has_table(&self, name: &str) -> StoreResult<bool> {
        Ok(self
            .conn
            .prepare_cached("SELECT 1 FROM tsync_tables WHERE name = ?1")?
            .exists([name])?)
    }

    fn catalog_entry(&self, name: &str) -> StoreResult<(Encoding, Schema)> {
        let entry: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT encoding, schema_json FROM tsync_tables WHERE name = ?1",
                [name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (encoding, schema_json) =
            entry.ok_or_else(|| StoreError::TableNotFound(name.to_string()))?;
        let encoding = encoding.parse::<Encoding>().map_err(|reason| StoreError::ReadFailure {
            table: name.to_string(),
            reason,
        })?;
        Ok((encoding, serde_json::from_str(&schema_json)?))
    }

    /// # Errors
    ///
    /// Returns `TableNotFound` if the table does not exist.
    pub fn table_schema(&self, name: &str) -> StoreResult<Schema> {
        self.catalog_entry(name).map(|(_, schema)| schema)
    }

    /// # Errors
    ///
    /// Returns `TableNotFound` if the table does not exist.
    pub fn table_encoding(&self, name: &str) -> StoreResult<Encoding> {
        self.catalog_entry(name).map(|(encoding, _)| encoding)
    }

    /// Number of rows in a table.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` if the table does not exist.
    pub fn row_count(&self, name: &str) -> StoreResult<u64> {
        let encoding = self.table_encoding(name)?;
        count_rows(&self.conn, name, encoding)
    }

    /// Create a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid, the table exists, or the
    /// schema is empty.
    pub fn create_table(&mut self, name: &str, schema: &Schema, encoding: Encoding) -> StoreResult<()> {
        check_new_table(name, schema)?;
        if self.has_table(name)? {
            return Err(StoreError::TableAlreadyExists(name.to_string()));
        }

        let schema_json = serde_json::to_string(schema)?;
        self.mutate(&format!("create table {name}"), |tx| {
            register_table(tx, name, schema, encoding, &schema_json)
        })
    }

    /// Drop a table and all its rows.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` if the table does not exist.
    pub fn drop_table(&mut self, name: &str) -> StoreResult<()> {
        let encoding = self.table_encoding(name)?;
        self.mutate(&format!("drop table {name}"), |tx| {
            drop_physical(tx, name, encoding)?;
            tx.execute("DELETE FROM tsync_tables WHERE name = ?1", [name])?;
            Ok(())
        })
    }

    /// Replace a table with `rows` in one transaction.
    ///
    /// Any table of that name is dropped and recreated with `schema`. An
    /// error from `rows`, from the insert, or from `verify` (which sees the
    /// number of rows written) rolls the whole replacement back, and the
    /// previous table is left as it was.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub fn load_table<I, V>(
        &mut self,
        name: &str,
        schema: &Schema,
        encoding: Encoding,
        rows: I,
        verify: V,
    ) -> StoreResult<u64>
    where
        I: IntoIterator<Item = StoreResult<Row>>,
        V: FnOnce(u64) -> StoreResult<()>,
    {
        check_new_table(name, schema)?;
        let previous = if self.has_table(name)? {
            Some(self.table_encoding(name)?)
        } else {
            None
        };

        let schema_json = serde_json::to_string(schema)?;
        self.mutate(&format!("load table {name}"), |tx| {
            if let Some(old) = previous {
                drop_physical(tx, name, old)?;
                tx.execute("DELETE FROM tsync_tables WHERE name = ?1", [name])?;
            }
            register_table(tx, name, schema, encoding, &schema_json)?;
            let written = write_rows(tx, name, schema, encoding, rows)?;
            verify(written)?;
            Ok(written)
        })
    }

    /// Append rows to a table in one transaction.
    ///
    /// Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns an error if a row's arity does not match the schema or a
    /// constraint is violated; nothing from this call is kept in that case.
    pub fn insert_rows<I>(&mut self, name: &str, rows: I) -> StoreResult<u64>
    where
        I: IntoIterator<Item = Row>,
    {
        let (encoding, schema) = self.catalog_entry(name)?;
        self.mutate(&format!("insert into {name}"), |tx| {
            write_rows(tx, name, &schema, encoding, rows.into_iter().map(Ok))
        })
    }

    /// Open a row source over `[offset, offset + limit)` of a table.
    ///
    /// The adapter is chosen by the table's encoding.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` if the table does not exist.
    pub fn open_source(&self, name: &str, offset: u64, limit: u64) -> StoreResult<Box<dyn RowSource + '_>> {
        let (encoding, schema) = self.catalog_entry(name)?;
        Ok(match encoding {
            Encoding::Ordinal => {
                let count = count_rows(&self.conn, name, encoding)?;
                Box::new(OrdinalRowSource::new(&self.conn, name, schema, count, offset, limit))
            }
            Encoding::Keyed => Box::new(KeyedRowSource::new(&self.conn, name, schema, offset, limit)),
        })
    }

    /// Open a row source over the whole table.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` if the table does not exist.
    pub fn open_full_source(&self, name: &str) -> StoreResult<Box<dyn RowSource + '_>> {
        self.open_source(name, 0, u64::MAX)
    }
}

fn count_rows(conn: &Connection, name: &str, encoding: Encoding) -> StoreResult<u64> {
    let count: i64 = match encoding {
        Encoding::Ordinal => conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(name)),
            [],
            |row| row.get(0),
        )?,
        Encoding::Keyed => conn.query_row(
            "SELECT COUNT(*) FROM tsync_keyed_rows WHERE table_name = ?1",
            [name],
            |row| row.get(0),
        )?,
    };
    Ok(u64::try_from(count).unwrap_or(0))
}

fn check_new_table(name: &str, schema: &Schema) -> StoreResult<()> {
    validate_table_name(name)?;
    if schema.is_empty() {
        return Err(StoreError::InvalidTableName {
            name: name.to_string(),
            reason: "table has no columns".to_string(),
        });
    }
    Ok(())
}

fn register_table(
    tx: &Transaction,
    name: &str,
    schema: &Schema,
    encoding: Encoding,
    schema_json: &str,
) -> StoreResult<()> {
    create_physical(tx, name, schema, encoding)?;
    tx.execute(
        "INSERT INTO tsync_tables (name, encoding, schema_json, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![name, encoding.as_str(), schema_json, chrono::Utc::now().timestamp_millis()],
    )?;
    Ok(())
}

/// Append rows after the table's current last row.
fn write_rows<I>(tx: &Transaction, table: &str, schema: &Schema, encoding: Encoding, rows: I) -> StoreResult<u64>
where
    I: IntoIterator<Item = StoreResult<Row>>,
{
    let start = count_rows(tx, table, encoding)?;
    let mut written = 0u64;

    match encoding {
        Encoding::Ordinal => {
            let columns = std::iter::once(ORD_COLUMN.to_string())
                .chain(schema.columns().iter().map(|c| quote_ident(&c.name)))
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = (1..=schema.len() + 1)
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "INSERT INTO {} ({columns}) VALUES ({placeholders})",
                quote_ident(table)
            );
            let mut stmt = tx.prepare_cached(&sql)?;

            for row in rows {
                let row = row?;
                check_arity(table, schema, &row)?;
                let ord = Value::Int(i64::try_from(start + written).unwrap_or(i64::MAX));
                let mut values: Vec<&dyn ToSql> = Vec::with_capacity(row.len() + 1);
                values.push(&ord);
                values.extend(row.iter().map(|v| v as &dyn ToSql));
                stmt.execute(values.as_slice())?;
                written += 1;
            }
        }
        Encoding::Keyed => {
            let key_columns = schema.primary_key_indices();
            let mut stmt = tx.prepare_cached(
                "INSERT INTO tsync_keyed_rows (table_name, row_key, payload) VALUES (?1, ?2, ?3)",
            )?;

            for row in rows {
                let row = row?;
                check_arity(table, schema, &row)?;
                let key = if key_columns.is_empty() {
                    format!("{:020}", start + written)
                } else {
                    row_key(&row, &key_columns)
                };
                let payload = serde_json::Value::Array(row.iter().map(Value::to_json).collect());
                stmt.execute(params![table, key, payload.to_string()])?;
                written += 1;
            }
        }
    }

    Ok(written)
}

fn create_physical(tx: &Transaction, name: &str, schema: &Schema, encoding: Encoding) -> StoreResult<()> {
    if encoding == Encoding::Keyed {
        return Ok(());
    }

    let mut defs = vec![format!("{ORD_COLUMN} INTEGER PRIMARY KEY")];
    for col in schema.columns() {
        if col.name == ORD_COLUMN {
            return Err(StoreError::InvalidTableName {
                name: name.to_string(),
                reason: format!("column name {ORD_COLUMN} is reserved"),
            });
        }
        let null = if col.nullable { "" } else { " NOT NULL" };
        defs.push(format!("{} {}{null}", quote_ident(&col.name), col.column_type.sql_name()));
    }
    let keys: Vec<String> = schema
        .columns()
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| quote_ident(&c.name))
        .collect();
    if !keys.is_empty() {
        defs.push(format!("UNIQUE ({})", keys.join(", ")));
    }

    tx.execute_batch(&format!("CREATE TABLE {} ({});", quote_ident(name), defs.join(", ")))?;
    Ok(())
}

fn drop_physical(tx: &Transaction, name: &str, encoding: Encoding) -> StoreResult<()> {
    match encoding {
        Encoding::Ordinal => {
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {};", quote_ident(name)))?;
        }
        Encoding::Keyed => {
            tx.execute("DELETE FROM tsync_keyed_rows WHERE table_name = ?1", [name])?;
        }
    }
    Ok(())
}

fn check_arity(table: &str, schema: &Schema, row: &Row) -> StoreResult<()> {
    if row.len() == schema.len() {
        Ok(())
    } else {
        Err(StoreError::ArityMismatch {
            table: table.to_string(),
            expected: schema.len(),
            actual: row.len(),
        })
    }
}

/// Build an order-preserving text key from primary-key cells.
///
/// Integers are offset-binary hex so that lexical order matches numeric
/// order, including negatives.
fn row_key(row: &Row, key_columns: &[usize]) -> String {
    key_columns
        .iter()
        .map(|&i| match row.get(i) {
            #[allow(clippy::cast_sign_loss)]
            Some(Value::Int(n)) => format!("{:016x}", (*n as u64) ^ (1 << 63)),
            Some(other) => other.to_field().unwrap_or_default(),
            None => String::new(),
        })
        .collect::<Vec<_>>()
        .join(&KEY_SEPARATOR.to_string())
}
