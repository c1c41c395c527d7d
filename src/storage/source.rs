//! Row sources: one uniform, ordered row stream over either storage encoding.
//!
//! Chunking and export code depend only on [`RowSource`]. Which encoding
//! backs a table is decided once, in [`SqliteStore::open_source`], and never
//! again.
//!
//! # Cost model
//!
//! - [`OrdinalRowSource`] issues a native range read over the dense `_ord`
//!   column, so reading `[offset, offset + limit)` costs O(limit).
//! - [`KeyedRowSource`] can only walk the table forward from the first key.
//!   It skips `offset` rows by counting, so the same read costs
//!   O(offset + limit). Reading a keyed table chunk-by-chunk with separate
//!   range reads is quadratic overall; read it in one ascending pass.
//!
//! # Cell conversion
//!
//! Stored cells are converted to the column's declared type. A cell that
//! does not convert is emitted as lossy text and counted in
//! [`RowSource::degraded_cells`]; it never fails the row.
//!
//! [`SqliteStore::open_source`]: crate::storage::SqliteStore::open_source

use std::collections::VecDeque;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, params};
use tracing::debug;

use crate::model::{ColumnType, Row, Schema, Value, decode_hex, encode_hex, quote_ident};

/// Rows fetched from SQLite per round trip.
pub const BATCH_SIZE: u64 = 1024;

/// Errors produced while pulling rows from a source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The backing encoding cannot produce the requested rows at all.
    #[error("cannot read rows from {source_name}: {reason}")]
    ReadFailure { source_name: String, reason: String },

    #[error("IO error reading {source_name}: {error}")]
    Io {
        source_name: String,
        #[source]
        error: std::io::Error,
    },
}

impl SourceError {
    pub fn read_failure(source_name: &str, reason: impl std::fmt::Display) -> Self {
        Self::ReadFailure {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// A lazy, finite, non-restartable sequence of schema-aligned rows.
pub trait RowSource {
    /// Schema every emitted row is aligned to.
    fn schema(&self) -> &Schema;

    /// Next row, or `None` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `ReadFailure` if the underlying storage cannot produce rows.
    fn next_row(&mut self) -> SourceResult<Option<Row>>;

    /// Whether the backing storage supports native range reads.
    fn supports_range_read(&self) -> bool {
        false
    }

    /// Number of cells emitted as lossy text so far.
    fn degraded_cells(&self) -> u64 {
        0
    }
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    fn schema(&self) -> &Schema {
        (**self).schema()
    }

    fn next_row(&mut self) -> SourceResult<Option<Row>> {
        (**self).next_row()
    }

    fn supports_range_read(&self) -> bool {
        (**self).supports_range_read()
    }

    fn degraded_cells(&self) -> u64 {
        (**self).degraded_cells()
    }
}

/// Drain a source into memory. Intended for tests and small tables.
///
/// # Errors
///
/// Propagates the first error from the source.
pub fn collect_rows(source: &mut dyn RowSource) -> SourceResult<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = source.next_row()? {
        rows.push(row);
    }
    Ok(rows)
}

// ── In-memory ─────────────────────────────────────────────────

/// Row source over rows already in memory.
#[derive(Debug, Clone)]
pub struct VecRowSource {
    schema: Schema,
    rows: VecDeque<Row>,
}

impl VecRowSource {
    #[must_use]
    pub fn new(schema: Schema, rows: Vec<Row>) -> Self {
        Self {
            schema,
            rows: rows.into(),
        }
    }
}

impl RowSource for VecRowSource {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_row(&mut self) -> SourceResult<Option<Row>> {
        Ok(self.rows.pop_front())
    }

    fn supports_range_read(&self) -> bool {
        true
    }
}

// ── Ordinal encoding ─────────────────────────────────────────

/// Range reader over an ordinal-addressable table.
pub struct OrdinalRowSource<'a> {
    conn: &'a Connection,
    table: String,
    schema: Schema,
    sql: String,
    next: u64,
    end: u64,
    buffer: VecDeque<Row>,
    degraded: u64,
}

impl<'a> OrdinalRowSource<'a> {
    /// Prepare a read of `[offset, min(offset + limit, row_count))`.
    pub(crate) fn new(
        conn: &'a Connection,
        table: &str,
        schema: Schema,
        row_count: u64,
        offset: u64,
        limit: u64,
    ) -> Self {
        let columns = schema
            .columns()
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {columns} FROM {} WHERE _ord >= ?1 AND _ord < ?2 ORDER BY _ord",
            quote_ident(table)
        );
        let start = offset.min(row_count);
        let end = offset.saturating_add(limit).min(row_count);

        Self {
            conn,
            table: table.to_string(),
            schema,
            sql,
            next: start,
            end,
            buffer: VecDeque::new(),
            degraded: 0,
        }
    }

    fn fetch_batch(&mut self) -> SourceResult<()> {
        let batch_end = self.next.saturating_add(BATCH_SIZE).min(self.end);
        let to_i64 = |n: u64| i64::try_from(n).unwrap_or(i64::MAX);

        let mut stmt = self
            .conn
            .prepare_cached(&self.sql)
            .map_err(|e| SourceError::read_failure(&self.table, e))?;

        let columns = self.schema.columns();
        let mut degraded = 0u64;
        let rows = stmt
            .query_map(params![to_i64(self.next), to_i64(batch_end)], |row| {
                let mut out = Vec::with_capacity(columns.len());
                for (i, col) in columns.iter().enumerate() {
                    let (value, ok) = convert_sql_cell(row.get_ref(i)?, col.column_type);
                    if !ok {
                        degraded += 1;
                        debug!(table = %self.table, column = %col.name, "cell fell back to text");
                    }
                    out.push(value);
                }
                Ok(out)
            })
            .map_err(|e| SourceError::read_failure(&self.table, e))?;

        for row in rows {
            self.buffer
                .push_back(row.map_err(|e| SourceError::read_failure(&self.table, e))?);
        }
        self.degraded += degraded;

        let fetched = batch_end - self.next;
        if self.buffer.len() as u64 != fetched {
            return Err(SourceError::read_failure(
                &self.table,
                format!(
                    "ordinal range [{}, {batch_end}) returned {} rows",
                    self.next,
                    self.buffer.len()
                ),
            ));
        }
        self.next = batch_end;
        Ok(())
    }
}

impl RowSource for OrdinalRowSource<'_> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_row(&mut self) -> SourceResult<Option<Row>> {
        if self.buffer.is_empty() && self.next < self.end {
            self.fetch_batch()?;
        }
        Ok(self.buffer.pop_front())
    }

    fn supports_range_read(&self) -> bool {
        true
    }

    fn degraded_cells(&self) -> u64 {
        self.degraded
    }
}

/// Convert one SQLite cell. The flag is false when the lossy fallback was used.
pub(crate) fn convert_sql_cell(cell: ValueRef<'_>, column_type: ColumnType) -> (Value, bool) {
    let converted = match (column_type, cell) {
        (_, ValueRef::Null) => Some(Value::Null),
        (ColumnType::Integer, ValueRef::Integer(i)) => Some(Value::Int(i)),
        (ColumnType::Real, ValueRef::Real(f)) => Some(Value::Float(f)),
        #[allow(clippy::cast_precision_loss)]
        (ColumnType::Real, ValueRef::Integer(i)) => Some(Value::Float(i as f64)),
        (ColumnType::Boolean, ValueRef::Integer(0)) => Some(Value::Bool(false)),
        (ColumnType::Boolean, ValueRef::Integer(1)) => Some(Value::Bool(true)),
        (ColumnType::Blob, ValueRef::Blob(b)) => Some(Value::Blob(b.to_vec())),
        (ColumnType::Text, ValueRef::Text(t)) => std::str::from_utf8(t).ok().map(|s| Value::Text(s.to_string())),
        (ColumnType::Text, ValueRef::Integer(i)) => Some(Value::Text(i.to_string())),
        (ColumnType::Text, ValueRef::Real(f)) => Some(Value::Text(f.to_string())),
        (ty, ValueRef::Text(t)) => std::str::from_utf8(t).ok().and_then(|s| ty.parse_field(s)),
        _ => None,
    };

    match converted {
        Some(v) => (v, true),
        None => (lossy_sql_text(cell), false),
    }
}

fn lossy_sql_text(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::lossy_text(i),
        ValueRef::Real(f) => Value::lossy_text(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Text(encode_hex(b)),
    }
}

// ── Keyed encoding ───────────────────────────────────────────

const KEYED_FIRST_PAGE: &str = "SELECT row_key, payload FROM tsync_keyed_rows \
     WHERE table_name = ?1 ORDER BY row_key LIMIT ?2";
const KEYED_NEXT_PAGE: &str = "SELECT row_key, payload FROM tsync_keyed_rows \
     WHERE table_name = ?1 AND row_key > ?2 ORDER BY row_key LIMIT ?3";

/// Forward-only scan over a keyed table.
pub struct KeyedRowSource<'a> {
    conn: &'a Connection,
    table: String,
    schema: Schema,
    last_key: Option<String>,
    exhausted: bool,
    skip_remaining: u64,
    emit_remaining: u64,
    buffer: VecDeque<(String, String)>,
    degraded: u64,
}

impl<'a> KeyedRowSource<'a> {
    pub(crate) fn new(
        conn: &'a Connection,
        table: &str,
        schema: Schema,
        offset: u64,
        limit: u64,
    ) -> Self {
        Self {
            conn,
            table: table.to_string(),
            schema,
            last_key: None,
            exhausted: false,
            skip_remaining: offset,
            emit_remaining: limit,
            buffer: VecDeque::new(),
            degraded: 0,
        }
    }

    fn fetch_page(&mut self) -> SourceResult<()> {
        let page = i64::try_from(BATCH_SIZE).unwrap_or(i64::MAX);
        let read = |sql: &str, last: Option<&str>| -> rusqlite::Result<Vec<(String, String)>> {
            let mut stmt = self.conn.prepare_cached(sql)?;
            let map = |r: &rusqlite::Row<'_>| -> rusqlite::Result<(String, String)> {
                Ok((r.get(0)?, r.get(1)?))
            };
            match last {
                Some(key) => stmt.query_map(params![self.table, key, page], map)?.collect(),
                None => stmt.query_map(params![self.table, page], map)?.collect(),
            }
        };

        let rows = match self.last_key.as_deref() {
            Some(key) => read(KEYED_NEXT_PAGE, Some(key)),
            None => read(KEYED_FIRST_PAGE, None),
        }
        .map_err(|e| SourceError::read_failure(&self.table, e))?;

        if (rows.len() as u64) < BATCH_SIZE {
            self.exhausted = true;
        }
        if let Some((key, _)) = rows.last() {
            self.last_key = Some(key.clone());
        }
        self.buffer.extend(rows);
        Ok(())
    }

    fn decode(&mut self, payload: &str) -> SourceResult<Row> {
        let cells: Vec<serde_json::Value> = serde_json::from_str(payload)
            .map_err(|e| SourceError::read_failure(&self.table, format!("bad row payload: {e}")))?;

        let mut row = Vec::with_capacity(self.schema.len());
        for (i, col) in self.schema.columns().iter().enumerate() {
            let cell = cells.get(i).unwrap_or(&serde_json::Value::Null);
            let (value, ok) = convert_json_cell(cell, col.column_type);
            if !ok {
                self.degraded += 1;
                debug!(table = %self.table, column = %col.name, "cell fell back to text");
            }
            row.push(value);
        }
        Ok(row)
    }
}

impl RowSource for KeyedRowSource<'_> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_row(&mut self) -> SourceResult<Option<Row>> {
        loop {
            if self.emit_remaining == 0 {
                return Ok(None);
            }
            if self.buffer.is_empty() {
                if self.exhausted {
                    return Ok(None);
                }
                self.fetch_page()?;
                continue;
            }
            let Some((_, payload)) = self.buffer.pop_front() else {
                continue;
            };
            if self.skip_remaining > 0 {
                self.skip_remaining -= 1;
                continue;
            }
            self.emit_remaining -= 1;
            return self.decode(&payload).map(Some);
        }
    }

    fn degraded_cells(&self) -> u64 {
        self.degraded
    }
}

/// Convert one keyed-payload cell. The flag is false on lossy fallback.
fn convert_json_cell(cell: &serde_json::Value, column_type: ColumnType) -> (Value, bool) {
    use serde_json::Value as J;

    let converted = match (column_type, cell) {
        (_, J::Null) => Some(Value::Null),
        (ColumnType::Integer, J::Number(n)) => n.as_i64().map(Value::Int),
        (ColumnType::Real, J::Number(n)) => n.as_f64().map(Value::Float),
        (ColumnType::Real, J::String(s)) => s.parse::<f64>().ok().map(Value::Float),
        (ColumnType::Boolean, J::Bool(b)) => Some(Value::Bool(*b)),
        (ColumnType::Text, J::String(s)) => Some(Value::Text(s.clone())),
        (ColumnType::Blob, J::String(s)) => decode_hex(s).map(Value::Blob),
        _ => None,
    };

    match converted {
        Some(v) => (v, true),
        None => {
            let text = match cell {
                J::String(s) => s.clone(),
                other => other.to_string(),
            };
            (Value::Text(text), false)
        }
    }
}
