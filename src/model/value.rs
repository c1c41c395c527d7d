//! Typed cell values and column types.
//!
//! Every row that flows through the pipeline is a `Vec<Value>` aligned to
//! its table's [`Schema`](super::Schema). The textual rendering used in
//! chunk files lives here too so that export and import agree on it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Blob(Vec<u8>),
}

/// One row, ordered by schema column position.
pub type Row = Vec<Value>;

impl Value {
    /// Returns true for SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Render this value as a flat-file field.
    ///
    /// `None` means NULL, which the codec writes as an empty unquoted field.
    #[must_use]
    pub fn to_field(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(format_float(*f)),
            Self::Bool(b) => Some(b.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Blob(bytes) => Some(encode_hex(bytes)),
        }
    }

    /// Convert to the JSON form used by keyed row storage.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or_else(|| serde_json::Value::String(format_float(*f)), serde_json::Value::Number),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Blob(bytes) => serde_json::Value::String(encode_hex(bytes)),
        }
    }

    /// Lossy human-readable text for a value that could not be converted.
    #[must_use]
    pub fn lossy_text(raw: impl fmt::Display) -> Self {
        Self::Text(raw.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_field() {
            Some(s) => f.write_str(&s),
            None => f.write_str("NULL"),
        }
    }
}

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
    Blob,
}

impl ColumnType {
    /// SQL type name used in generated DDL.
    #[must_use]
    pub const fn sql_name(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Boolean => "BOOLEAN",
            Self::Blob => "BLOB",
        }
    }

    /// Map an arbitrary SQL type name onto a column type.
    ///
    /// Follows SQLite affinity rules, with BOOL checked before INT so that
    /// `BOOLEAN` is not read as an integer. Unknown names become `Text`.
    #[must_use]
    pub fn from_sql_name(name: &str) -> Self {
        let upper = name.to_ascii_uppercase();
        if upper.contains("BOOL") {
            Self::Boolean
        } else if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Self::Text
        } else if upper.contains("BLOB") || upper.contains("BINARY") || upper.contains("BYTEA") {
            Self::Blob
        } else if upper.contains("REAL")
            || upper.contains("FLOA")
            || upper.contains("DOUB")
            || upper.contains("DECIMAL")
            || upper.contains("NUMERIC")
        {
            Self::Real
        } else {
            Self::Text
        }
    }

    /// Parse a flat-file field into a value of this type.
    ///
    /// Returns `None` when the text does not parse. Callers keep such fields
    /// as text rather than failing the row.
    #[must_use]
    pub fn parse_field(&self, field: &str) -> Option<Value> {
        match self {
            Self::Integer => field.parse::<i64>().ok().map(Value::Int),
            Self::Real => field.parse::<f64>().ok().map(Value::Float),
            Self::Boolean => match field {
                "true" | "TRUE" | "1" => Some(Value::Bool(true)),
                "false" | "FALSE" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            Self::Text => Some(Value::Text(field.to_string())),
            Self::Blob => decode_hex(field).map(Value::Blob),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// Shortest representation that parses back to the same `f64`.
///
/// Integral floats keep a trailing `.0` so they do not re-import as integers.
fn format_float(f: f64) -> String {
    let s = f.to_string();
    if f.is_finite() && !s.contains(['.', 'e', 'E']) {
        format!("{s}.0")
    } else {
        s
    }
}

/// Lowercase hex encoding for blob cells.
#[must_use]
pub fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Inverse of [`encode_hex`]. Returns `None` on odd length or bad digits.
#[must_use]
pub fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| s.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_field_null_is_none() {
        assert_eq!(Value::Null.to_field(), None);
        assert_eq!(Value::Text(String::new()).to_field(), Some(String::new()));
    }

    #[test]
    fn test_float_keeps_fraction_marker() {
        assert_eq!(Value::Float(3.0).to_field().unwrap(), "3.0");
        assert_eq!(Value::Float(2.5).to_field().unwrap(), "2.5");
        let parsed = ColumnType::Real.parse_field("3.0").unwrap();
        assert_eq!(parsed, Value::Float(3.0));
    }

    #[test]
    fn test_type_affinity() {
        assert_eq!(ColumnType::from_sql_name("BIGINT"), ColumnType::Integer);
        assert_eq!(ColumnType::from_sql_name("varchar(255)"), ColumnType::Text);
        assert_eq!(ColumnType::from_sql_name("BOOLEAN"), ColumnType::Boolean);
        assert_eq!(ColumnType::from_sql_name("DOUBLE PRECISION"), ColumnType::Real);
        assert_eq!(ColumnType::from_sql_name("BLOB"), ColumnType::Blob);
        assert_eq!(ColumnType::from_sql_name("DATETIME"), ColumnType::Text);
    }

    #[test]
    fn test_parse_field_rejects_bad_input() {
        assert!(ColumnType::Integer.parse_field("abc").is_none());
        assert!(ColumnType::Boolean.parse_field("maybe").is_none());
        assert!(ColumnType::Blob.parse_field("abc").is_none());
    }

    #[test]
    fn test_hex_roundtrip() {
        let bytes = vec![0u8, 15, 16, 255];
        let hex = encode_hex(&bytes);
        assert_eq!(hex, "000f10ff");
        assert_eq!(decode_hex(&hex), Some(bytes));
    }
}
