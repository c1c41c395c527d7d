//! Flat-file record codec.
//!
//! Comma-separated, `\n`-terminated, RFC 4180 quoting. A field is quoted
//! when it contains the delimiter, a quote, `\r` or `\n`, or has leading or
//! trailing spaces. NULL is an empty unquoted field; the empty string is
//! written as `""` so the two stay distinct.

use std::io::BufRead;

use crate::model::Row;

/// One decoded record. `None` cells are NULL.
pub type Record = Vec<Option<String>>;

#[derive(Debug, thiserror::Error)]
pub enum CsvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {reason}")]
    Malformed { line: u64, reason: String },
}

fn needs_quotes(s: &str, delimiter: char) -> bool {
    s.is_empty()
        || s.starts_with(' ')
        || s.ends_with(' ')
        || s.contains(|c| c == delimiter || matches!(c, '"' | '\r' | '\n'))
}

fn push_field(out: &mut String, field: Option<&str>, delimiter: char) {
    let Some(s) = field else {
        return;
    };
    if needs_quotes(s, delimiter) {
        out.push('"');
        out.push_str(&s.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(s);
    }
}

/// Encode one record as a full line, terminator included.
#[must_use]
pub fn encode_record<'a, I>(fields: I) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut out = String::new();
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_field(&mut out, field, ',');
    }
    out.push('\n');
    out
}

/// Header line for the given column names.
#[must_use]
pub fn encode_header(names: &[String]) -> String {
    encode_record(names.iter().map(|n| Some(n.as_str())))
}

/// Encode a typed row. The returned length is the row's exact on-disk size.
#[must_use]
pub fn encode_row(row: &Row) -> String {
    let fields: Vec<Option<String>> = row.iter().map(crate::model::Value::to_field).collect();
    encode_record(fields.iter().map(Option::as_deref))
}

/// Streaming record reader over any buffered input.
///
/// Quoted fields may span lines; memory use is bounded by one record.
pub struct CsvReader<R> {
    inner: R,
    delimiter: char,
    line: u64,
    buf: String,
}

impl<R: BufRead> CsvReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_delimiter(inner, ',')
    }

    pub fn with_delimiter(inner: R, delimiter: char) -> Self {
        Self {
            inner,
            delimiter,
            line: 0,
            buf: String::new(),
        }
    }

    /// Line number of the last line consumed (1-based).
    #[must_use]
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Read the next record, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` for an unterminated quoted field or text after a
    /// closing quote.
    pub fn read_record(&mut self) -> Result<Option<Record>, CsvError> {
        self.buf.clear();
        if self.inner.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line += 1;
        let first_line = self.line;

        let mut fields = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        let mut in_quotes = false;

        loop {
            let mut chars = self.buf.chars().peekable();
            while let Some(c) = chars.next() {
                if in_quotes {
                    if c == '"' {
                        if chars.peek() == Some(&'"') {
                            chars.next();
                            field.push('"');
                        } else {
                            in_quotes = false;
                        }
                    } else {
                        field.push(c);
                    }
                } else if c == self.delimiter {
                    fields.push(finish_field(std::mem::take(&mut field), quoted));
                    quoted = false;
                } else if c == '"' && field.is_empty() && !quoted {
                    quoted = true;
                    in_quotes = true;
                } else if c == '\n' || (c == '\r' && chars.peek() == Some(&'\n')) {
                    // record terminator
                } else if quoted {
                    return Err(CsvError::Malformed {
                        line: self.line,
                        reason: "unexpected text after closing quote".to_string(),
                    });
                } else {
                    field.push(c);
                }
            }

            if !in_quotes {
                break;
            }
            self.buf.clear();
            if self.inner.read_line(&mut self.buf)? == 0 {
                return Err(CsvError::Malformed {
                    line: first_line,
                    reason: "unterminated quoted field".to_string(),
                });
            }
            self.line += 1;
        }

        fields.push(finish_field(field, quoted));
        Ok(Some(fields))
    }
}

fn finish_field(field: String, quoted: bool) -> Option<String> {
    if quoted || !field.is_empty() {
        Some(field)
    } else {
        None
    }
}
