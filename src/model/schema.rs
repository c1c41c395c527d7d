//! Table schemas and their declarative DDL form.
//!
//! Column order is authoritative: every textual row written for a table
//! follows `Schema::columns()` left to right.

use serde::{Deserialize, Serialize};
use sqlparser::ast as sp;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;

use crate::model::value::{ColumnType, Row, Value};

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
}

impl Column {
    /// Nullable, non-key column.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            primary_key: false,
        }
    }

    /// Mark this column as part of the primary key (implies NOT NULL).
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Ordered list of columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

/// Errors from parsing schema DDL.
#[derive(Debug, thiserror::Error)]
pub enum DdlError {
    #[error("DDL syntax error: {0}")]
    Syntax(String),

    #[error("unsupported statement in schema: {0}")]
    Unsupported(String),

    #[error("table {table} declares primary key on unknown column {column}")]
    UnknownKeyColumn { table: String, column: String },
}

impl From<sqlparser::parser::ParserError> for DdlError {
    fn from(e: sqlparser::parser::ParserError) -> Self {
        Self::Syntax(e.to_string())
    }
}

impl Schema {
    #[must_use]
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Schema for header-only data: every column nullable text.
    #[must_use]
    pub fn untyped<S: AsRef<str>>(names: &[S]) -> Self {
        Self::new(
            names
                .iter()
                .map(|n| Column::new(n.as_ref(), ColumnType::Text))
                .collect(),
        )
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Positions of primary-key columns, in column order.
    #[must_use]
    pub fn primary_key_indices(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| i)
            .collect()
    }

    /// Re-type a row of text cells (as read from a chunk file) by column type.
    ///
    /// Cells that do not parse as the declared type stay text; they are not
    /// guessed back into another type.
    #[must_use]
    pub fn coerce_row(&self, row: Row) -> Row {
        row.into_iter()
            .enumerate()
            .map(|(i, value)| match (value, self.columns.get(i)) {
                (Value::Text(s), Some(col)) => {
                    col.column_type.parse_field(&s).unwrap_or(Value::Text(s))
                }
                (other, _) => other,
            })
            .collect()
    }

    /// Render a `CREATE TABLE` statement for this schema.
    #[must_use]
    pub fn to_ddl(&self, table: &str) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let null = if c.nullable { "" } else { " NOT NULL" };
                format!("  {} {}{null}", quote_ident(&c.name), c.column_type.sql_name())
            })
            .collect();

        let keys: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| quote_ident(&c.name))
            .collect();
        if !keys.is_empty() {
            lines.push(format!("  PRIMARY KEY ({})", keys.join(", ")));
        }

        format!("CREATE TABLE {} (\n{}\n);", quote_ident(table), lines.join(",\n"))
    }

    /// Parse every `CREATE TABLE` statement in a schema document.
    ///
    /// Returns `(table_name, schema)` pairs in document order.
    ///
    /// # Errors
    ///
    /// Returns an error on syntax errors or non-`CREATE TABLE` statements.
    pub fn parse_ddl(sql: &str) -> Result<Vec<(String, Self)>, DdlError> {
        if sql.trim().is_empty() {
            return Ok(Vec::new());
        }

        let statements = SqlParser::parse_sql(&GenericDialect {}, sql)?;
        statements
            .iter()
            .map(|stmt| match stmt {
                sp::Statement::CreateTable(create) => convert_create_table(create),
                other => Err(DdlError::Unsupported(other.to_string())),
            })
            .collect()
    }
}

fn convert_create_table(create: &sp::CreateTable) -> Result<(String, Schema), DdlError> {
    let name = create
        .name
        .0
        .last()
        .map(|part| part.as_ident().map_or_else(|| part.to_string(), |id| id.value.clone()))
        .ok_or_else(|| DdlError::Syntax("empty table name".to_string()))?;

    let mut columns: Vec<Column> = create
        .columns
        .iter()
        .map(|def| {
            let mut column = Column::new(
                def.name.value.clone(),
                ColumnType::from_sql_name(&def.data_type.to_string()),
            );
            for opt in &def.options {
                match &opt.option {
                    sp::ColumnOption::NotNull => column.nullable = false,
                    sp::ColumnOption::Unique { is_primary: true, .. } => {
                        column = column.primary_key();
                    }
                    _ => {}
                }
            }
            column
        })
        .collect();

    for constraint in &create.constraints {
        if let sp::TableConstraint::PrimaryKey { columns: keys, .. } = constraint {
            for key in keys {
                let key_name = unquote_ident(&key.to_string());
                let column = columns
                    .iter_mut()
                    .find(|c| c.name == key_name)
                    .ok_or_else(|| DdlError::UnknownKeyColumn {
                        table: name.clone(),
                        column: key_name.clone(),
                    })?;
                column.primary_key = true;
                column.nullable = false;
            }
        }
    }

    Ok((name, Schema::new(columns)))
}

/// Double-quote an identifier, doubling embedded quotes.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn unquote_ident(s: &str) -> String {
    let s = s.trim();
    for (open, close) in [('"', '"'), ('`', '`'), ('[', ']')] {
        if s.len() >= 2 && s.starts_with(open) && s.ends_with(close) {
            let inner = &s[1..s.len() - 1];
            return if open == '"' {
                inner.replace("\"\"", "\"")
            } else {
                inner.to_string()
            };
        }
    }
    s.to_string()
}
