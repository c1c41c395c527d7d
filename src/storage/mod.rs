//! Local versioned table store.
//!
//! This module provides the working copy's table storage using SQLite with:
//! - WAL mode for concurrent reads
//! - Two row encodings (ordinal and keyed) behind one row-source contract
//! - A head hash that advances on every mutation
//!
//! # Submodules
//!
//! - [`schema`] - Catalog schema definitions
//! - [`source`] - Row sources over either encoding
//! - [`sqlite`] - Main SQLite store implementation

pub mod error;
pub mod schema;
pub mod source;
pub mod sqlite;

pub use error::{StoreError, StoreResult};
pub use source::{RowSource, SourceError, SourceResult, VecRowSource, collect_rows};
pub use sqlite::{Encoding, SqliteStore, validate_table_name};
