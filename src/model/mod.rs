//! Data model shared by the store, the chunk codec and the sync pipeline.
//!
//! - [`Value`], [`Row`], [`ColumnType`] - typed cells
//! - [`Schema`], [`Column`] - table shape and its DDL form
//! - [`TableMetadata`], [`ChunkInfo`], [`RepositoryManifest`] - export metadata

pub mod metadata;
pub mod schema;
pub mod value;

pub use metadata::{
    ChunkInfo, ChunkingConfig, MetadataError, MetadataResult, RepositoryManifest, RowRange,
    TableMetadata, TableSummary,
};
pub use schema::{Column, DdlError, Schema, quote_ident};
pub use value::{ColumnType, Row, Value, decode_hex, encode_hex};
