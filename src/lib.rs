//! tablesync - chunked export/import of versioned tables to git hosting
//!
//! This crate provides the core functionality for the `tsync` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Values, schemas, chunk and manifest metadata
//! - [`storage`] - SQLite table store and row sources
//! - [`chunking`] - Chunking strategies, chunk writer and reader
//! - [`sync`] - Export, import, git transport, push/pull pipeline
//! - [`ledger`] - Local staging area and commit records
//! - [`config`] - Working copy discovery and settings
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod chunking;
pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod model;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
