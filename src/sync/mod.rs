//! Snapshot sync between the local store and a remote git repository.
//!
//! - **Export**: every table → chunk files + metadata in a repository tree
//! - **Import**: repository tree → tables, metadata-driven or best effort
//! - **Remote**: clone, branch checkout, commit and push via git2
//! - **Pipeline**: push and pull, each in a scratch clone
//! - **Status**: working copy state and result summaries
//!
//! # Example
//!
//! ```ignore
//! use tsync::sync::{push, PushRequest, RemoteSpec};
//!
//! let remote = RemoteSpec { url, branch: "main".into(), auth };
//! let outcome = push(&store, &mut ledger, &remote, &PushRequest::default())?;
//! ledger.save()?;
//! ```

mod export;
mod file;
mod import;
mod pipeline;
mod readme;
mod remote;
mod status;
mod types;

pub use export::{
    DATA_DIR, ExportSettings, Exporter, MANIFEST_FILE, METADATA_DIR, SCHEMA_FILE,
    table_data_dir, table_metadata_path,
};
pub use file::{atomic_write, ensure_gitignore, gitignore_content, remove_tree};
pub use import::{Importer, has_metadata};
pub use pipeline::{
    PullOutcome, PushOutcome, PushRequest, RemoteSpec, default_push_message, pull, push,
};
pub use readme::{render_gitattributes, render_readme};
pub use remote::{
    AuthMethod, Credentials, FailureKind, RemoteError, RemoteResult, TOKEN_USERNAME,
    classify_message, select_auth,
};
pub use status::{
    TableStatus, WorkingCopyStatus, format_size, get_status, print_export_stats,
    print_import_stats, print_porcelain, print_status,
};
pub use types::{
    ExportStats, ImportMode, ImportStats, SkippedTable, SyncError, SyncResult, TableExportStats,
    TableImportStats,
};
