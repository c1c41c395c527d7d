//! Command implementations.
//!
//! Each command opens what it needs from the working copy, does its work,
//! and saves the ledger before returning when it changed it.

pub mod add;
pub mod clone;
pub mod commit;
pub mod completions;
pub mod init;
pub mod log;
pub mod pull;
pub mod push;
pub mod status;
pub mod version;

use serde::Serialize;

use crate::cli::CredentialArgs;
use crate::config::{WorkingCopy, default_ssh_key};
use crate::error::Result;
use crate::ledger::Ledger;
use crate::storage::SqliteStore;
use crate::sync::{RemoteSpec, select_auth};

/// Open the store and ledger of an initialized working copy.
pub(crate) fn open_working_copy(wc: &WorkingCopy) -> Result<(SqliteStore, Ledger)> {
    wc.require_initialized()?;
    let store = SqliteStore::open(&wc.db_path)?;
    let ledger = Ledger::open(&wc.ledger_path())?;
    Ok((store, ledger))
}

/// Build the remote target, picking one authentication method.
pub(crate) fn remote_spec(url: &str, branch: &str, auth: &CredentialArgs) -> RemoteSpec {
    RemoteSpec {
        url: url.to_string(),
        branch: branch.to_string(),
        auth: select_auth(&auth.credentials(), default_ssh_key()),
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
