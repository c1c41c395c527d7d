//! Initialize a working copy.
//!
//! A working copy is a directory with a `.tsync/` state directory holding
//! the table store and the ledger. The state directory carries its own
//! `.gitignore` so an enclosing git repository never picks it up.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::WorkingCopy;
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::storage::SqliteStore;
use crate::sync::ensure_gitignore;

#[derive(Serialize)]
struct InitOutput {
    path: PathBuf,
    database: PathBuf,
    ledger: PathBuf,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `AlreadyInitialized` unless `force` is set, or an error if the
/// state directory or store cannot be created.
pub fn execute(wc: &WorkingCopy, force: bool, json: bool) -> Result<()> {
    initialize(wc, force)?;

    if json {
        let output = InitOutput {
            path: wc.root.clone(),
            database: wc.db_path.clone(),
            ledger: wc.ledger_path(),
        };
        super::print_json(&output)?;
    } else {
        println!("Initialized tablesync working copy in {}", wc.root.display());
        println!("  Store:  {}", wc.db_path.display());
        println!("  Ledger: {}", wc.ledger_path().display());
        println!();
        println!("Next: 'tsync pull <repo-url>' to import tables, or 'tsync push <repo-url>' to export them.");
    }
    Ok(())
}

/// Create the state directory, an empty store and an empty ledger.
///
/// With `force`, an existing store and ledger are removed first.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if the working copy exists and `force` is
/// not set.
pub fn initialize(wc: &WorkingCopy, force: bool) -> Result<()> {
    if wc.is_initialized() && !force {
        return Err(Error::AlreadyInitialized {
            path: wc.state_dir(),
        });
    }

    let state_dir = wc.state_dir();
    fs::create_dir_all(&state_dir)?;

    if force {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let mut name = wc.db_path.clone().into_os_string();
            name.push(suffix);
            let path = PathBuf::from(name);
            if path.is_file() {
                fs::remove_file(&path)?;
            }
        }
        if wc.ledger_path().is_file() {
            fs::remove_file(wc.ledger_path())?;
        }
    }

    if let Some(parent) = wc.db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    SqliteStore::open(&wc.db_path)?;
    Ledger::open(&wc.ledger_path())?.save()?;
    ensure_gitignore(&state_dir)?;
    Ok(())
}
