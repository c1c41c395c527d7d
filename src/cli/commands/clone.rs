//! Clone command: new working copy populated from a remote.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::cli::CloneArgs;
use crate::config::WorkingCopy;
use crate::error::{Error, Result};
use crate::sync::{PullOutcome, RemoteSpec, pull, print_import_stats};

use super::{init, open_working_copy, remote_spec};

/// Execute the clone command.
///
/// Creates the working copy, then imports the remote branch into it. The
/// remote is recorded so later pulls can omit the URL. If the import fails,
/// whatever the clone created is removed again so the command can be
/// retried.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if the target already holds a working copy,
/// and any remote or import error.
pub fn execute(args: &CloneArgs, db: Option<&Path>, json: bool) -> Result<()> {
    let root = match &args.directory {
        Some(dir) => dir.clone(),
        None => PathBuf::from(directory_for(&args.url)?),
    };
    let wc = WorkingCopy::new(&root, db);
    let created_root = !root.exists();
    let created_db = !wc.db_path.exists();
    init::initialize(&wc, false)?;

    let remote = remote_spec(&args.url, &args.branch, &args.auth);
    let outcome = match populate(&wc, &remote) {
        Ok(outcome) => outcome,
        Err(e) => {
            discard(&wc, created_root, created_db);
            return Err(e);
        }
    };

    if json {
        let output = serde_json::json!({
            "path": wc.root,
            "url": outcome.url,
            "branch": outcome.branch,
            "stats": outcome.stats,
        });
        super::print_json(&output)?;
    } else {
        println!("Cloned {} ({}) into {}", outcome.url, outcome.branch, wc.root.display());
        print_import_stats(&outcome.stats, false);
    }
    Ok(())
}

fn populate(wc: &WorkingCopy, remote: &RemoteSpec) -> Result<PullOutcome> {
    let (mut store, mut ledger) = open_working_copy(wc)?;
    let outcome = pull(&mut store, &mut ledger, remote, true, false)?;
    ledger.save()?;
    Ok(outcome)
}

/// Remove what a failed clone created: the whole directory if the clone
/// made it, otherwise only the state directory and store.
fn discard(wc: &WorkingCopy, created_root: bool, created_db: bool) {
    let result = if created_root {
        fs::remove_dir_all(&wc.root)
    } else {
        fs::remove_dir_all(wc.state_dir())
    };
    if let Err(e) = result {
        warn!(path = %wc.root.display(), error = %e, "could not remove partial working copy");
    }
    if created_db && wc.db_path.exists() {
        if let Err(e) = fs::remove_file(&wc.db_path) {
            warn!(path = %wc.db_path.display(), error = %e, "could not remove partial store");
        }
    }
}

/// Default directory name for a URL: its last path segment without `.git`.
fn directory_for(url: &str) -> Result<String> {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed);
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::InvalidArgument(format!(
            "cannot derive a directory name from '{url}'; pass one explicitly"
        )));
    }
    Ok(name.to_string())
}
