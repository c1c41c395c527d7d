//! Pull command: import a remote branch into the working copy.

use crate::cli::PullArgs;
use crate::config::WorkingCopy;
use crate::error::{Error, Result};
use crate::sync::{print_import_stats, pull};

use super::{open_working_copy, remote_spec};

/// Execute the pull command.
///
/// The URL defaults to the remote recorded by the last push, pull or clone;
/// the branch defaults to the store's current branch.
///
/// # Errors
///
/// Returns `InvalidArgument` when no URL is given or recorded,
/// `StagedChanges` when staged tables would be discarded without `--force`,
/// and any remote or import error.
pub fn execute(args: &PullArgs, wc: &WorkingCopy, json: bool) -> Result<()> {
    let (mut store, mut ledger) = open_working_copy(wc)?;

    let url = match (&args.url, ledger.remote_url()) {
        (Some(url), _) => url.clone(),
        (None, Some(recorded)) => recorded.to_string(),
        (None, None) => {
            return Err(Error::InvalidArgument(
                "no remote recorded for this working copy; pass a repository URL".to_string(),
            ));
        }
    };
    let branch = match &args.branch {
        Some(branch) => branch.clone(),
        None => store.current_branch()?,
    };

    let remote = remote_spec(&url, &branch, &args.auth);
    let outcome = pull(&mut store, &mut ledger, &remote, args.force, args.dry_run)?;
    if !outcome.dry_run {
        ledger.save()?;
    }

    if json {
        super::print_json(&outcome)?;
    } else {
        println!("From {} ({})", outcome.url, outcome.branch);
        print_import_stats(&outcome.stats, outcome.dry_run);
    }
    Ok(())
}
