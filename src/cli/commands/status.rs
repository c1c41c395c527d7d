//! Status command implementation.

use crate::config::WorkingCopy;
use crate::error::Result;
use crate::sync::{get_status, print_porcelain, print_status};

use super::open_working_copy;

/// Execute the status command.
///
/// # Errors
///
/// Returns `NotInitialized` outside a working copy.
pub fn execute(porcelain: bool, wc: &WorkingCopy, json: bool) -> Result<()> {
    let (store, ledger) = open_working_copy(wc)?;
    let status = get_status(&store, &ledger)?;

    if json {
        super::print_json(&status)?;
    } else if porcelain {
        print_porcelain(&status);
    } else {
        print_status(&status);
    }
    Ok(())
}
