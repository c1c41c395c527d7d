//! Commit command: record the staged tables in the local ledger.

use colored::Colorize;

use crate::config::{WorkingCopy, default_actor};
use crate::error::Result;

use super::open_working_copy;

/// Execute the commit command.
///
/// The record references the store head at commit time.
///
/// # Errors
///
/// Returns `NothingStaged` or an empty-message error from the ledger.
pub fn execute(message: &str, wc: &WorkingCopy, actor: Option<&str>, json: bool) -> Result<()> {
    let (store, mut ledger) = open_working_copy(wc)?;
    let author = actor.map_or_else(default_actor, str::to_string);

    let record = ledger.commit(message, &author, Some(store.head()?))?;
    ledger.save()?;

    if json {
        super::print_json(&record)?;
    } else {
        println!("[{}] {}", record.short_id().yellow(), record.message);
        println!(" {} table(s): {}", record.tables.len(), record.tables.join(", "));
    }
    Ok(())
}
