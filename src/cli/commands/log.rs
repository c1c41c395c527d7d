//! Log command: list local commits, newest first.

use colored::Colorize;

use crate::config::WorkingCopy;
use crate::error::Result;

use super::open_working_copy;

/// Execute the log command.
///
/// # Errors
///
/// Returns `NotInitialized` outside a working copy.
pub fn execute(oneline: bool, limit: Option<usize>, wc: &WorkingCopy, json: bool) -> Result<()> {
    let (_store, ledger) = open_working_copy(wc)?;
    let commits = ledger.log(limit);

    if json {
        return super::print_json(&commits);
    }
    if commits.is_empty() {
        println!("No commits yet.");
        return Ok(());
    }

    for (i, commit) in commits.iter().enumerate() {
        if oneline {
            println!("{} {}", commit.short_id().yellow(), commit.message);
            continue;
        }
        if i > 0 {
            println!();
        }
        println!("{}", format!("commit {}", commit.id).yellow());
        println!("Author: {}", commit.author);
        println!("Date:   {}", commit.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("Tables: {}", commit.tables.join(", "));
        println!();
        for line in commit.message.lines() {
            println!("    {line}");
        }
    }
    Ok(())
}
