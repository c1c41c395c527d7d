//! Add command: stage tables for the next local commit.

use serde::Serialize;

use crate::config::WorkingCopy;
use crate::error::{Error, Result};

use super::open_working_copy;

#[derive(Serialize)]
struct AddOutput {
    staged: Vec<String>,
    newly_staged: usize,
}

/// Execute the add command. `.` stages every table.
///
/// # Errors
///
/// Returns `TableNotFound` for a name the store does not hold; nothing is
/// staged in that case.
pub fn execute(tables: &[String], wc: &WorkingCopy, json: bool) -> Result<()> {
    let (store, mut ledger) = open_working_copy(wc)?;

    let newly_staged = if tables.iter().any(|t| t == ".") {
        ledger.stage_all(&store.list_tables()?)
    } else {
        for table in tables {
            if !store.has_table(table)? {
                return Err(Error::TableNotFound {
                    name: table.clone(),
                });
            }
        }
        tables.iter().filter(|t| ledger.stage(t)).count()
    };
    ledger.save()?;

    if json {
        super::print_json(&AddOutput {
            staged: ledger.staged().to_vec(),
            newly_staged,
        })?;
    } else if ledger.staged().is_empty() {
        println!("No tables to stage.");
    } else {
        println!("Staged {} table(s):", ledger.staged().len());
        for table in ledger.staged() {
            println!("  {table}");
        }
    }
    Ok(())
}
