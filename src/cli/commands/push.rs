//! Push command: export every table and push it to a remote branch.

use colored::Colorize;

use crate::cli::PushArgs;
use crate::config::{
    DEFAULT_CHUNK_SIZE, LARGE_FILE_THRESHOLD, ROW_THRESHOLD, WorkingCopy, default_actor,
    parse_chunk_size,
};
use crate::error::{Error, Result};
use crate::sync::{ExportSettings, PushRequest, print_export_stats, push};

use super::{open_working_copy, remote_spec};

/// Execute the push command.
///
/// # Errors
///
/// Returns `InvalidArgument` for a bad chunk size or missing partition
/// column, and any export or remote error.
pub fn execute(args: &PushArgs, wc: &WorkingCopy, actor: Option<&str>, json: bool) -> Result<()> {
    let request = build_request(args, actor)?;
    let (store, mut ledger) = open_working_copy(wc)?;
    let remote = remote_spec(&args.url, &args.branch, &args.auth);

    let outcome = push(&store, &mut ledger, &remote, &request)?;
    if !outcome.dry_run {
        ledger.save()?;
    }

    if json {
        super::print_json(&outcome)?;
        return Ok(());
    }

    print_export_stats(&outcome.stats, outcome.dry_run);
    println!();
    if outcome.dry_run {
        println!("{}", "Dry run: nothing was committed or pushed.".dimmed());
        println!("  Would commit: {}", outcome.message);
    } else {
        match &outcome.commit {
            Some(commit) => println!(
                "Committed {} \"{}\"",
                commit.get(..12).unwrap_or(commit).yellow(),
                outcome.message
            ),
            None => println!("{}", "Remote tree already up to date; no new commit.".dimmed()),
        }
        if outcome.pushed {
            println!("Pushed to {} ({})", outcome.url, outcome.branch.bold());
        }
    }
    Ok(())
}

fn build_request(args: &PushArgs, actor: Option<&str>) -> Result<PushRequest> {
    let max_chunk_size = match &args.chunk_size {
        Some(size) => parse_chunk_size(size)?,
        None => DEFAULT_CHUNK_SIZE,
    };
    if args.strategy == crate::cli::StrategyArg::ColumnBased && args.partition_column.is_none() {
        return Err(Error::InvalidArgument(
            "--strategy column-based requires --partition-column".to_string(),
        ));
    }

    Ok(PushRequest {
        settings: ExportSettings {
            strategy: args.strategy.name().to_string(),
            max_chunk_size,
            large_file_threshold: LARGE_FILE_THRESHOLD,
            row_threshold: ROW_THRESHOLD,
            partition_column: args.partition_column.clone(),
            exported_by: actor.map_or_else(default_actor, str::to_string),
        },
        message: args.message.clone(),
        dry_run: args.dry_run,
        force: args.force,
    })
}
