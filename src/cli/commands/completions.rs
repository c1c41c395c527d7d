//! Shell completions command implementation.

use clap::CommandFactory;
use clap_complete::Shell;
use std::io;

use crate::cli::Cli;
use crate::error::Result;

/// Write completions for `shell` to stdout.
pub fn execute(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let bin = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, bin, &mut io::stdout());
    Ok(())
}
