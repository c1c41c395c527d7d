//! tablesync CLI entry point.

use clap::Parser;
use std::process::ExitCode;
use tsync::cli::commands;
use tsync::cli::{Cli, Commands};
use tsync::config::{WorkingCopy, resolve_working_dir};
use tsync::error::Error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<(), Error> {
    let json = cli.json;
    let actor = cli.actor.as_deref();
    let wc = || WorkingCopy::new(&resolve_working_dir(cli.dir.as_deref()), cli.db.as_deref());

    match &cli.command {
        Commands::Init { force } => {
            // Never walks up: init creates a working copy exactly here
            let root = cli.dir.clone().map_or_else(std::env::current_dir, Ok)?;
            commands::init::execute(&WorkingCopy::new(&root, cli.db.as_deref()), *force, json)
        }
        Commands::Clone(args) => commands::clone::execute(args, cli.db.as_deref(), json),

        // Remote
        Commands::Push(args) => commands::push::execute(args, &wc(), actor, json),
        Commands::Pull(args) => commands::pull::execute(args, &wc(), json),

        // Ledger
        Commands::Add { tables } => commands::add::execute(tables, &wc(), json),
        Commands::Commit { message } => commands::commit::execute(message, &wc(), actor, json),
        Commands::Status { porcelain } => commands::status::execute(*porcelain, &wc(), json),
        Commands::Log { oneline, limit } => commands::log::execute(*oneline, *limit, &wc(), json),

        Commands::Completions { shell } => commands::completions::execute(*shell),
        Commands::Version => commands::version::execute(json),
    }
}
