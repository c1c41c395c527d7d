//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::sync::Credentials;

pub mod commands;

/// tablesync - chunked export/import of versioned tables to git hosting
#[derive(Parser, Debug)]
#[command(name = "tsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Working copy directory (default: nearest ancestor holding .tsync/)
    #[arg(long, global = true, env = "TSYNC_DIR")]
    pub dir: Option<PathBuf>,

    /// Store path (default: <dir>/.tsync/tsync.db)
    #[arg(long, global = true, env = "TSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Author name recorded in local commits and export manifests
    #[arg(long, global = true, env = "TSYNC_ACTOR")]
    pub actor: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a working copy in the current (or --dir) directory
    Init {
        /// Discard an existing store and ledger
        #[arg(long)]
        force: bool,
    },

    /// Create a working copy from a remote repository
    Clone(CloneArgs),

    /// Export all tables and push them to a remote branch
    Push(PushArgs),

    /// Import tables from a remote branch
    Pull(PullArgs),

    /// Stage tables for the next commit (`.` stages every table)
    Add {
        /// Table names, or `.`
        #[arg(required = true)]
        tables: Vec<String>,
    },

    /// Record the staged tables as a local commit
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,
    },

    /// Show table states and sync information
    Status {
        /// `<code> <table>` lines for scripts
        #[arg(long)]
        porcelain: bool,
    },

    /// Show local commits, newest first
    Log {
        /// One line per commit
        #[arg(long)]
        oneline: bool,

        /// Show at most N commits
        #[arg(short = 'n', long = "max-count")]
        limit: Option<usize>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Print version information
    Version,
}

/// Chunking strategies selectable on push.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StrategyArg {
    /// Split by accumulated byte size
    #[default]
    SizeBased,
    /// Split by partition column values
    ColumnBased,
}

impl StrategyArg {
    /// Name recorded in table metadata.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SizeBased => crate::chunking::size::NAME,
            Self::ColumnBased => crate::chunking::column::NAME,
        }
    }
}

/// Authentication flags shared by remote commands.
///
/// Exactly one method is used: token, then username and password, then
/// an SSH key, then the default key in `~/.ssh`, then anonymous.
#[derive(Args, Debug, Clone, Default)]
pub struct CredentialArgs {
    /// Access token (HTTP basic with a fixed username)
    #[arg(long, env = "TSYNC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Username for HTTP basic auth
    #[arg(long, env = "TSYNC_USERNAME")]
    pub username: Option<String>,

    /// Password for HTTP basic auth
    #[arg(long, env = "TSYNC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Private key for SSH remotes
    #[arg(long, env = "TSYNC_SSH_KEY")]
    pub ssh_key: Option<PathBuf>,
}

impl CredentialArgs {
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials {
            token: self.token.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            ssh_key: self.ssh_key.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct CloneArgs {
    /// Remote repository URL
    pub url: String,

    /// Target directory (default: repository name)
    #[arg(value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Branch to import
    #[arg(short, long, default_value = crate::config::DEFAULT_BRANCH)]
    pub branch: String,

    #[command(flatten)]
    pub auth: CredentialArgs,
}

#[derive(Args, Debug)]
pub struct PushArgs {
    /// Remote repository URL
    pub url: String,

    /// Remote branch
    #[arg(default_value = crate::config::DEFAULT_BRANCH)]
    pub branch: String,

    /// Maximum chunk file size, e.g. 50MB or 1GB
    #[arg(long)]
    pub chunk_size: Option<String>,

    /// Chunking strategy
    #[arg(long, value_enum, default_value_t)]
    pub strategy: StrategyArg,

    /// Partition column for the column-based strategy
    #[arg(long)]
    pub partition_column: Option<String>,

    /// Export and report without committing or pushing
    #[arg(long)]
    pub dry_run: bool,

    /// Overwrite the remote branch even if it has diverged
    #[arg(long)]
    pub force: bool,

    /// Commit message (default: latest local commit message)
    #[arg(short, long)]
    pub message: Option<String>,

    #[command(flatten)]
    pub auth: CredentialArgs,
}

#[derive(Args, Debug)]
pub struct PullArgs {
    /// Remote repository URL (default: the recorded remote)
    pub url: Option<String>,

    /// Remote branch (default: the store's current branch)
    pub branch: Option<String>,

    /// Discard staged tables
    #[arg(long)]
    pub force: bool,

    /// Read and validate the remote without changing anything
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub auth: CredentialArgs,
}
