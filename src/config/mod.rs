//! Configuration management.
//!
//! This module provides functions for discovering the working copy,
//! resolving the store and ledger paths, and parsing size settings.
//!
//! # Layout
//!
//! A working copy is any directory holding a `.tsync/` state directory:
//! - **Store**: `.tsync/tsync.db` (overridable with `--db` / `TSYNC_DB`)
//! - **Ledger**: `.tsync/ledger.json` (staged tables and local commits)
//!
//! Nothing under `.tsync/` is ever pushed to the remote.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::ledger::LEDGER_FILE;

/// State directory inside a working copy.
pub const STATE_DIR: &str = ".tsync";

/// Store file inside the state directory.
pub const DB_FILE: &str = "tsync.db";

pub const DEFAULT_BRANCH: &str = "main";

const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * MB;

/// Default upper bound on a chunk file.
pub const DEFAULT_CHUNK_SIZE: u64 = 50 * MB;

/// Chunks above this size are flagged as large in the manifest.
pub const LARGE_FILE_THRESHOLD: u64 = 80 * MB;

/// Tables with more rows than this are always chunked.
pub const ROW_THRESHOLD: u64 = 1_000_000;

/// Resolved locations of one working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingCopy {
    pub root: PathBuf,
    pub db_path: PathBuf,
}

impl WorkingCopy {
    /// Working copy rooted at `root`, with an optional store override.
    #[must_use]
    pub fn new(root: &Path, explicit_db: Option<&Path>) -> Self {
        let db_path = resolve_db_path(root, explicit_db);
        Self {
            root: root.to_path_buf(),
            db_path,
        }
    }

    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir().join(LEDGER_FILE)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state_dir().is_dir() && self.db_path.exists()
    }

    /// Fail with `NotInitialized` unless `init` or `clone` has run here.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if the state directory or store is missing.
    pub fn require_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::NotInitialized {
                path: self.root.display().to_string(),
            })
        }
    }
}

/// Find the working copy root.
///
/// Priority:
/// 1. Explicit `--dir` flag (or `TSYNC_DIR`, handled by clap)
/// 2. Nearest ancestor of the current directory holding `.tsync/`
/// 3. The current directory
#[must_use]
pub fn resolve_working_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }

    let Ok(cwd) = std::env::current_dir() else {
        return PathBuf::from(".");
    };
    let mut dir = cwd.as_path();
    loop {
        if dir.join(STATE_DIR).is_dir() {
            return dir.to_path_buf();
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return cwd,
        }
    }
}

/// Resolve the store path.
///
/// Priority:
/// 1. If `explicit_path` is provided (`--db` / `TSYNC_DB`), use it directly
/// 2. `<root>/.tsync/tsync.db`
#[must_use]
pub fn resolve_db_path(root: &Path, explicit_path: Option<&Path>) -> PathBuf {
    explicit_path.map_or_else(|| root.join(STATE_DIR).join(DB_FILE), Path::to_path_buf)
}

/// Parse a chunk size such as `50MB`, `1.5GB` or a plain byte count.
///
/// Units are case-insensitive; `MB` is 1024 * 1024 bytes.
///
/// # Errors
///
/// Returns `InvalidArgument` for unknown units, non-numbers, or zero.
pub fn parse_chunk_size(input: &str) -> Result<u64> {
    let s = input.trim().to_ascii_uppercase();
    let (number, unit) = if let Some(n) = s.strip_suffix("GB") {
        (n, GB)
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, MB)
    } else {
        (s.as_str(), 1)
    };

    let invalid = || {
        Error::InvalidArgument(format!(
            "invalid chunk size '{input}': expected a number followed by MB or GB, e.g. 50MB"
        ))
    };
    let value: f64 = number.trim().parse().map_err(|_| invalid())?;
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid());
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let bytes = (value * unit as f64) as u64;
    if bytes == 0 {
        return Err(invalid());
    }
    Ok(bytes)
}

/// Default private key for SSH remotes: `~/.ssh/id_ed25519`, then
/// `~/.ssh/id_rsa`.
#[must_use]
pub fn default_ssh_key() -> Option<PathBuf> {
    let home = directories::BaseDirs::new()?.home_dir().join(".ssh");
    ["id_ed25519", "id_rsa"]
        .iter()
        .map(|name| home.join(name))
        .find(|path| path.is_file())
}

/// Get the default actor name.
///
/// Priority:
/// 1. `TSYNC_ACTOR` environment variable
/// 2. Git user name
/// 3. System username
/// 4. "unknown"
#[must_use]
pub fn default_actor() -> String {
    if let Ok(actor) = std::env::var("TSYNC_ACTOR") {
        if !actor.is_empty() {
            return actor;
        }
    }

    if let Ok(output) = std::process::Command::new("git")
        .args(["config", "user.name"])
        .output()
    {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }

    if let Ok(user) = std::env::var("USER") {
        return user;
    }

    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_actor() {
        let actor = default_actor();
        assert!(!actor.is_empty());
    }

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/db.sqlite");
        let result = resolve_db_path(Path::new("/work"), Some(&explicit));
        assert_eq!(result, explicit);
    }

    #[test]
    fn test_resolve_db_path_default() {
        let result = resolve_db_path(Path::new("/work"), None);
        assert_eq!(result, PathBuf::from("/work/.tsync/tsync.db"));
    }

    #[test]
    fn test_parse_chunk_size() {
        assert_eq!(parse_chunk_size("50MB").unwrap(), 50 * MB);
        assert_eq!(parse_chunk_size("50mb").unwrap(), 50 * MB);
        assert_eq!(parse_chunk_size("2GB").unwrap(), 2 * GB);
        assert_eq!(parse_chunk_size("1.5 GB").unwrap(), GB + GB / 2);
        assert_eq!(parse_chunk_size("4096").unwrap(), 4096);
        assert!(parse_chunk_size("50KB").is_err());
        assert!(parse_chunk_size("0MB").is_err());
        assert!(parse_chunk_size("-1MB").is_err());
        assert!(parse_chunk_size("").is_err());
    }

    #[test]
    fn test_working_copy_paths() {
        let wc = WorkingCopy::new(Path::new("/work"), None);
        assert_eq!(wc.ledger_path(), PathBuf::from("/work/.tsync/ledger.json"));
        assert!(!wc.is_initialized());
        assert!(matches!(wc.require_initialized(), Err(Error::NotInitialized { .. })));
    }
}
