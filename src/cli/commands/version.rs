//! Version command implementation.

use crate::error::Result;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    git: &'a str,
    sqlite: &'a str,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };
    let (major, minor, patch) = git2::Version::get().libgit2_version();
    let libgit2 = format!("{major}.{minor}.{patch}");

    if json {
        let output = VersionOutput {
            version,
            build,
            git: &libgit2,
            sqlite: rusqlite::version(),
        };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
        return Ok(());
    }

    println!("tsync version {version} ({build})");
    println!("  libgit2 {libgit2}, SQLite {}", rusqlite::version());
    Ok(())
}
