//! Generated `README.md` and `.gitattributes` for an exported tree.

use std::fmt::Write;

use crate::model::{RepositoryManifest, TableMetadata};
use crate::sync::status::format_size;

/// Render the repository overview.
#[must_use]
pub fn render_readme(manifest: &RepositoryManifest, tables: &[TableMetadata]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Table export\n");
    let _ = writeln!(
        out,
        "Exported by {} from branch `{}` at {} (source `{}`).\n",
        manifest.exported_by,
        manifest.source_branch,
        manifest.exported_at.format("%Y-%m-%d %H:%M:%S UTC"),
        short(&manifest.source_commit),
    );

    if manifest.tables.is_empty() {
        let _ = writeln!(out, "This export contains no tables.");
        return out;
    }

    let _ = writeln!(out, "| Table | Rows | Size | Chunks |");
    let _ = writeln!(out, "|-------|-----:|-----:|-------:|");
    for t in &manifest.tables {
        let flag = if t.large_file_flag { " (LFS)" } else { "" };
        let _ = writeln!(
            out,
            "| `{}` | {} | {}{flag} | {} |",
            t.table_name,
            t.total_rows,
            format_size(t.total_size_bytes),
            t.chunk_count
        );
    }
    let _ = writeln!(
        out,
        "\n**Total:** {} rows in {} table(s).\n",
        manifest.total_rows(),
        manifest.tables.len()
    );

    let _ = writeln!(out, "## Layout\n");
    let _ = writeln!(out, "- `.tablesync/manifest.json` - export manifest");
    let _ = writeln!(out, "- `.tablesync/schema.sql` - table definitions");
    let _ = writeln!(out, "- `.tablesync/tables/<table>.json` - chunk list per table");
    let _ = writeln!(out, "- `data/<table>/<table>_NNNNNN.csv` - table rows, each chunk with a header line\n");

    let chunked: Vec<&TableMetadata> = tables.iter().filter(|t| t.chunks.len() > 1).collect();
    if !chunked.is_empty() {
        let _ = writeln!(out, "## Chunked tables\n");
        let _ = writeln!(
            out,
            "Concatenate chunks in file-name order, keeping only the first header line.\n"
        );
        for t in chunked {
            let _ = writeln!(
                out,
                "- `{}`: {} chunks of at most {}",
                t.table_name,
                t.chunks.len(),
                format_size(t.max_chunk_size)
            );
        }
    }
    out
}

/// Git LFS patterns for tables whose chunks exceed the large-file threshold.
///
/// Returns `None` when no table needs it.
#[must_use]
pub fn render_gitattributes(manifest: &RepositoryManifest) -> Option<String> {
    let large: Vec<&str> = manifest
        .tables
        .iter()
        .filter(|t| t.large_file_flag)
        .map(|t| t.table_name.as_str())
        .collect();
    if large.is_empty() {
        return None;
    }

    let mut out = String::from("# Large chunk files, stored with Git LFS\n");
    for table in large {
        let _ = writeln!(out, "data/{table}/*.csv filter=lfs diff=lfs merge=lfs -text");
    }
    Some(out)
}

fn short(commit: &str) -> &str {
    commit.get(..12).unwrap_or(commit)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::{ChunkingConfig, TableSummary};

    fn manifest(large: bool) -> RepositoryManifest {
        RepositoryManifest {
            tool_version: "0.1.0".into(),
            exported_at: Utc::now(),
            exported_by: "tester".into(),
            source_branch: "main".into(),
            source_commit: "0123456789abcdef".into(),
            tables: vec![TableSummary {
                table_name: "users".into(),
                chunk_count: 1,
                total_rows: 2,
                total_size_bytes: 90,
                chunking_enabled: false,
                large_file_flag: large,
            }],
            chunking_config: ChunkingConfig {
                strategy: "size-based".into(),
                max_chunk_size: 100,
                large_file_threshold: 200,
                row_threshold: 1_000_000,
                partition_column: None,
            },
        }
    }

    #[test]
    fn test_readme_lists_tables() {
        let readme = render_readme(&manifest(false), &[]);
        assert!(readme.contains("| `users` | 2 | 90 B | 1 |"));
        assert!(readme.contains("`0123456789ab`"));
    }

    #[test]
    fn test_gitattributes_only_for_large_tables() {
        assert!(render_gitattributes(&manifest(false)).is_none());
        let attrs = render_gitattributes(&manifest(true)).unwrap();
        assert!(attrs.contains("data/users/*.csv filter=lfs"));
    }
}
