// Edge-list files for the external clustering tool.
//
// One `source target` pair per line. A post with no graph gets a file
// containing only the sentinel, so the tool's batch script can tell "no
// graph" apart from "not processed yet".

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Content written for a post without a graph.
pub const EMPTY_GRAPH: &str = "empty";

/// Edge-list path for a post inside `dir`.
pub fn edge_list_path(dir: &Path, post_id: u64) -> PathBuf {
    dir.join(format!("{post_id}.abc"))
}

/// Write `edges` to `path`, creating the parent directory if needed.
pub fn write_edge_list(path: &Path, edges: &[(u64, u64)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file =
        fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);

    if edges.is_empty() {
        writeln!(out, "{EMPTY_GRAPH}")?;
    } else {
        for (source, target) in edges {
            writeln!(out, "{source} {target}")?;
        }
    }
    out.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_one_edge_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = edge_list_path(&dir.path().join("cascades"), 77);
        write_edge_list(&path, &[(1, 2), (1, 3), (2, 4)]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1 2\n1 3\n2 4\n");
        assert!(path.ends_with("cascades/77.abc"));
    }

    #[test]
    fn test_empty_graph_writes_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let path = edge_list_path(dir.path(), 1);
        write_edge_list(&path, &[]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), EMPTY_GRAPH);
    }
}
