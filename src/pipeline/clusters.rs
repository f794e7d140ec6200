// Resharer-follower graphs for the external clustering tool.
//
// For each dead post we dump an edge from the author to every one of their
// followers and from every known resharer to every one of theirs. The tool
// runs outside this crate; its output files come back through
// read_cluster_count().

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use super::edges::{edge_list_path, write_edge_list};
use crate::checkpoint::{CheckpointManager, RunState};
use crate::monitor::post::MonitoredPost;
use crate::social::error::ApiError;
use crate::social::followers::fetch_followers;
use crate::social::session::Session;

/// Returned by read_cluster_count() when the tool produced no output file.
pub const CLUSTERS_MISSING: i64 = -1;

/// Returned by read_cluster_count() when the output could not be read or parsed.
pub const CLUSTERS_UNREADABLE: i64 = -2;

/// Where the clustering tool writes its result for a post.
pub fn cluster_output_path(dir: &Path, post_id: u64) -> PathBuf {
    dir.join(format!("out.{post_id}.mci.I20"))
}

/// Build the resharer-follower edge list for one post.
///
/// Posts that were never reshared, or that no longer exist, have no graph.
pub async fn build_follower_graph(
    session: &Session,
    post: &MonitoredPost,
) -> Result<Vec<(u64, u64)>, ApiError> {
    if post.last_reshare_count() == 0 {
        return Ok(Vec::new());
    }

    let status = session
        .retrying("cluster author lookup", || session.client().get_status(post.id))
        .await;
    let author = match status {
        Ok(status) => status.user.id,
        Err(e) if e.is_connection() => return Err(e),
        Err(e) => {
            warn!(post_id = post.id, error = %e, "Post unavailable, skipping follower graph");
            return Ok(Vec::new());
        }
    };

    let mut edges = Vec::new();
    for user in std::iter::once(author).chain(post.resharer_ids()) {
        let followers = fetch_followers(session, user).await?;
        edges.extend(followers.into_iter().map(|follower| (user, follower)));
    }

    debug!(post_id = post.id, edges = edges.len(), "Follower graph built");
    Ok(edges)
}

/// Parse the cluster count out of a clustering-tool output file.
///
/// The fourth line carries the matrix dimensions as `NxM`; M is the number
/// of clusters.
pub fn read_cluster_count(path: &Path) -> i64 {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CLUSTERS_MISSING,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read cluster output");
            return CLUSTERS_UNREADABLE;
        }
    };

    let parsed = raw.lines().nth(3).and_then(|line| {
        let (_, after) = line.rsplit_once('x')?;
        let digits: String = after
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse::<i64>().ok()
    });

    parsed.unwrap_or_else(|| {
        warn!(path = %path.display(), "Cluster output has no dimension line");
        CLUSTERS_UNREADABLE
    })
}

/// Write a follower graph for every dead post, resuming at `state.progress`
/// and checkpointing after each one.
pub async fn run_phase(
    session: &Session,
    state: &mut RunState,
    checkpoints: &CheckpointManager,
    out_dir: &Path,
) -> Result<usize> {
    let total = state.store.dead_len();
    let start = usize::try_from(state.progress).unwrap_or(usize::MAX).min(total);
    let ids: Vec<u64> = state.store.dead()[start..].iter().map(|p| p.id).collect();

    info!(total = total, resume_at = start, "Writing follower graphs");

    let pb = ProgressBar::new(total as u64);
    pb.set_position(start as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  Graphs [{bar:30}] {pos}/{len} ({eta})")
            .unwrap(),
    );

    let mut processed = 0;
    for id in ids {
        let Some(post) = state.store.dead_post(id) else {
            continue;
        };
        let edges = build_follower_graph(session, post)
            .await
            .with_context(|| format!("Follower graph for post {id} failed after repeated reconnects"))?;

        write_edge_list(&edge_list_path(out_dir, id), &edges)?;
        state.progress += 1;
        checkpoints.save(state)?;

        processed += 1;
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(processed = processed, "Follower graphs complete");
    Ok(processed)
}

/// How many of the clustering tool's results were found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSummary {
    /// Posts with a usable count (never-reshared posts included)
    pub found: usize,
    /// Reshared posts whose output file does not exist yet
    pub missing: usize,
    pub unreadable: usize,
}

/// Read back the clustering tool's results into the dead posts.
/// Posts that were never reshared get 0 without looking for a file.
pub fn collect_cluster_counts(state: &mut RunState, clusters_dir: &Path) -> ClusterSummary {
    let targets: Vec<(u64, bool)> = state
        .store
        .dead()
        .iter()
        .map(|p| (p.id, p.last_reshare_count() > 0))
        .collect();

    let mut summary = ClusterSummary::default();
    for (id, reshared) in targets {
        let count = if reshared {
            read_cluster_count(&cluster_output_path(clusters_dir, id))
        } else {
            0
        };
        match count {
            CLUSTERS_MISSING => summary.missing += 1,
            CLUSTERS_UNREADABLE => summary.unreadable += 1,
            _ => summary.found += 1,
        }
        state.store.set_cluster_count(id, count);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_reads_count_from_fourth_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "out.1.mci.I20",
            "(mclheader\nmcltype matrix\ndimensions 1500x37\n(mcldim 1500x37\n)\n",
        );
        assert_eq!(read_cluster_count(&path), 37);
    }

    #[test]
    fn test_missing_output_is_minus_one() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            read_cluster_count(&dir.path().join("out.9.mci.I20")),
            CLUSTERS_MISSING
        );
    }

    #[test]
    fn test_short_or_garbled_output_is_minus_two() {
        let dir = tempfile::tempdir().unwrap();
        let short = write(dir.path(), "a", "one\ntwo\n");
        let garbled = write(dir.path(), "b", "1\n2\n3\nno dimensions here\n");
        assert_eq!(read_cluster_count(&short), CLUSTERS_UNREADABLE);
        assert_eq!(read_cluster_count(&garbled), CLUSTERS_UNREADABLE);
    }

    #[test]
    fn test_output_path_naming() {
        let path = cluster_output_path(Path::new("/state/clusters"), 42);
        assert_eq!(path, PathBuf::from("/state/clusters/out.42.mci.I20"));
    }
}
