// Cascade depth: how many follower generations a reshare wave crossed.
//
// Breadth-first from the author. Each popped user's follower list is fetched
// and sorted, and every not-yet-visited resharer found in it by binary
// search becomes that user's child in the next generation. Follower lists
// are far larger than resharer sets, so sorting once and probing per
// resharer is the cheap direction.
//
// Depth counts generations including the author's: an author nobody
// reshared from is depth 1, direct followers resharing make it 2.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use super::edges::{edge_list_path, write_edge_list};
use crate::checkpoint::{CheckpointManager, RunState};
use crate::monitor::post::MonitoredPost;
use crate::social::error::ApiError;
use crate::social::followers::fetch_followers;
use crate::social::session::Session;

/// The reshare tree rooted at the author.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeTree {
    pub depth: u32,
    /// User -> followers of that user who reshared through them
    pub edges: BTreeMap<u64, Vec<u64>>,
}

impl CascadeTree {
    /// Nobody reshared: the author alone.
    pub fn author_only() -> Self {
        Self {
            depth: 1,
            edges: BTreeMap::new(),
        }
    }

    /// The post is gone, so there is nothing to measure.
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn edge_list(&self) -> Vec<(u64, u64)> {
        self.edges
            .iter()
            .flat_map(|(source, targets)| targets.iter().map(move |target| (*source, *target)))
            .collect()
    }
}

/// Walk the follower graph from `author`, generation by generation.
///
/// `followers_of` returns the follower IDs of a user in any order.
pub async fn traverse<F, Fut>(
    author: u64,
    resharers: &[u64],
    mut followers_of: F,
) -> Result<CascadeTree, ApiError>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<Vec<u64>, ApiError>>,
{
    let mut visited: HashSet<u64> = HashSet::from([author]);
    let mut queue: VecDeque<u64> = VecDeque::from([author]);
    let mut edges: BTreeMap<u64, Vec<u64>> = BTreeMap::new();

    let mut depth = 1u32;
    // Nodes left to pop in the current generation, and nodes queued for the next.
    let mut remaining: i64 = 1;
    let mut next: i64 = 0;

    while let Some(user) = queue.pop_front() {
        remaining -= 1;
        if remaining < 0 {
            // `user` is the first node of a new generation.
            depth += 1;
            remaining = next - 1;
            next = 0;
        }

        let mut followers = followers_of(user).await?;
        followers.sort_unstable();

        for &resharer in resharers {
            if visited.contains(&resharer) {
                continue;
            }
            if followers.binary_search(&resharer).is_ok() {
                visited.insert(resharer);
                edges.entry(user).or_default().push(resharer);
                queue.push_back(resharer);
                next += 1;
            }
        }
    }

    Ok(CascadeTree { depth, edges })
}

/// Build the cascade tree of one dead post.
///
/// A post that was never reshared is depth 1 without any remote call. A post
/// that can no longer be looked up is depth 0.
pub async fn build_cascade(session: &Session, post: &MonitoredPost) -> Result<CascadeTree, ApiError> {
    if post.last_reshare_count() == 0 {
        return Ok(CascadeTree::author_only());
    }

    let status = session
        .retrying("cascade author lookup", || session.client().get_status(post.id))
        .await;
    let author = match status {
        Ok(status) => status.user.id,
        Err(e) if e.is_connection() => return Err(e),
        Err(e) => {
            warn!(post_id = post.id, error = %e, "Post unavailable, skipping cascade");
            return Ok(CascadeTree::missing());
        }
    };

    let resharers = post.resharer_ids();
    let tree = traverse(author, &resharers, |user| fetch_followers(session, user)).await?;
    debug!(
        post_id = post.id,
        depth = tree.depth,
        edges = tree.edges.values().map(Vec::len).sum::<usize>(),
        "Cascade built"
    );
    Ok(tree)
}

/// Compute the cascade depth of every dead post, resuming at
/// `state.progress`. Each post's edge list is written to `out_dir` and the
/// run is checkpointed after every post.
pub async fn run_phase(
    session: &Session,
    state: &mut RunState,
    checkpoints: &CheckpointManager,
    out_dir: &Path,
) -> Result<usize> {
    let total = state.store.dead_len();
    let start = usize::try_from(state.progress).unwrap_or(usize::MAX).min(total);
    let ids: Vec<u64> = state.store.dead()[start..].iter().map(|p| p.id).collect();

    info!(total = total, resume_at = start, "Computing cascade depths");

    let pb = ProgressBar::new(total as u64);
    pb.set_position(start as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  Diffusion [{bar:30}] {pos}/{len} ({eta})")
            .unwrap(),
    );

    let mut processed = 0;
    for id in ids {
        let Some(post) = state.store.dead_post(id) else {
            continue;
        };
        let tree = build_cascade(session, post)
            .await
            .with_context(|| format!("Cascade for post {id} failed after repeated reconnects"))?;

        write_edge_list(&edge_list_path(out_dir, id), &tree.edge_list())?;
        state.store.set_cascade_depth(id, tree.depth);
        state.progress += 1;
        checkpoints.save(state)?;

        processed += 1;
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(processed = processed, "Cascade depths complete");
    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;

    async fn depth_of(author: u64, resharers: &[u64], graph: &HashMap<u64, Vec<u64>>) -> CascadeTree {
        traverse(author, resharers, |user| {
            let followers = graph.get(&user).cloned().unwrap_or_default();
            async move { Ok(followers) }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_star_is_depth_two() {
        let graph = HashMap::from([(1, vec![14, 12, 10, 11, 13, 99])]);
        let tree = depth_of(1, &[10, 11, 12, 13, 14], &graph).await;
        assert_eq!(tree.depth, 2);
        assert_eq!(tree.edges[&1], vec![10, 11, 12, 13, 14]);
    }

    #[tokio::test]
    async fn test_chain_is_depth_four() {
        let graph = HashMap::from([(1, vec![2]), (2, vec![3]), (3, vec![4]), (4, vec![])]);
        let tree = depth_of(1, &[4, 3, 2], &graph).await;
        assert_eq!(tree.depth, 4);
        assert_eq!(tree.edge_list(), vec![(1, 2), (2, 3), (3, 4)]);
    }

    #[tokio::test]
    async fn test_unconnected_resharers_leave_author_alone() {
        let graph = HashMap::from([(1, vec![50, 60])]);
        let tree = depth_of(1, &[7, 8], &graph).await;
        assert_eq!(tree.depth, 1);
        assert!(tree.edges.is_empty());
    }

    #[tokio::test]
    async fn test_each_resharer_is_visited_once() {
        // 3 follows both 1 and 2; it must hang off the author only.
        let graph = HashMap::from([(1, vec![2, 3]), (2, vec![3, 1]), (3, vec![2])]);
        let tree = depth_of(1, &[2, 3, 1], &graph).await;
        assert_eq!(tree.depth, 2);
        assert_eq!(tree.edge_list(), vec![(1, 2), (1, 3)]);
    }

    #[tokio::test]
    async fn test_mixed_generations() {
        // author -> {2, 3}; 3 -> 4; 4 -> 5
        let graph = HashMap::from([(1, vec![2, 3]), (2, vec![]), (3, vec![4]), (4, vec![5])]);
        let tree = depth_of(1, &[2, 3, 4, 5], &graph).await;
        assert_eq!(tree.depth, 4);
    }

    #[tokio::test]
    async fn test_fetches_followers_once_per_node() {
        let calls = Cell::new(0);
        let graph = HashMap::from([(1, vec![2, 3]), (2, vec![]), (3, vec![])]);
        traverse(1, &[2, 3], |user| {
            calls.set(calls.get() + 1);
            let followers = graph.get(&user).cloned().unwrap_or_default();
            async move { Ok(followers) }
        })
        .await
        .unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_follower_error_propagates() {
        let result = traverse(1, &[2], |_| async { Err(ApiError::Connection("reset".into())) }).await;
        assert!(matches!(result, Err(ApiError::Connection(_))));
    }
}
