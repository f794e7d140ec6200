// MonitorStore: every tracked post, split into active and dead partitions.
//
// A post ID appears at most once across both partitions. Dead posts are
// read-only except for the two finalization results (cascade depth and
// cluster count).

use std::collections::HashSet;

use tracing::debug;

use super::post::MonitoredPost;
use crate::social::types::User;

/// What happened to an active post after an observation was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    StillActive,
    Retired,
}

#[derive(Debug, Clone, Default)]
pub struct MonitorStore {
    active: Vec<MonitoredPost>,
    dead: Vec<MonitoredPost>,
    /// IDs in either partition
    tracked: HashSet<u64>,
}

impl MonitorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from saved partitions. Duplicate IDs keep the first
    /// occurrence, with active taking precedence over dead.
    pub fn from_parts(active: Vec<MonitoredPost>, dead: Vec<MonitoredPost>) -> Self {
        let mut store = Self::new();
        for post in active {
            if store.tracked.insert(post.id) {
                store.active.push(post);
            }
        }
        for post in dead {
            if store.tracked.insert(post.id) {
                store.dead.push(post);
            }
        }
        store
    }

    pub fn active(&self) -> &[MonitoredPost] {
        &self.active
    }

    pub fn dead(&self) -> &[MonitoredPost] {
        &self.dead
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn dead_len(&self) -> usize {
        self.dead.len()
    }

    pub fn is_tracked(&self, id: u64) -> bool {
        self.tracked.contains(&id)
    }

    pub fn active_ids(&self) -> Vec<u64> {
        self.active.iter().map(|p| p.id).collect()
    }

    pub fn active_post(&self, id: u64) -> Option<&MonitoredPost> {
        self.active.iter().find(|p| p.id == id)
    }

    pub fn dead_post(&self, id: u64) -> Option<&MonitoredPost> {
        self.dead.iter().find(|p| p.id == id)
    }

    /// Insert a newly admitted post. Returns false if the ID is already tracked.
    pub fn admit(&mut self, post: MonitoredPost) -> bool {
        if !self.tracked.insert(post.id) {
            return false;
        }
        self.active.push(post);
        true
    }

    /// Append an observation to an active post, retiring it if it has now
    /// been unchanged for long enough. Returns None if the post is not active.
    pub fn record_observation(
        &mut self,
        id: u64,
        count: u32,
        likelihood: f64,
        resharers: Vec<User>,
    ) -> Option<Transition> {
        let index = self.active.iter().position(|p| p.id == id)?;
        let post = &mut self.active[index];
        post.add_resharers(resharers);
        post.add_observation(count, likelihood);

        if post.is_exhausted() {
            let post = self.active.remove(index);
            debug!(post_id = id, history = post.history_len(), "Retiring post");
            self.dead.push(post);
            Some(Transition::Retired)
        } else {
            Some(Transition::StillActive)
        }
    }

    /// Drop an active post that no longer exists remotely.
    pub fn forget(&mut self, id: u64) -> Option<MonitoredPost> {
        let index = self.active.iter().position(|p| p.id == id)?;
        self.tracked.remove(&id);
        Some(self.active.remove(index))
    }

    /// Move every remaining active post to dead, keeping their order.
    pub fn retire_all(&mut self) -> usize {
        let moved = self.active.len();
        self.dead.append(&mut self.active);
        moved
    }

    pub fn set_cascade_depth(&mut self, id: u64, depth: u32) -> bool {
        match self.dead.iter_mut().find(|p| p.id == id) {
            Some(post) => {
                post.set_cascade_depth(depth);
                true
            }
            None => false,
        }
    }

    pub fn set_cluster_count(&mut self, id: u64, count: i64) -> bool {
        match self.dead.iter_mut().find(|p| p.id == id) {
            Some(post) => {
                post.set_cluster_count(count);
                true
            }
            None => false,
        }
    }
}
