// Shared fixtures for the integration tests: an in-memory social graph that
// implements SocialGraphClient, plus helpers for building statuses and
// sessions with millisecond windows.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use ripple::social::client::SocialGraphClient;
use ripple::social::error::ApiError;
use ripple::social::quota::{QuotaPlan, QuotaScheduler};
use ripple::social::session::{RecoveryPolicy, Session};
use ripple::social::stream::{SampleBuffer, StreamHandle};
use ripple::social::types::{Credential, Entities, IdPage, Status, User, FIRST_CURSOR};

/// What one call to open_sample delivers.
#[derive(Debug, Clone, Default)]
pub struct StreamScript {
    pub posts: Vec<Status>,
    /// Report a stream failure after delivering `posts`
    pub then_fail: bool,
}

/// Counters for every remote call the client served.
#[derive(Debug, Default)]
pub struct CallLog {
    pub get_status: u32,
    pub lookup_statuses: u32,
    pub recent_resharers: Vec<Credential>,
    pub resharer_ids: Vec<Credential>,
    pub lookup_users: u32,
    pub follower_pages: Vec<(u64, i64)>,
    pub open_sample: u32,
    pub reauthenticate: u32,
}

/// A scripted social graph. Everything is mutable behind locks so tests can
/// change reshare counts between cycles.
#[derive(Default)]
pub struct ScriptedClient {
    statuses: Mutex<HashMap<u64, Status>>,
    followers: Mutex<HashMap<u64, Vec<u64>>>,
    resharers: Mutex<HashMap<u64, Vec<User>>>,
    users: Mutex<HashMap<u64, User>>,
    /// Follower IDs per page (0 = everything on one page)
    page_size: usize,
    /// user -> page index that fails as a protected account
    protected_from_page: Mutex<HashMap<u64, usize>>,
    /// Upcoming follower-page calls that fail with a connection error
    follower_connection_failures: AtomicU32,
    /// Upcoming batch lookups that fail with a connection error
    lookup_connection_failures: AtomicU32,
    streams: Mutex<VecDeque<StreamScript>>,
    calls: Mutex<CallLog>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    pub fn add_status(&self, status: Status) {
        lock(&self.users).insert(status.user.id, status.user.clone());
        lock(&self.statuses).insert(status.id, status);
    }

    pub fn set_reshare_count(&self, id: u64, count: u32) {
        if let Some(status) = lock(&self.statuses).get_mut(&id) {
            status.reshare_count = count;
        }
    }

    pub fn set_author_followers(&self, id: u64, followers: u32) {
        if let Some(status) = lock(&self.statuses).get_mut(&id) {
            status.user.followers_count = followers;
        }
    }

    pub fn delete_status(&self, id: u64) {
        lock(&self.statuses).remove(&id);
    }

    pub fn set_followers(&self, user: u64, followers: Vec<u64>) {
        lock(&self.followers).insert(user, followers);
    }

    pub fn set_resharers(&self, post: u64, users: Vec<User>) {
        let mut known = lock(&self.users);
        for user in &users {
            known.insert(user.id, user.clone());
        }
        lock(&self.resharers).insert(post, users);
    }

    pub fn protect_from_page(&self, user: u64, page: usize) {
        lock(&self.protected_from_page).insert(user, page);
    }

    pub fn fail_follower_pages(&self, times: u32) {
        self.follower_connection_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_status_lookups(&self, times: u32) {
        self.lookup_connection_failures.store(times, Ordering::SeqCst);
    }

    pub fn script_stream(&self, script: StreamScript) {
        lock(&self.streams).push_back(script);
    }

    pub fn calls(&self) -> MutexGuard<'_, CallLog> {
        lock(&self.calls)
    }
}

#[async_trait]
impl SocialGraphClient for ScriptedClient {
    async fn get_status(&self, id: u64) -> Result<Status, ApiError> {
        lock(&self.calls).get_status += 1;
        lock(&self.statuses)
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("status {id}")))
    }

    async fn lookup_statuses(&self, ids: &[u64]) -> Result<Vec<Status>, ApiError> {
        lock(&self.calls).lookup_statuses += 1;
        let pending = self.lookup_connection_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.lookup_connection_failures
                .store(pending - 1, Ordering::SeqCst);
            return Err(ApiError::Connection("connection timed out".into()));
        }
        let statuses = lock(&self.statuses);
        Ok(ids.iter().filter_map(|id| statuses.get(id).cloned()).collect())
    }

    async fn recent_resharers(
        &self,
        credential: Credential,
        id: u64,
        limit: u32,
    ) -> Result<Vec<User>, ApiError> {
        lock(&self.calls).recent_resharers.push(credential);
        let users = lock(&self.resharers).get(&id).cloned().unwrap_or_default();
        Ok(users.into_iter().take(limit as usize).collect())
    }

    async fn resharer_ids(&self, credential: Credential, id: u64) -> Result<Vec<u64>, ApiError> {
        lock(&self.calls).resharer_ids.push(credential);
        let users = lock(&self.resharers).get(&id).cloned().unwrap_or_default();
        Ok(users.iter().map(|u| u.id).collect())
    }

    async fn lookup_users(&self, ids: &[u64]) -> Result<Vec<User>, ApiError> {
        lock(&self.calls).lookup_users += 1;
        let users = lock(&self.users);
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn follower_ids(
        &self,
        _credential: Credential,
        user_id: u64,
        cursor: i64,
    ) -> Result<IdPage, ApiError> {
        let pending = self.follower_connection_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.follower_connection_failures
                .store(pending - 1, Ordering::SeqCst);
            return Err(ApiError::Connection("connection reset by peer".into()));
        }
        lock(&self.calls).follower_pages.push((user_id, cursor));

        let page = if cursor == FIRST_CURSOR {
            0
        } else {
            usize::try_from(cursor).unwrap()
        };
        if lock(&self.protected_from_page)
            .get(&user_id)
            .is_some_and(|&from| page >= from)
        {
            return Err(ApiError::ProtectedAccount(format!("user {user_id}")));
        }

        let all = lock(&self.followers).get(&user_id).cloned().unwrap_or_default();
        if self.page_size == 0 {
            return Ok(IdPage {
                ids: all,
                next_cursor: 0,
            });
        }
        let start = (page * self.page_size).min(all.len());
        let end = (start + self.page_size).min(all.len());
        Ok(IdPage {
            ids: all[start..end].to_vec(),
            next_cursor: if end < all.len() { page as i64 + 1 } else { 0 },
        })
    }

    async fn open_sample(&self, buffer: Arc<SampleBuffer>) -> Result<StreamHandle, ApiError> {
        lock(&self.calls).open_sample += 1;
        let script = lock(&self.streams).pop_front().unwrap_or_default();
        for post in script.posts {
            buffer.push(post);
        }
        if script.then_fail {
            buffer.report_error("stream closed by remote");
        }
        Ok(StreamHandle::idle())
    }

    async fn reauthenticate(&self) -> Result<(), ApiError> {
        lock(&self.calls).reauthenticate += 1;
        Ok(())
    }
}

// ============================================================
// Builders
// ============================================================

pub fn status(id: u64, author: u64, reshares: u32, lang: &str) -> Status {
    Status {
        id,
        text: format!("post number {id} is out now!"),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        lang: Some(lang.to_string()),
        reshare_count: reshares,
        user: User::new(author, "author", 1_000),
        entities: Entities::default(),
        reshared_status: None,
    }
}

pub fn users(ids: &[u64], followers: u32) -> Vec<User> {
    ids.iter()
        .map(|&id| User::new(id, &format!("user{id}"), followers))
        .collect()
}

/// Recovery with a negligible reconnect pause.
pub fn fast_recovery() -> RecoveryPolicy {
    RecoveryPolicy {
        reconnect_pause: Duration::from_millis(1),
        max_reconnects: 10,
    }
}

pub fn session(client: Arc<ScriptedClient>) -> Arc<Session> {
    Arc::new(Session::new(
        client,
        QuotaScheduler::new(QuotaPlan::default().with_window(Duration::from_secs(60))),
        fast_recovery(),
    ))
}

pub fn session_with_recovery(client: Arc<ScriptedClient>, recovery: RecoveryPolicy) -> Arc<Session> {
    Arc::new(Session::new(
        client,
        QuotaScheduler::new(QuotaPlan::default().with_window(Duration::from_secs(60))),
        recovery,
    ))
}

pub fn session_with_plan(client: Arc<ScriptedClient>, plan: QuotaPlan) -> Arc<Session> {
    Arc::new(Session::new(client, QuotaScheduler::new(plan), fast_recovery()))
}
