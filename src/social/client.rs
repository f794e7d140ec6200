// SocialGraphClient: the capability surface the core depends on.
//
// The monitor, follower fetcher, and diffusion builder never talk HTTP
// directly. They call through this trait, which keeps the scheduling and
// recovery logic testable against a scripted in-memory client. The default
// implementation is HttpSocialClient in `social::http`.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::ApiError;
use super::stream::{SampleBuffer, StreamHandle};
use super::types::{Credential, IdPage, Status, User};

/// Maximum number of IDs accepted by one batch lookup.
pub const MAX_LOOKUP_SIZE: usize = 100;

/// Maximum number of recent reshares returned by one enumeration call.
pub const MAX_RECENT_RESHARES: u32 = 100;

/// Remote operations consumed by the core. Rate limits are mirrored locally
/// by the QuotaScheduler; implementations do not throttle.
#[async_trait]
pub trait SocialGraphClient: Send + Sync {
    /// Fetch one post's current state.
    async fn get_status(&self, id: u64) -> Result<Status, ApiError>;

    /// Fetch up to `MAX_LOOKUP_SIZE` posts at once. Missing posts are omitted.
    async fn lookup_statuses(&self, ids: &[u64]) -> Result<Vec<Status>, ApiError>;

    /// Users behind the most recent reshares of a post, newest first.
    async fn recent_resharers(
        &self,
        credential: Credential,
        id: u64,
        limit: u32,
    ) -> Result<Vec<User>, ApiError>;

    /// The coarse, ID-only reshare enumeration.
    async fn resharer_ids(&self, credential: Credential, id: u64) -> Result<Vec<u64>, ApiError>;

    /// Hydrate up to `MAX_LOOKUP_SIZE` user IDs.
    async fn lookup_users(&self, ids: &[u64]) -> Result<Vec<User>, ApiError>;

    /// One page of a user's follower IDs.
    async fn follower_ids(
        &self,
        credential: Credential,
        user_id: u64,
        cursor: i64,
    ) -> Result<IdPage, ApiError>;

    /// Start a sample listener that appends into `buffer`.
    async fn open_sample(&self, buffer: Arc<SampleBuffer>) -> Result<StreamHandle, ApiError>;

    /// Re-establish both credential pools.
    async fn reauthenticate(&self) -> Result<(), ApiError>;
}
