// Follower-ID fetching with pagination.
//
// Used by both post-monitoring phases: the diffusion builder walks follower
// lists generation by generation, and the cluster-graph export dumps the
// author's and every resharer's followers. Both run under the same quota
// pools, so every page goes through the scheduler.

use tracing::{debug, info, warn};

use super::error::ApiError;
use super::quota::Operation;
use super::session::Session;
use super::types::{FIRST_CURSOR, LAST_CURSOR};

/// Fetch a user's follower IDs, page by page.
///
/// The number of pages per fetch is capped at the follower-ID budget for one
/// window (the sum of the pool ceilings), which bounds a fetch to the first
/// ~150,000 followers with the default plan.
///
/// A protected account (or any other definite rejection) returns whatever
/// was gathered so far. Connection failures reconnect and retry the same
/// page; the failed attempt is not charged to the budget or the quota.
pub async fn fetch_followers(session: &Session, user_id: u64) -> Result<Vec<u64>, ApiError> {
    let quota = session.quota();
    let budget = quota.budget(Operation::FollowerIds);
    let mut followers = Vec::new();
    let mut cursor = FIRST_CURSOR;
    let mut calls = 0u32;

    while calls < budget {
        let page = session
            .retrying("follower page", || async move {
                let selection = quota.acquire(Operation::FollowerIds).await;
                let page = session
                    .client()
                    .follower_ids(selection.credential, user_id, cursor)
                    .await?;
                quota.record(Operation::FollowerIds, selection);
                Ok(page)
            })
            .await;

        let page = match page {
            Ok(page) => page,
            Err(e) if e.is_connection() => return Err(e),
            Err(e) => {
                warn!(
                    user_id = user_id,
                    gathered = followers.len(),
                    error = %e,
                    "Follower listing unavailable (protected account?), keeping partial list"
                );
                return Ok(followers);
            }
        };

        calls += 1;
        debug!(
            user_id = user_id,
            page_size = page.ids.len(),
            total = followers.len() + page.ids.len(),
            "Fetched page of followers"
        );
        followers.extend(page.ids);
        cursor = page.next_cursor;

        if cursor == LAST_CURSOR {
            break;
        }
    }

    info!(user_id = user_id, count = followers.len(), "Collected followers");

    Ok(followers)
}
