// Recent-resharer sampling.
//
// The peer of follower fetching for reshare enumeration. Each refresh only
// needs the users behind the newest reshares, so this asks for a bounded,
// fixed-size list rather than walking a full graph. Once the full-object
// pools are spent the scheduler hands out a reduced pool, and we switch to
// ID-only enumeration followed by a user lookup.

use tracing::{debug, warn};

use super::client::{MAX_LOOKUP_SIZE, MAX_RECENT_RESHARES};
use super::error::ApiError;
use super::quota::Operation;
use super::session::Session;
use super::types::User;

/// Sample up to `limit` recent resharers of a post.
///
/// A negative or zero limit makes no remote call. Definite failures (deleted
/// post, protected resharers) yield an empty sample; connection failures
/// reconnect and retry. Only an exhausted reconnect budget is returned as an
/// error.
pub async fn sample_resharers(session: &Session, post_id: u64, limit: i64) -> Result<Vec<User>, ApiError> {
    if limit <= 0 {
        return Ok(Vec::new());
    }
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    let quota = session.quota();

    let result = session
        .retrying("resharer sample", || async move {
            let selection = quota.acquire(Operation::Resharers).await;
            let client = session.client();
            if selection.reduced {
                let ids = client.resharer_ids(selection.credential, post_id).await?;
                quota.record(Operation::Resharers, selection);
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                let batch = &ids[..ids.len().min(MAX_LOOKUP_SIZE)];
                client.lookup_users(batch).await
            } else {
                let users = client
                    .recent_resharers(selection.credential, post_id, MAX_RECENT_RESHARES)
                    .await?;
                quota.record(Operation::Resharers, selection);
                Ok(users)
            }
        })
        .await;

    match result {
        Ok(mut users) => {
            users.truncate(limit);
            debug!(post_id = post_id, sampled = users.len(), "Sampled resharers");
            Ok(users)
        }
        Err(e) if e.is_connection() => Err(e),
        Err(e) => {
            warn!(post_id = post_id, error = %e, "Resharer sample failed, continuing with none");
            Ok(Vec::new())
        }
    }
}
