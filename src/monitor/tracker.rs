// TweetMonitor: the per-cycle state transitions.
//
// admit() turns looked-up statuses into active posts, refresh() takes one
// observation of every active post and retires the ones that went quiet.
// Every remote call goes through the Session, so connection failures are
// retried via a reconnect; only an exhausted reconnect budget reaches the
// caller.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::post::{reshare_likelihood, MonitoredPost};
use super::store::{MonitorStore, Transition};
use crate::classify::traits::Classifier;
use crate::config::AdmissionPolicy;
use crate::social::error::ApiError;
use crate::social::resharers::sample_resharers;
use crate::social::session::Session;
use crate::social::types::Status;

/// Which posts qualify for monitoring.
#[derive(Debug, Clone)]
pub struct AdmissionRules {
    pub min_reshares: u32,
    pub policy: AdmissionPolicy,
}

impl Default for AdmissionRules {
    fn default() -> Self {
        Self {
            min_reshares: 2,
            policy: AdmissionPolicy::Capacity(150),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub observed: usize,
    pub retired: usize,
    /// Posts that disappeared remotely and were dropped
    pub vanished: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionSummary {
    pub admitted: usize,
    pub not_english: usize,
    pub below_threshold: usize,
    pub already_tracked: usize,
    pub over_capacity: usize,
}

pub struct TweetMonitor {
    session: Arc<Session>,
    sentiment: Arc<dyn Classifier>,
    topic: Arc<dyn Classifier>,
    rules: AdmissionRules,
}

impl TweetMonitor {
    pub fn new(
        session: Arc<Session>,
        sentiment: Arc<dyn Classifier>,
        topic: Arc<dyn Classifier>,
        rules: AdmissionRules,
    ) -> Self {
        Self {
            session,
            sentiment,
            topic,
            rules,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Admit every qualifying status, taking its first observation.
    pub async fn admit(
        &self,
        store: &mut MonitorStore,
        statuses: &[Status],
    ) -> Result<AdmissionSummary, ApiError> {
        let mut summary = AdmissionSummary::default();

        for status in statuses {
            if !status.is_english() {
                summary.not_english += 1;
                continue;
            }
            if status.reshare_count < self.rules.min_reshares {
                summary.below_threshold += 1;
                continue;
            }
            if store.is_tracked(status.id) {
                summary.already_tracked += 1;
                continue;
            }
            if !self.rules.policy.has_room(store.active_len()) {
                summary.over_capacity += 1;
                continue;
            }

            let mut post = MonitoredPost::admit(
                status,
                self.sentiment.classify(&status.text),
                self.topic.classify(&status.text),
            );

            let count = status.reshare_count;
            if count == 0 {
                post.add_observation(0, 0.0);
            } else {
                let sampled = sample_resharers(&self.session, status.id, i64::from(count)).await?;
                let likelihood = reshare_likelihood(count, post.author_followers, &sampled);
                post.add_resharers(sampled);
                post.add_observation(count, likelihood);
            }

            debug!(
                post_id = post.id,
                reshares = count,
                topic = post.topic.as_str(),
                "Admitted post"
            );
            if store.admit(post) {
                summary.admitted += 1;
            }
        }

        info!(
            admitted = summary.admitted,
            active = store.active_len(),
            over_capacity = summary.over_capacity,
            "Admission complete"
        );
        Ok(summary)
    }

    /// Take one observation of every active post.
    ///
    /// Posts whose lookup fails with anything but a connection error are
    /// dropped without further action.
    pub async fn refresh(&self, store: &mut MonitorStore) -> Result<RefreshSummary, ApiError> {
        let mut summary = RefreshSummary::default();
        let session = &self.session;

        for id in store.active_ids() {
            let status = session
                .retrying("status refresh", || session.client().get_status(id))
                .await;

            let status = match status {
                Ok(status) => status,
                Err(e) if e.is_connection() => return Err(e),
                Err(e) => {
                    warn!(post_id = id, error = %e, "Post no longer available, dropping");
                    store.forget(id);
                    summary.vanished += 1;
                    continue;
                }
            };

            let Some(post) = store.active_post(id) else {
                continue;
            };
            let new_count = status.reshare_count;
            let new_reshares = i64::from(new_count) - i64::from(post.last_reshare_count());

            // The author's follower count is taken from the fresh lookup.
            let sampled = sample_resharers(session, id, new_reshares).await?;
            let likelihood = reshare_likelihood(new_count, status.user.followers_count, &sampled);

            match store.record_observation(id, new_count, likelihood, sampled) {
                Some(Transition::Retired) => summary.retired += 1,
                Some(Transition::StillActive) => summary.observed += 1,
                None => {}
            }
        }

        info!(
            observed = summary.observed,
            retired = summary.retired,
            vanished = summary.vanished,
            "Refresh complete"
        );
        Ok(summary)
    }
}
