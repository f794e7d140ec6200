// Session: the client, its quota scheduler, and the reconnect path.
//
// Every quota-consuming component receives a &Session. Keeping the scheduler
// state here (instead of in globals) means there is exactly one writer: the
// main loop that owns the Session.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::client::SocialGraphClient;
use super::error::ApiError;
use super::quota::QuotaScheduler;

/// How the session recovers from connection failures.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    /// Sleep after re-authenticating, letting the remote window clear
    pub reconnect_pause: Duration,
    /// Consecutive reconnects allowed for one step before giving up
    pub max_reconnects: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            reconnect_pause: super::quota::DEFAULT_WINDOW,
            max_reconnects: 10,
        }
    }
}

pub struct Session {
    client: Arc<dyn SocialGraphClient>,
    quota: QuotaScheduler,
    recovery: RecoveryPolicy,
}

impl Session {
    pub fn new(client: Arc<dyn SocialGraphClient>, quota: QuotaScheduler, recovery: RecoveryPolicy) -> Self {
        Self {
            client,
            quota,
            recovery,
        }
    }

    pub fn client(&self) -> &dyn SocialGraphClient {
        self.client.as_ref()
    }

    pub fn quota(&self) -> &QuotaScheduler {
        &self.quota
    }

    /// Re-authenticate both credential pools, zero every quota counter, and
    /// sleep out the reconnect pause.
    ///
    /// A failed re-authentication is logged, not returned: the retried step
    /// will surface the problem again if it persists.
    pub async fn reconnect(&self) {
        if let Err(e) = self.client.reauthenticate().await {
            warn!(error = %e, "Re-authentication failed during reconnect");
        }
        self.quota.reset_all();
        info!(
            pause_secs = self.recovery.reconnect_pause.as_secs(),
            "Sleeping because of reconnection"
        );
        tokio::time::sleep(self.recovery.reconnect_pause).await;
    }

    /// Run a remote step, reconnecting and retrying on connection failures.
    ///
    /// Any other failure is returned immediately. After `max_reconnects`
    /// consecutive connection failures the last error is returned.
    pub async fn retrying<T, F, Fut>(&self, step: &str, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut reconnects = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_connection() && reconnects < self.recovery.max_reconnects => {
                    reconnects += 1;
                    warn!(
                        step = step,
                        error = %e,
                        attempt = reconnects,
                        max = self.recovery.max_reconnects,
                        "Connection error, reconnecting"
                    );
                    self.reconnect().await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
