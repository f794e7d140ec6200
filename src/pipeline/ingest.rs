// Ingestion pipeline: drives the monitoring cycles.
//
// One cycle is:
// 1. Refresh every active post (one observation each, retire the quiet ones)
// 2. Look up last cycle's sample and admit the qualifying posts
// 3. Collect a fresh sample from the stream
// 4. Checkpoint the store, the pending sample and the cycle counter
// 5. Sleep out the rest of the window, then reset the reshare quota
//
// A run is a fixed number of cycles. When it ends, anything still active is
// retired so the dead partition holds every monitored post.

use std::collections::HashSet;

use anyhow::{Context, Result};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointManager, RunState};
use crate::config::MonitorSettings;
use crate::monitor::tracker::{AdmissionSummary, RefreshSummary, TweetMonitor};
use crate::social::client::MAX_LOOKUP_SIZE;
use crate::social::error::ApiError;
use crate::social::quota::Operation;
use crate::social::stream::{collect_sample, SampleOptions};
use crate::social::types::Status;

/// What happened in one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: u64,
    pub refresh: RefreshSummary,
    pub admission: AdmissionSummary,
    /// Post IDs queued for next cycle's admission
    pub sampled: usize,
}

pub struct IngestionPipeline {
    monitor: TweetMonitor,
    checkpoints: CheckpointManager,
    settings: MonitorSettings,
    /// Originals already queued when expanding reshares
    checked: HashSet<u64>,
}

impl IngestionPipeline {
    pub fn new(monitor: TweetMonitor, checkpoints: CheckpointManager, settings: MonitorSettings) -> Self {
        Self {
            monitor,
            checkpoints,
            settings,
            checked: HashSet::new(),
        }
    }

    /// Run cycles until `max_cycles` have completed, resuming from
    /// `state.progress`. On a fatal error the state as of the last completed
    /// cycle is checkpointed before the error is returned.
    pub async fn run(&mut self, state: &mut RunState) -> Result<Vec<CycleReport>> {
        let max_cycles = u64::from(self.settings.max_cycles);
        let mut reports = Vec::new();

        if state.progress > 0 {
            info!(
                completed = state.progress,
                active = state.store.active_len(),
                dead = state.store.dead_len(),
                "Resuming monitoring"
            );
        }

        while state.progress < max_cycles {
            let cycle_start = Instant::now();
            let cycle = state.progress + 1;

            let report = match self.run_cycle(state, cycle, cycle_start).await {
                Ok(report) => report,
                Err(e) => {
                    self.flush(state);
                    return Err(e).with_context(|| format!("Monitoring cycle {cycle} failed"));
                }
            };

            state.progress = cycle;
            self.checkpoints.save(state)?;
            crate::output::terminal::display_cycle(&report, max_cycles, &state.store);
            reports.push(report);

            if cycle < max_cycles {
                self.wait_for_window(cycle_start).await;
            }
        }

        let retired = state.store.retire_all();
        state.pending_sample.clear();
        self.checkpoints.save(state)?;
        info!(
            cycles = max_cycles,
            retired_at_end = retired,
            dead = state.store.dead_len(),
            "Monitoring finished"
        );
        Ok(reports)
    }

    async fn run_cycle(
        &mut self,
        state: &mut RunState,
        cycle: u64,
        cycle_start: Instant,
    ) -> Result<CycleReport, ApiError> {
        info!(cycle = cycle, active = state.store.active_len(), "Starting cycle");

        // The cycle works on a copy; `state` only changes once every fallible
        // step has succeeded, so a failed cycle resumes from the last snapshot.
        let mut store = state.store.clone();
        let refresh = self.monitor.refresh(&mut store).await?;

        let statuses = self.lookup(&state.pending_sample).await?;
        let admission = self.monitor.admit(&mut store, &statuses).await?;

        let deadline = cycle_start + self.settings.cycle_window;
        let sample = self.sample(deadline).await;

        state.store = store;
        state.pending_sample = sample;

        Ok(CycleReport {
            cycle,
            refresh,
            admission,
            sampled: state.pending_sample.len(),
        })
    }

    /// Batch-lookup the sampled IDs, 100 at a time. A rejected batch is
    /// skipped; only an exhausted reconnect budget fails the cycle.
    async fn lookup(&self, ids: &[u64]) -> Result<Vec<Status>, ApiError> {
        let session = self.monitor.session();
        let mut statuses = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_LOOKUP_SIZE) {
            match session
                .retrying("batch lookup", || session.client().lookup_statuses(chunk))
                .await
            {
                Ok(found) => statuses.extend(found),
                Err(e) if e.is_connection() => return Err(e),
                Err(e) => warn!(batch = chunk.len(), error = %e, "Batch lookup rejected, skipping"),
            }
        }
        Ok(statuses)
    }

    /// Collect a sample and reduce it to the IDs worth looking up next cycle.
    async fn sample(&mut self, deadline: Instant) -> Vec<u64> {
        let options = SampleOptions {
            target: self.settings.sample_size,
            poll_interval: self.settings.poll_interval,
            settle: self.settings.stream_settle,
            restart_on_error: self.settings.restart_on_stream_error,
            max_restarts: self.settings.max_stream_restarts,
        };

        let client = self.monitor.session().client();
        match collect_sample(client, &options, deadline).await {
            Ok(sample) => self.candidates(sample),
            Err(e) => {
                warn!(error = %e, "Stream sample failed, nothing to admit next cycle");
                Vec::new()
            }
        }
    }

    /// Drop reshares, or replace them with their originals when expanding.
    fn candidates(&mut self, sample: Vec<Status>) -> Vec<u64> {
        let mut ids = Vec::with_capacity(sample.len());
        let mut seen = HashSet::new();

        for status in sample {
            let id = match (&status.reshared_status, self.settings.expand_reshares) {
                (None, _) => status.id,
                (Some(original), true) => {
                    if !self.checked.insert(original.id) {
                        continue;
                    }
                    original.id
                }
                (Some(_), false) => continue,
            };
            if seen.insert(id) {
                ids.push(id);
            }
        }
        ids
    }

    async fn wait_for_window(&self, cycle_start: Instant) {
        let window = self.settings.cycle_window;
        let remaining = window.saturating_sub(cycle_start.elapsed());
        if !remaining.is_zero() {
            info!(wait_secs = remaining.as_secs(), "Waiting for the rate window to refresh");
            tokio::time::sleep(remaining).await;
        }
        self.monitor
            .session()
            .quota()
            .reset_operation(Operation::Resharers);
    }

    /// Best-effort checkpoint on the way out of a failed cycle.
    fn flush(&self, state: &RunState) {
        if let Err(e) = self.checkpoints.save(state) {
            error!(error = %e, "Failed to checkpoint after a fatal error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::traits::FixedClassifier;
    use crate::monitor::tracker::AdmissionRules;
    use crate::social::client::SocialGraphClient;
    use crate::social::quota::QuotaScheduler;
    use crate::social::session::{RecoveryPolicy, Session};
    use crate::social::stream::{SampleBuffer, StreamHandle};
    use crate::social::types::{Credential, IdPage, User};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;

    struct Offline;

    #[async_trait]
    impl SocialGraphClient for Offline {
        async fn get_status(&self, id: u64) -> Result<Status, ApiError> {
            Err(ApiError::NotFound(id.to_string()))
        }
        async fn lookup_statuses(&self, _ids: &[u64]) -> Result<Vec<Status>, ApiError> {
            Ok(Vec::new())
        }
        async fn recent_resharers(&self, _: Credential, _: u64, _: u32) -> Result<Vec<User>, ApiError> {
            Ok(Vec::new())
        }
        async fn resharer_ids(&self, _: Credential, _: u64) -> Result<Vec<u64>, ApiError> {
            Ok(Vec::new())
        }
        async fn lookup_users(&self, _ids: &[u64]) -> Result<Vec<User>, ApiError> {
            Ok(Vec::new())
        }
        async fn follower_ids(&self, _: Credential, _: u64, _: i64) -> Result<IdPage, ApiError> {
            Ok(IdPage::default())
        }
        async fn open_sample(&self, _buffer: Arc<SampleBuffer>) -> Result<StreamHandle, ApiError> {
            Ok(StreamHandle::idle())
        }
        async fn reauthenticate(&self) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn pipeline(expand: bool) -> IngestionPipeline {
        let session = Arc::new(Session::new(
            Arc::new(Offline),
            QuotaScheduler::default(),
            RecoveryPolicy::default(),
        ));
        let monitor = TweetMonitor::new(
            session,
            Arc::new(FixedClassifier::new("neu")),
            Arc::new(FixedClassifier::new("Other")),
            AdmissionRules::default(),
        );
        let settings = MonitorSettings {
            expand_reshares: expand,
            ..MonitorSettings::default()
        };
        IngestionPipeline::new(monitor, CheckpointManager::new("/nonexistent"), settings)
    }

    fn status(id: u64, original: Option<u64>) -> Status {
        let make = |id| Status {
            id,
            text: String::new(),
            created_at: Utc::now(),
            lang: Some("en".into()),
            reshare_count: 0,
            user: User::new(1, "u", 1),
            entities: Default::default(),
            reshared_status: None,
        };
        let mut s = make(id);
        s.reshared_status = original.map(|o| Box::new(make(o)));
        s
    }

    #[test]
    fn test_candidates_drop_reshares() {
        let mut p = pipeline(false);
        let ids = p.candidates(vec![status(1, None), status(2, Some(9)), status(1, None)]);
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_candidates_expand_reshares_once() {
        let mut p = pipeline(true);
        let first = p.candidates(vec![status(1, None), status(2, Some(9)), status(3, Some(9))]);
        assert_eq!(first, vec![1, 9]);
        // An original is only queued the first time it is seen.
        let second = p.candidates(vec![status(4, Some(9))]);
        assert!(second.is_empty());
    }
}
