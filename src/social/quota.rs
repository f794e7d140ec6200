// Per-window quota scheduling across credential pools.
//
// The remote service enforces call ceilings per 15-minute window, per
// operation, per credential. We mirror those ceilings locally so we never
// trigger a remote rejection: every quota-consuming call first asks the
// scheduler for a pool, and records exactly one call against that pool once
// the request succeeds. Failed requests are never recorded.
//
// Pools are walked in priority order. For reshare enumeration the last two
// pools are "reduced": they use the coarser ID-only call, which has its own
// allowance, once the full-object pools are spent. When every pool is spent
// the caller waits out the rest of the window.
//
// All state lives behind one Mutex, but it is only ever touched from the
// main loop; the lock is never held across an await.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use super::types::Credential;

/// Length of the remote service's rate-limit window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Remote operations with their own quota pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    /// Reshare enumeration (full objects or ID-only)
    Resharers,
    /// Follower-ID enumeration
    FollowerIds,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Resharers => "resharers",
            Operation::FollowerIds => "follower_ids",
        }
    }
}

/// One credential pool's allowance within a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSpec {
    pub credential: Credential,
    /// Use the coarser ID-only call for this pool
    pub reduced: bool,
    /// Calls allowed per window
    pub ceiling: u32,
}

impl PoolSpec {
    pub fn full(credential: Credential, ceiling: u32) -> Self {
        Self {
            credential,
            reduced: false,
            ceiling,
        }
    }

    pub fn reduced(credential: Credential, ceiling: u32) -> Self {
        Self {
            credential,
            reduced: true,
            ceiling,
        }
    }
}

/// The full set of pools and the window they are counted over.
#[derive(Debug, Clone)]
pub struct QuotaPlan {
    pub window: Duration,
    pub resharers: Vec<PoolSpec>,
    pub follower_ids: Vec<PoolSpec>,
}

impl Default for QuotaPlan {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            resharers: vec![
                PoolSpec::full(Credential::User, 15),
                PoolSpec::full(Credential::App, 60),
                PoolSpec::reduced(Credential::User, 15),
                PoolSpec::reduced(Credential::App, 60),
            ],
            follower_ids: vec![
                PoolSpec::full(Credential::User, 15),
                PoolSpec::full(Credential::App, 15),
            ],
        }
    }
}

impl QuotaPlan {
    /// Same pools, different window length.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    fn pools(&self, operation: Operation) -> &[PoolSpec] {
        match operation {
            Operation::Resharers => &self.resharers,
            Operation::FollowerIds => &self.follower_ids,
        }
    }
}

/// Which pool to charge the next call to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub credential: Credential,
    pub reduced: bool,
    pool: usize,
}

struct PoolCounter {
    spec: PoolSpec,
    used: u32,
}

struct OperationState {
    pools: Vec<PoolCounter>,
    window_start: Instant,
}

impl OperationState {
    fn new(specs: &[PoolSpec]) -> Self {
        Self {
            pools: specs
                .iter()
                .cloned()
                .map(|spec| PoolCounter { spec, used: 0 })
                .collect(),
            window_start: Instant::now(),
        }
    }

    fn reset(&mut self) {
        for pool in &mut self.pools {
            pool.used = 0;
        }
        self.window_start = Instant::now();
    }
}

/// Counters for every operation, plus the window they are measured in.
pub struct SchedulerState {
    window: Duration,
    operations: BTreeMap<Operation, OperationState>,
}

impl SchedulerState {
    fn new(plan: &QuotaPlan) -> Self {
        let mut operations = BTreeMap::new();
        for operation in [Operation::Resharers, Operation::FollowerIds] {
            operations.insert(operation, OperationState::new(plan.pools(operation)));
        }
        Self {
            window: plan.window,
            operations,
        }
    }

    fn operation(&mut self, operation: Operation) -> &mut OperationState {
        let window = self.window;
        let state = self
            .operations
            .entry(operation)
            .or_insert_with(|| OperationState::new(&[]));
        // Windows roll over lazily: the first look after expiry zeroes them.
        if state.window_start.elapsed() >= window {
            state.reset();
        }
        state
    }
}

/// Chooses the credential pool for every quota-consuming call.
pub struct QuotaScheduler {
    state: Mutex<SchedulerState>,
}

impl QuotaScheduler {
    pub fn new(plan: QuotaPlan) -> Self {
        Self {
            state: Mutex::new(SchedulerState::new(&plan)),
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn window(&self) -> Duration {
        self.state().window
    }

    /// Return the first pool still under its ceiling, or None when every
    /// pool for this operation is spent for the current window.
    pub fn select(&self, operation: Operation) -> Option<Selection> {
        let mut state = self.state();
        let op = state.operation(operation);
        op.pools
            .iter()
            .enumerate()
            .find(|(_, pool)| pool.used < pool.spec.ceiling)
            .map(|(index, pool)| Selection {
                credential: pool.spec.credential,
                reduced: pool.spec.reduced,
                pool: index,
            })
    }

    /// Select a pool, waiting out the window first if every pool is spent.
    pub async fn acquire(&self, operation: Operation) -> Selection {
        loop {
            if let Some(selection) = self.select(operation) {
                return selection;
            }
            self.await_window_reset(operation).await;
        }
    }

    /// Charge one successful call to the selected pool.
    pub fn record(&self, operation: Operation, selection: Selection) {
        let mut state = self.state();
        let op = state.operation(operation);
        if let Some(pool) = op.pools.get_mut(selection.pool) {
            pool.used += 1;
        }
    }

    /// Time left before this operation's window rolls over.
    pub fn time_until_reset(&self, operation: Operation) -> Duration {
        let mut state = self.state();
        let window = state.window;
        let op = state.operation(operation);
        window.saturating_sub(op.window_start.elapsed())
    }

    /// Sleep for the rest of the window, then zero this operation's counters.
    pub async fn await_window_reset(&self, operation: Operation) {
        let wait = self.time_until_reset(operation);
        info!(
            operation = operation.as_str(),
            wait_secs = wait.as_secs(),
            "Quota exhausted, waiting for the window to reset"
        );
        tokio::time::sleep(wait).await;
        self.reset_operation(operation);
    }

    /// Zero one operation's counters and restart its window.
    pub fn reset_operation(&self, operation: Operation) {
        let mut state = self.state();
        if let Some(op) = state.operations.get_mut(&operation) {
            op.reset();
        }
    }

    /// Zero every counter (used after a reconnect).
    pub fn reset_all(&self) {
        let mut state = self.state();
        for op in state.operations.values_mut() {
            op.reset();
        }
    }

    /// Calls charged to each pool of an operation, in priority order.
    pub fn usage(&self, operation: Operation) -> Vec<u32> {
        let mut state = self.state();
        state
            .operation(operation)
            .pools
            .iter()
            .map(|pool| pool.used)
            .collect()
    }

    /// Total calls allowed per window across all of an operation's pools.
    pub fn budget(&self, operation: Operation) -> u32 {
        let mut state = self.state();
        state
            .operation(operation)
            .pools
            .iter()
            .map(|pool| pool.spec.ceiling)
            .sum()
    }
}

impl Default for QuotaScheduler {
    fn default() -> Self {
        Self::new(QuotaPlan::default())
    }
}
