// Sample-stream collection.
//
// The listener runs as a background task and only ever appends to its own
// SampleBuffer. The main loop polls the buffer's "limit hit" and "error"
// flags once per poll interval, stops the listener when the target count is
// reached, and then drains the buffer. A listener error can be recovered by
// starting a fresh listener on the same buffer, so posts collected before
// the failure are kept.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use super::client::SocialGraphClient;
use super::error::ApiError;
use super::types::Status;

/// Append-only buffer shared between the listener task and the main loop.
pub struct SampleBuffer {
    posts: Mutex<Vec<Status>>,
    /// Stop accepting posts after this many (None = uncapped)
    limit: Option<usize>,
    received: AtomicUsize,
    failed: AtomicBool,
    failure: Mutex<Option<String>>,
}

impl SampleBuffer {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            posts: Mutex::new(Vec::new()),
            limit,
            received: AtomicUsize::new(0),
            failed: AtomicBool::new(false),
            failure: Mutex::new(None),
        }
    }

    /// Record a post delivered by the listener. Posts past the limit are dropped.
    pub fn push(&self, status: Status) {
        let seen = self.received.fetch_add(1, Ordering::SeqCst) + 1;
        if self.limit.map_or(true, |limit| seen <= limit) {
            lock(&self.posts).push(status);
        }
    }

    /// Whether the listener has delivered the target number of posts.
    pub fn limit_hit(&self) -> bool {
        match self.limit {
            Some(limit) => self.received.load(Ordering::SeqCst) >= limit,
            None => false,
        }
    }

    /// Called by the listener when the stream fails.
    pub fn report_error(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
        self.failed.store(true, Ordering::SeqCst);
    }

    /// Take the pending error, clearing the flag.
    pub fn take_error(&self) -> Option<String> {
        if !self.failed.swap(false, Ordering::SeqCst) {
            return None;
        }
        lock(&self.failure).take()
    }

    pub fn len(&self) -> usize {
        lock(&self.posts).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return everything buffered so far.
    pub fn drain(&self) -> Vec<Status> {
        std::mem::take(&mut *lock(&self.posts))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a running listener. Dropping it leaves the task running;
/// call `stop` to shut it down.
pub struct StreamHandle {
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Wrap a spawned listener task.
    pub fn spawn(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// A handle with no background task (the listener already delivered
    /// everything synchronously).
    pub fn idle() -> Self {
        Self { task: None }
    }

    pub fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Knobs for one sample collection.
#[derive(Debug, Clone)]
pub struct SampleOptions {
    /// Target number of posts; None runs until the deadline
    pub target: Option<usize>,
    /// How often the main loop checks the buffer flags
    pub poll_interval: Duration,
    /// Pause after shutting the listener down
    pub settle: Duration,
    /// Replace a failed listener instead of giving up
    pub restart_on_error: bool,
    /// Give up after this many listener restarts
    pub max_restarts: u32,
}

/// Run the sample listener until it has buffered the target number of posts.
///
/// Uncapped collections stop at `deadline`. Listener failures are recovered
/// by starting a fresh listener on the same buffer when `restart_on_error`
/// is set; otherwise they are returned as `ApiError::Stream`.
pub async fn collect_sample(
    client: &dyn SocialGraphClient,
    options: &SampleOptions,
    deadline: Instant,
) -> Result<Vec<Status>, ApiError> {
    let buffer = std::sync::Arc::new(SampleBuffer::new(options.target));
    let mut restarts = 0u32;
    let mut handle = open_listener(client, &buffer, options, &mut restarts).await?;

    loop {
        if buffer.limit_hit() {
            break;
        }
        if options.target.is_none() && Instant::now() >= deadline {
            break;
        }

        if let Some(message) = buffer.take_error() {
            handle.stop();
            if !options.restart_on_error {
                return Err(ApiError::Stream(message));
            }
            warn!(
                error = %message,
                buffered = buffer.len(),
                "Sample stream failed, starting a fresh listener"
            );
            restarts += 1;
            if restarts > options.max_restarts {
                return Err(ApiError::Stream(message));
            }
            handle = open_listener(client, &buffer, options, &mut restarts).await?;
            continue;
        }

        tokio::time::sleep(options.poll_interval).await;
    }

    handle.stop();
    tokio::time::sleep(options.settle).await;

    let sample = buffer.drain();
    info!(count = sample.len(), "Finished streaming");
    Ok(sample)
}

async fn open_listener(
    client: &dyn SocialGraphClient,
    buffer: &std::sync::Arc<SampleBuffer>,
    options: &SampleOptions,
    restarts: &mut u32,
) -> Result<StreamHandle, ApiError> {
    loop {
        match client.open_sample(buffer.clone()).await {
            Ok(handle) => return Ok(handle),
            Err(e) if options.restart_on_error && *restarts < options.max_restarts => {
                *restarts += 1;
                warn!(error = %e, attempt = *restarts, "Could not open sample stream, retrying");
                tokio::time::sleep(options.poll_interval).await;
            }
            Err(e) => return Err(e),
        }
    }
}
