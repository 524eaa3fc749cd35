//! Waiting for the application to become idle.
//!
//! The [`IdlenessMonitor`] suspends the test-control task until the
//! [`ActivityTracker`] ledger is empty. It wakes on the tracker's
//! pending-count watch channel and re-checks at least every poll interval,
//! so the wait never spins and never misses a transition to idle.
//!
//! A wait ends in one of three ways:
//!
//! - the ledger is observed empty: `Ok(())`
//! - the timeout elapses: [`WaitError::Timeout`] with a snapshot of what is
//!   still outstanding
//! - the monitor's [`CancellationToken`] fires: [`WaitError::Cancelled`]
//!
//! The monitor only ever reads the tracker.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, warn, Instrument};

use crate::tracker::{ActivityTracker, PendingOperation};

/// Default upper bound between two idle checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Diagnostic payload of a timed-out idle wait.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error(
    "App still busy after {}ms (timeout {}ms), {} pending: {}",
    .elapsed.as_millis(),
    .timeout.as_millis(),
    .pending.len(),
    describe_pending(.pending)
)]
pub struct IdleTimeout {
    /// The timeout that was exceeded.
    #[serde(rename = "timeout_ms", serialize_with = "serialize_millis")]
    pub timeout: Duration,
    /// How long the wait actually lasted.
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// Operations outstanding when the wait gave up, oldest first.
    pub pending: Vec<PendingOperation>,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

pub(crate) fn describe_pending(pending: &[PendingOperation]) -> String {
    if pending.is_empty() {
        return "none".to_string();
    }
    pending
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors returned by an idle wait.
#[derive(Error, Debug)]
pub enum WaitError {
    /// The ledger did not drain in time.
    #[error(transparent)]
    Timeout(#[from] IdleTimeout),

    /// The wait was abandoned through the monitor's cancellation token.
    #[error("Idle wait cancelled")]
    Cancelled,
}

/// Errors returned by [`IdlenessMonitor::block_until_idle`].
#[derive(Error, Debug)]
pub enum BlockingWaitError {
    #[error(transparent)]
    Wait(#[from] WaitError),

    /// The runtime for the blocking wait could not be built.
    #[error("Failed to start idle-wait runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Suspends callers until the tracked application activity drains.
#[derive(Debug, Clone)]
pub struct IdlenessMonitor {
    tracker: Arc<ActivityTracker>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl IdlenessMonitor {
    /// Creates a monitor with the default poll interval.
    pub fn new(tracker: Arc<ActivityTracker>) -> Self {
        Self {
            tracker,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the upper bound between idle checks. Zero is bumped to one
    /// millisecond.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn tracker(&self) -> &Arc<ActivityTracker> {
        &self.tracker
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// A handle that cancels every current and future wait on this monitor
    /// (and its clones).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abandons all waits. Further waits fail with [`WaitError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits until the ledger is empty, at most `timeout`. A timeout too
    /// large to represent (such as [`Duration::MAX`]) waits without limit.
    ///
    /// # Errors
    ///
    /// - [`WaitError::Timeout`] if operations are still outstanding at the
    ///   deadline, with a snapshot of them
    /// - [`WaitError::Cancelled`] if the monitor is cancelled first
    pub async fn wait_until_idle(&self, timeout: Duration) -> Result<(), WaitError> {
        let span = debug_span!("wait_until_idle", timeout_ms = timeout.as_millis() as u64);
        self.wait(timeout).instrument(span).await
    }

    async fn wait(&self, timeout: Duration) -> Result<(), WaitError> {
        let start = Instant::now();
        // `None` when the timeout reaches past what the clock can represent.
        let deadline = start.checked_add(timeout);

        // Subscribe before the first check so no transition is missed.
        let mut pending_rx = self.tracker.subscribe();
        let mut watch_open = true;
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.cancel.is_cancelled() {
                debug!("idle wait cancelled");
                return Err(WaitError::Cancelled);
            }
            if self.tracker.is_idle() {
                debug!(elapsed_ms = start.elapsed().as_millis() as u64, "app idle");
                return Ok(());
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {}
                _ = sleep_until_deadline(deadline) => {
                    if self.tracker.is_idle() {
                        return Ok(());
                    }
                    let timeout = IdleTimeout {
                        timeout,
                        elapsed: start.elapsed(),
                        pending: self.tracker.snapshot(),
                    };
                    warn!(
                        elapsed_ms = timeout.elapsed.as_millis() as u64,
                        pending = timeout.pending.len(),
                        "timed out waiting for idle: {}",
                        describe_pending(&timeout.pending)
                    );
                    return Err(WaitError::Timeout(timeout));
                }
                changed = pending_rx.changed(), if watch_open => {
                    if changed.is_err() {
                        watch_open = false;
                    }
                }
                _ = poll.tick() => {}
            }
        }
    }

    /// Blocking form of [`wait_until_idle`](Self::wait_until_idle) for a
    /// synchronous test-control thread.
    ///
    /// Builds a current-thread runtime for the duration of the wait.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async runtime.
    pub fn block_until_idle(&self, timeout: Duration) -> Result<(), BlockingWaitError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        Ok(runtime.block_on(self.wait_until_idle(timeout))?)
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
