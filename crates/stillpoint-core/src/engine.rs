//! The synchronization engine service.
//!
//! A [`SyncEngine`] owns the [`ActivityTracker`] and [`IdlenessMonitor`] for
//! one test run. Create it with [`SyncEngine::start`] when the run begins,
//! hand [`SyncEngine::tracker`] to every collaborator that starts
//! asynchronous work, and call [`SyncEngine::shutdown`] when the run ends to
//! find operations that were never untracked.
//!
//! Every action performed through the engine is recorded in a bounded
//! history for reporting.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use stillpoint_core::action::MultiFingerSwipeAction;
//! use stillpoint_core::config::EngineConfig;
//! use stillpoint_core::element::ElementFrame;
//! use stillpoint_core::engine::SyncEngine;
//! use stillpoint_core::gesture::SwipeDirection;
//! # use stillpoint_core::injector::TouchDeliverer;
//! # async fn run(deliverer: Arc<dyn TouchDeliverer>) -> Result<(), Box<dyn std::error::Error>> {
//!
//! let engine = SyncEngine::start(EngineConfig::load().with_env_overrides())?;
//! let swipe = MultiFingerSwipeAction::swipe(SwipeDirection::Up, Duration::from_millis(300), 2)?;
//! let feed = ElementFrame::new(0.0, 100.0, 390.0, 600.0);
//!
//! engine.perform(&swipe, &feed, deliverer).await?;
//! engine.shutdown()?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{error, info};

use crate::action::{ActionContext, ActionError, ActionRecord, ActionResult, GestureAction};
use crate::config::{ConfigError, EngineConfig};
use crate::element::TargetElement;
use crate::idle::{describe_pending, IdlenessMonitor};
use crate::injector::{MultiTouchInjector, TouchDeliverer};
use crate::tracker::{ActivityTracker, PendingOperation};

/// Maximum number of action records to retain in the ring buffer.
const MAX_HISTORY_SIZE: usize = 1000;

/// Errors returned by the [`SyncEngine`].
#[derive(Error, Debug)]
pub enum EngineError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The performed action failed.
    #[error(transparent)]
    Action(#[from] ActionError),

    /// Operations were still tracked when the engine shut down.
    #[error("{} operation(s) still tracked at shutdown: {}", .0.len(), describe_pending(.0))]
    LeakedOperations(Vec<PendingOperation>),

    /// The engine was already shut down.
    #[error("Sync engine already shut down")]
    AlreadyShutDown,
}

/// Owner of the tracker and monitor for one test run.
pub struct SyncEngine {
    config: EngineConfig,
    tracker: Arc<ActivityTracker>,
    monitor: IdlenessMonitor,
    history: RwLock<VecDeque<ActionRecord>>,
    shut_down: AtomicBool,
}

impl SyncEngine {
    /// Validates `config` and creates an idle engine.
    pub fn start(config: EngineConfig) -> Result<Arc<Self>, EngineError> {
        config.validate()?;
        let tracker = Arc::new(ActivityTracker::new());
        let monitor = IdlenessMonitor::new(Arc::clone(&tracker)).with_poll_interval(config.idle_poll_interval());
        info!(
            idle_timeout_ms = config.idle_timeout_ms,
            poll_ms = config.idle_poll_interval_ms,
            "sync engine started"
        );
        Ok(Arc::new(Self {
            config,
            tracker,
            monitor,
            history: RwLock::new(VecDeque::with_capacity(MAX_HISTORY_SIZE)),
            shut_down: AtomicBool::new(false),
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The tracker collaborators register their work with.
    pub fn tracker(&self) -> &Arc<ActivityTracker> {
        &self.tracker
    }

    pub fn monitor(&self) -> &IdlenessMonitor {
        &self.monitor
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Builds an [`ActionContext`] delivering touches through `deliverer`.
    pub fn context(&self, deliverer: Arc<dyn TouchDeliverer>) -> ActionContext {
        let injector = MultiTouchInjector::new(Arc::clone(&self.tracker), deliverer);
        ActionContext::new(injector, self.monitor.clone(), self.config.idle_timeout())
            .with_path_config(self.config.path.clone())
    }

    /// Performs `action` on `element` and records the outcome.
    ///
    /// # Errors
    ///
    /// - [`EngineError::AlreadyShutDown`] after [`shutdown`](Self::shutdown);
    ///   nothing is injected or recorded
    /// - [`EngineError::Action`] when the action fails
    pub async fn perform(
        &self,
        action: &dyn GestureAction,
        element: &dyn TargetElement,
        deliverer: Arc<dyn TouchDeliverer>,
    ) -> Result<(), EngineError> {
        if self.is_shut_down() {
            return Err(EngineError::AlreadyShutDown);
        }

        let ctx = self.context(deliverer);
        let start = Instant::now();
        let result = action.perform(element, &ctx).await;
        let elapsed = start.elapsed();

        let record = ActionRecord::new(
            action.name(),
            element.description(),
            ActionResult::from(&result),
            elapsed,
        );
        info!(
            action = %record.action,
            success = record.result.is_success(),
            elapsed_ms = record.duration_ms,
            "action complete"
        );
        self.record(record).await;

        result.map_err(EngineError::from)
    }

    async fn record(&self, record: ActionRecord) {
        let mut history = self.history.write().await;
        if history.len() >= MAX_HISTORY_SIZE {
            history.pop_front();
        }
        history.push_back(record);
    }

    /// All recorded actions, oldest first.
    pub async fn history(&self) -> Vec<ActionRecord> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Ends the run: cancels pending idle waits and checks the ledger.
    ///
    /// # Errors
    ///
    /// - [`EngineError::LeakedOperations`] listing operations that were
    ///   never untracked
    /// - [`EngineError::AlreadyShutDown`] on a second call
    pub fn shutdown(&self) -> Result<(), EngineError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyShutDown);
        }
        self.monitor.cancel();

        let leaked = self.tracker.snapshot();
        if !leaked.is_empty() {
            error!(
                leaked = leaked.len(),
                "operations still tracked at shutdown: {}",
                describe_pending(&leaked)
            );
            return Err(EngineError::LeakedOperations(leaked));
        }
        info!("sync engine shut down");
        Ok(())
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("tracker", &self.tracker)
            .field("history", &"<RwLock<VecDeque<ActionRecord>>>")
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
