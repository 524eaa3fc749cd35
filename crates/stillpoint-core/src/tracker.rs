//! Ledger of outstanding asynchronous app activity.
//!
//! This module provides the [`ActivityTracker`], the single source of truth
//! for "is the application busy?". Every collaborator that starts
//! asynchronous work (network layer, animation layer, dispatch queues, the
//! touch injector) registers it with [`ActivityTracker::track`] and releases
//! it with [`ActivityTracker::untrack`]. The application is idle exactly when
//! the ledger is empty.
//!
//! The tracker is shared between application threads, which call the
//! synchronous track/untrack methods, and the test-control task, which reads
//! [`ActivityTracker::is_idle`] or subscribes to pending-count changes. All
//! ledger access goes through one mutex, and the pending-count watch channel
//! is updated while that mutex is held.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use stillpoint_core::tracker::{ActivityCategory, ActivityTracker};
//!
//! let tracker = Arc::new(ActivityTracker::new());
//!
//! let request = tracker.track_labeled(ActivityCategory::Network, "GET /profile");
//! assert!(!tracker.is_idle());
//!
//! tracker.untrack(request).expect("tracked above");
//! assert!(tracker.is_idle());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, trace};
use uuid::Uuid;

/// Errors reported by the [`ActivityTracker`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// The identifier is not in the ledger: it was already untracked, or it
    /// was never tracked by this tracker.
    #[error("Operation {id} is not tracked (double untrack or never tracked)")]
    UntrackedOperation {
        /// The offending identifier.
        id: OperationId,
    },
}

/// The kind of asynchronous work a tracked operation represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
    /// An in-flight network request.
    Network,
    /// A running animation.
    Animation,
    /// Work dispatched to a queue or executor that has not finished yet.
    DispatchedWork,
    /// A synthetic touch that has begun but not ended or been cancelled.
    Touch,
}

impl ActivityCategory {
    /// Returns a short, static name suitable for logs and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ActivityCategory::Network => "network",
            ActivityCategory::Animation => "animation",
            ActivityCategory::DispatchedWork => "dispatched_work",
            ActivityCategory::Touch => "touch",
        }
    }
}

impl fmt::Display for ActivityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque token identifying one tracked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An outstanding operation as stored in the ledger.
#[derive(Debug, Clone)]
pub struct TrackedOperation {
    /// Identifier handed out by [`ActivityTracker::track`].
    pub id: OperationId,
    /// What kind of work this is.
    pub category: ActivityCategory,
    /// Optional free-form description (e.g. a request URL).
    pub label: Option<String>,
    /// When the operation was tracked.
    pub created_at: Instant,
}

/// Diagnostic view of one outstanding operation.
///
/// Returned by [`ActivityTracker::snapshot`] and embedded in idle-wait
/// timeout errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingOperation {
    /// Identifier of the outstanding operation.
    pub id: OperationId,
    /// What kind of work is outstanding.
    pub category: ActivityCategory,
    /// Optional description supplied when the operation was tracked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// How long the operation has been outstanding.
    #[serde(rename = "age_ms", serialize_with = "serialize_millis")]
    pub age: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl fmt::Display for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(
                f,
                "{} '{}' outstanding for {}ms",
                self.category,
                label,
                self.age.as_millis()
            ),
            None => write!(
                f,
                "{} outstanding for {}ms",
                self.category,
                self.age.as_millis()
            ),
        }
    }
}

/// Process-wide ledger of outstanding asynchronous operations.
///
/// Create one per test run and share it as `Arc<ActivityTracker>`; see
/// [`SyncEngine`](crate::engine::SyncEngine) for the owning service.
pub struct ActivityTracker {
    ledger: Mutex<HashMap<OperationId, TrackedOperation>>,
    pending_tx: watch::Sender<usize>,
}

impl ActivityTracker {
    /// Creates an empty (idle) tracker.
    pub fn new() -> Self {
        let (pending_tx, _) = watch::channel(0);
        Self {
            ledger: Mutex::new(HashMap::new()),
            pending_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<OperationId, TrackedOperation>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new outstanding operation and returns its identifier.
    pub fn track(&self, category: ActivityCategory) -> OperationId {
        self.insert(category, None)
    }

    /// Like [`track`](Self::track), attaching a description that shows up in
    /// snapshots and timeout errors.
    pub fn track_labeled(&self, category: ActivityCategory, label: impl Into<String>) -> OperationId {
        self.insert(category, Some(label.into()))
    }

    fn insert(&self, category: ActivityCategory, label: Option<String>) -> OperationId {
        let id = OperationId::new();
        let op = TrackedOperation {
            id,
            category,
            label,
            created_at: Instant::now(),
        };
        let mut ledger = self.lock();
        ledger.insert(id, op);
        self.pending_tx.send_replace(ledger.len());
        trace!(%id, %category, pending = ledger.len(), "tracked");
        id
    }

    /// Tracks an operation for as long as the returned guard is alive.
    pub fn track_scoped(self: &Arc<Self>, category: ActivityCategory) -> TrackingGuard {
        self.guard(self.track(category))
    }

    /// Labeled form of [`track_scoped`](Self::track_scoped).
    pub fn track_labeled_scoped(
        self: &Arc<Self>,
        category: ActivityCategory,
        label: impl Into<String>,
    ) -> TrackingGuard {
        self.guard(self.track_labeled(category, label))
    }

    fn guard(self: &Arc<Self>, id: OperationId) -> TrackingGuard {
        TrackingGuard {
            tracker: Arc::clone(self),
            id,
            armed: true,
        }
    }

    /// Removes an operation from the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::UntrackedOperation`] when `id` is not in the
    /// ledger. This always indicates a tracking bug in the caller, so it is
    /// logged at `error` level as well as returned.
    pub fn untrack(&self, id: OperationId) -> Result<TrackedOperation, TrackerError> {
        let mut ledger = self.lock();
        match ledger.remove(&id) {
            Some(op) => {
                self.pending_tx.send_replace(ledger.len());
                trace!(%id, category = %op.category, pending = ledger.len(), "untracked");
                Ok(op)
            }
            None => {
                drop(ledger);
                error!(%id, "untrack of an operation that is not tracked");
                Err(TrackerError::UntrackedOperation { id })
            }
        }
    }

    /// Returns `true` iff no operation is outstanding.
    pub fn is_idle(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of outstanding operations.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Lists outstanding operations with their age, oldest first.
    pub fn snapshot(&self) -> Vec<PendingOperation> {
        let now = Instant::now();
        let ledger = self.lock();
        let mut ops: Vec<&TrackedOperation> = ledger.values().collect();
        ops.sort_by_key(|op| op.created_at);
        ops.into_iter()
            .map(|op| PendingOperation {
                id: op.id,
                category: op.category,
                label: op.label.clone(),
                age: now.saturating_duration_since(op.created_at),
            })
            .collect()
    }

    /// Subscribes to pending-count changes.
    ///
    /// The receiver observes the count after every track/untrack; a value of
    /// `0` means the ledger just became empty.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.pending_tx.subscribe()
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ActivityTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityTracker")
            .field("pending", &self.pending_count())
            .field("pending_tx", &"<watch::Sender<usize>>")
            .finish()
    }
}

/// Keeps an operation tracked until dropped or [`finish`](Self::finish)ed.
#[derive(Debug)]
pub struct TrackingGuard {
    tracker: Arc<ActivityTracker>,
    id: OperationId,
    armed: bool,
}

impl TrackingGuard {
    /// The identifier of the guarded operation.
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Untracks the operation now, surfacing any tracking error.
    pub fn finish(mut self) -> Result<TrackedOperation, TrackerError> {
        self.armed = false;
        self.tracker.untrack(self.id)
    }
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        if self.armed {
            // Already logged by untrack.
            let _ = self.tracker.untrack(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tracker_is_idle() {
        let tracker = ActivityTracker::new();
        assert!(tracker.is_idle());
        assert_eq!(tracker.pending_count(), 0);
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn idle_iff_tracks_equal_untracks() {
        let tracker = ActivityTracker::new();
        let categories = [
            ActivityCategory::Network,
            ActivityCategory::Animation,
            ActivityCategory::DispatchedWork,
            ActivityCategory::Touch,
        ];

        let mut ids = Vec::new();
        for (i, category) in categories.iter().cycle().take(12).enumerate() {
            ids.push(tracker.track(*category));
            assert_eq!(tracker.pending_count(), i + 1);
            assert!(!tracker.is_idle());
        }

        // Release in an interleaved order.
        ids.rotate_left(5);
        while let Some(id) = ids.pop() {
            tracker.untrack(id).unwrap();
            assert_eq!(tracker.is_idle(), ids.is_empty());
            assert_eq!(tracker.pending_count(), ids.len());
        }
    }

    #[test]
    fn double_untrack_is_an_error() {
        let tracker = ActivityTracker::new();
        let id = tracker.track(ActivityCategory::Animation);
        assert!(tracker.untrack(id).is_ok());
        assert_eq!(
            tracker.untrack(id).unwrap_err(),
            TrackerError::UntrackedOperation { id }
        );
        assert!(tracker.is_idle());
    }

    #[test]
    fn untrack_of_foreign_id_is_an_error() {
        let tracker = ActivityTracker::new();
        let other = ActivityTracker::new();
        let foreign = other.track(ActivityCategory::Network);
        let local = tracker.track(ActivityCategory::Network);

        assert!(matches!(
            tracker.untrack(foreign),
            Err(TrackerError::UntrackedOperation { .. })
        ));
        // The failed untrack must not disturb the ledger.
        assert_eq!(tracker.pending_count(), 1);
        tracker.untrack(local).unwrap();
    }

    #[test]
    fn untrack_returns_the_operation() {
        let tracker = ActivityTracker::new();
        let id = tracker.track_labeled(ActivityCategory::Network, "GET /feed");
        let op = tracker.untrack(id).unwrap();
        assert_eq!(op.id, id);
        assert_eq!(op.category, ActivityCategory::Network);
        assert_eq!(op.label.as_deref(), Some("GET /feed"));
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_is_oldest_first_with_ages() {
        let tracker = ActivityTracker::new();
        tracker.track_labeled(ActivityCategory::Network, "slow request");
        tokio::time::advance(Duration::from_millis(300)).await;
        tracker.track(ActivityCategory::Animation);
        tokio::time::advance(Duration::from_millis(200)).await;

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].category, ActivityCategory::Network);
        assert_eq!(snapshot[0].age, Duration::from_millis(500));
        assert_eq!(snapshot[1].category, ActivityCategory::Animation);
        assert_eq!(snapshot[1].age, Duration::from_millis(200));
        assert!(snapshot[0].to_string().contains("slow request"));
    }

    #[test]
    fn pending_operation_serializes_age_in_millis() {
        let op = PendingOperation {
            id: OperationId::new(),
            category: ActivityCategory::DispatchedWork,
            label: None,
            age: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["category"], "dispatched_work");
        assert_eq!(json["age_ms"], 1500);
        assert!(json.get("label").is_none());
    }

    #[test]
    fn subscribers_see_pending_count() {
        let tracker = ActivityTracker::new();
        let rx = tracker.subscribe();
        let a = tracker.track(ActivityCategory::Touch);
        let b = tracker.track(ActivityCategory::Touch);
        assert_eq!(*rx.borrow(), 2);
        tracker.untrack(a).unwrap();
        tracker.untrack(b).unwrap();
        assert_eq!(*rx.borrow(), 0);
    }

    #[test]
    fn guard_untracks_on_drop() {
        let tracker = Arc::new(ActivityTracker::new());
        {
            let guard = tracker.track_scoped(ActivityCategory::Network);
            assert_eq!(tracker.snapshot()[0].id, guard.id());
            assert!(!tracker.is_idle());
        }
        assert!(tracker.is_idle());
    }

    #[test]
    fn labeled_guard_shows_label_in_snapshot() {
        let tracker = Arc::new(ActivityTracker::new());
        let guard = tracker.track_labeled_scoped(ActivityCategory::Touch, "finger 2");
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot[0].label.as_deref(), Some("finger 2"));
        assert_eq!(snapshot[0].category, ActivityCategory::Touch);
        guard.finish().unwrap();
        assert!(tracker.is_idle());
    }

    #[test]
    fn guard_finish_surfaces_result() {
        let tracker = Arc::new(ActivityTracker::new());
        let guard = tracker.track_scoped(ActivityCategory::DispatchedWork);
        let op = guard.finish().unwrap();
        assert_eq!(op.category, ActivityCategory::DispatchedWork);
        assert!(tracker.is_idle());
    }

    #[test]
    fn concurrent_track_untrack_balances() {
        let tracker = Arc::new(ActivityTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let id = tracker.track(ActivityCategory::DispatchedWork);
                        tracker.untrack(id).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(tracker.is_idle());
        assert_eq!(*tracker.subscribe().borrow(), 0);
    }
}
