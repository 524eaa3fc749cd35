//! Shared test helpers for stillpoint-core integration tests.
//!
//! This module provides a programmable mock of the platform's touch
//! delivery, plus tracing setup and a few fixtures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

use stillpoint_core::element::Point;
use stillpoint_core::injector::{DeliveryError, TouchDeliverer, TouchEvent, TouchPhase};
use stillpoint_core::path::{TouchPath, TouchSample};
use stillpoint_core::tracker::{ActivityCategory, ActivityTracker};

/// Installs a fmt subscriber honouring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Programmable mock deliverer
// ---------------------------------------------------------------------------

/// Describes how the mock platform reacts to one touch event.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Accept the event.
    Ack,
    /// Refuse the event with the given message.
    Fail(String),
    /// Report that the touched view went away.
    TargetGone,
    /// Accept the event after `Duration`.
    Delay(Duration),
    /// Accept the event, and have the "app" start network work that lasts
    /// `Duration` in reaction to it.
    StartWork(Duration),
    /// Accept the event, and have the "app" start network work that never
    /// finishes.
    StartStuckWork,
}

#[derive(Default)]
struct MockState {
    events: Vec<TouchEvent>,
    observed_pending: Vec<usize>,
    per_finger: HashMap<usize, usize>,
    script: HashMap<(usize, usize), MockBehavior>,
}

/// A [`TouchDeliverer`] that records every event and reacts according to a
/// per-finger script.
///
/// Behaviors are keyed by `(finger, n)`, where `n` counts the events
/// delivered to that finger so far (its `Began` is `n = 0`). Unscripted
/// events are acknowledged.
pub struct MockDeliverer {
    tracker: Arc<ActivityTracker>,
    state: Mutex<MockState>,
}

impl MockDeliverer {
    pub fn new(tracker: Arc<ActivityTracker>) -> Self {
        Self {
            tracker,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Scripts the reaction to the `n`-th event of `finger`.
    pub fn on(self, finger: usize, n: usize, behavior: MockBehavior) -> Self {
        self.state.lock().unwrap().script.insert((finger, n), behavior);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Every event the injector attempted, in order.
    pub fn events(&self) -> Vec<TouchEvent> {
        self.state.lock().unwrap().events.clone()
    }

    /// Phases delivered to one finger, in order.
    pub fn phases_of(&self, finger: usize) -> Vec<TouchPhase> {
        self.events()
            .into_iter()
            .filter(|e| e.finger == finger)
            .map(|e| e.phase)
            .collect()
    }

    /// The tracker's pending count as seen at each delivery.
    pub fn observed_pending(&self) -> Vec<usize> {
        self.state.lock().unwrap().observed_pending.clone()
    }
}

#[async_trait]
impl TouchDeliverer for MockDeliverer {
    async fn deliver(&self, event: &TouchEvent) -> Result<(), DeliveryError> {
        let behavior = {
            let mut state = self.state.lock().unwrap();
            let counter = state.per_finger.entry(event.finger).or_insert(0);
            let n = *counter;
            *counter += 1;
            state.events.push(event.clone());
            state.observed_pending.push(self.tracker.pending_count());
            state.script.remove(&(event.finger, n)).unwrap_or(MockBehavior::Ack)
        };

        match behavior {
            MockBehavior::Ack => Ok(()),
            MockBehavior::Fail(msg) => Err(DeliveryError::Rejected(msg)),
            MockBehavior::TargetGone => Err(DeliveryError::TargetGone("view removed from window".to_string())),
            MockBehavior::Delay(d) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
            MockBehavior::StartWork(d) => {
                let guard = self.tracker.track_scoped(ActivityCategory::Network);
                tokio::spawn(async move {
                    tokio::time::sleep(d).await;
                    drop(guard);
                });
                Ok(())
            }
            MockBehavior::StartStuckWork => {
                self.tracker
                    .track_labeled(ActivityCategory::Network, "GET /never-responds");
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A path moving right by 10 points per sample, sampled at the given
/// millisecond offsets.
pub fn path_at(offsets_ms: &[u64], y: f64) -> TouchPath {
    TouchPath::from_samples(
        offsets_ms
            .iter()
            .enumerate()
            .map(|(i, ms)| TouchSample {
                point: Point::new(10.0 * i as f64, y),
                offset: Duration::from_millis(*ms),
            })
            .collect(),
    )
}

/// A five-sample path over 40 ms.
pub fn five_sample_path(y: f64) -> TouchPath {
    path_at(&[0, 10, 20, 30, 40], y)
}

/// A fresh tracker shared with a fresh mock.
pub fn tracker_and_mock() -> (Arc<ActivityTracker>, MockDeliverer) {
    let tracker = Arc::new(ActivityTracker::new());
    let mock = MockDeliverer::new(Arc::clone(&tracker));
    (tracker, mock)
}
