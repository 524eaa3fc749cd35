//! Multi-finger touch injection.
//!
//! This module defines the [`TouchDeliverer`] trait, the seam to the
//! platform's event-injection primitive, and the [`MultiTouchInjector`],
//! which turns a set of per-finger [`TouchPath`]s into one interleaved,
//! timestamp-ordered stream of touch events.
//!
//! # Tracking
//!
//! Every finger is registered with the [`ActivityTracker`] as a
//! [`ActivityCategory::Touch`] operation just before its `Began` event and
//! released right after its `Ended` (or `Cancelled`) event. A test waiting
//! for idleness therefore never proceeds while a synthetic touch is still in
//! flight. Each finger's entry is held in a [`TrackingGuard`], so dropping an
//! `inject` future mid-gesture (a timeout, a `select!`, an aborted task)
//! untracks every finger it had put down.
//!
//! # Failure
//!
//! When the platform rejects an event, every finger that has begun and not
//! ended, including the failing one, receives a `Cancelled` event and is
//! untracked before [`InjectionError::Delivery`] is returned.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, debug_span, trace, warn, Instrument};

use crate::element::Point;
use crate::path::TouchPath;
use crate::tracker::{ActivityCategory, ActivityTracker, TrackingGuard};

/// Lifecycle stage of a finger at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchPhase {
    Began,
    Moved,
    Ended,
    Cancelled,
}

impl TouchPhase {
    /// Returns `true` for the phases that end a finger's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TouchPhase::Ended | TouchPhase::Cancelled)
    }
}

impl fmt::Display for TouchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TouchPhase::Began => "began",
            TouchPhase::Moved => "moved",
            TouchPhase::Ended => "ended",
            TouchPhase::Cancelled => "cancelled",
        })
    }
}

/// One touch event handed to the platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TouchEvent {
    /// Index of the finger within the gesture.
    pub finger: usize,
    /// Where the finger is.
    pub point: Point,
    /// Lifecycle stage.
    pub phase: TouchPhase,
    /// Time since the start of the gesture.
    pub timestamp: Duration,
}

/// Errors reported by a [`TouchDeliverer`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The platform refused the event.
    #[error("Platform rejected touch event: {0}")]
    Rejected(String),

    /// The view receiving the touch went away mid-gesture.
    #[error("Touch target disappeared: {0}")]
    TargetGone(String),
}

/// The platform's event-injection primitive.
///
/// `deliver` must not return until the platform has processed the event (or
/// refused it). The injector awaits each call before issuing the next one,
/// which keeps gesture recognition deterministic.
#[async_trait]
pub trait TouchDeliverer: Send + Sync {
    /// Deliver one touch event and wait for the platform to acknowledge it.
    async fn deliver(&self, event: &TouchEvent) -> Result<(), DeliveryError>;
}

/// Errors returned by [`MultiTouchInjector::inject`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InjectionError {
    /// No paths were supplied.
    #[error("No touch paths to inject")]
    NoFingers,

    /// A path has no samples.
    #[error("Touch path for finger {finger} has no samples")]
    EmptyPath { finger: usize },

    /// A sample offset is too far in the future to be scheduled.
    #[error("Touch path for finger {finger} has an unschedulable offset {offset:?}")]
    InvalidOffset { finger: usize, offset: Duration },

    /// The platform failed to deliver an event. All in-flight fingers were
    /// cancelled and untracked before this was returned.
    #[error("Touch delivery failed for finger {finger} at sample {sample}: {source}")]
    Delivery {
        finger: usize,
        sample: usize,
        #[source]
        source: DeliveryError,
    },
}

/// Runtime state of one finger during delivery.
#[derive(Debug, Default)]
struct InjectedTouch {
    /// Index of the most recently attempted sample.
    sample: usize,
    /// Ledger entry while the finger is down. Finished when the finger ends
    /// or is cancelled; dropping it (with the `inject` future) untracks too.
    operation: Option<TrackingGuard>,
}

/// One entry of the merged delivery schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScheduledSample {
    offset: Duration,
    finger: usize,
    sample: usize,
}

/// Merges all fingers' samples into one schedule ordered by time offset,
/// ties broken by ascending finger index. The sort is stable, so samples of
/// one finger that share an offset keep their path order.
fn merge_schedule(paths: &[TouchPath]) -> Vec<ScheduledSample> {
    let mut schedule: Vec<ScheduledSample> = paths
        .iter()
        .enumerate()
        .flat_map(|(finger, path)| {
            path.samples()
                .iter()
                .enumerate()
                .map(move |(sample, s)| ScheduledSample {
                    offset: s.offset,
                    finger,
                    sample,
                })
        })
        .collect();
    schedule.sort_by(|a, b| a.offset.cmp(&b.offset).then(a.finger.cmp(&b.finger)));
    schedule
}

/// The phases delivered for a given sample of a path with `len` samples.
fn phases_for(sample: usize, len: usize) -> &'static [TouchPhase] {
    match (sample, len) {
        (0, 1) => &[TouchPhase::Began, TouchPhase::Ended],
        (0, _) => &[TouchPhase::Began],
        (s, l) if s + 1 == l => &[TouchPhase::Ended],
        _ => &[TouchPhase::Moved],
    }
}

/// Delivers multi-finger gestures through a [`TouchDeliverer`], keeping the
/// [`ActivityTracker`] informed of every finger in flight.
pub struct MultiTouchInjector {
    tracker: Arc<ActivityTracker>,
    deliverer: Arc<dyn TouchDeliverer>,
}

impl MultiTouchInjector {
    pub fn new(tracker: Arc<ActivityTracker>, deliverer: Arc<dyn TouchDeliverer>) -> Self {
        Self { tracker, deliverer }
    }

    pub fn tracker(&self) -> &Arc<ActivityTracker> {
        &self.tracker
    }

    /// Delivers all `paths` in lock-step with the platform, pacing events by
    /// their sample offsets.
    ///
    /// # Errors
    ///
    /// - [`InjectionError::NoFingers`] / [`InjectionError::EmptyPath`] /
    ///   [`InjectionError::InvalidOffset`] before anything is delivered
    /// - [`InjectionError::Delivery`] after cancelling and untracking every
    ///   finger still down
    pub async fn inject(&self, paths: &[TouchPath]) -> Result<(), InjectionError> {
        if paths.is_empty() {
            return Err(InjectionError::NoFingers);
        }
        if let Some(finger) = paths.iter().position(TouchPath::is_empty) {
            return Err(InjectionError::EmptyPath { finger });
        }
        let now = Instant::now();
        for (finger, path) in paths.iter().enumerate() {
            let offset = path.samples().last().map_or(Duration::ZERO, |s| s.offset);
            if now.checked_add(offset).is_none() {
                return Err(InjectionError::InvalidOffset { finger, offset });
            }
        }

        let span = debug_span!("inject", fingers = paths.len());
        self.deliver_all(paths).instrument(span).await
    }

    async fn deliver_all(&self, paths: &[TouchPath]) -> Result<(), InjectionError> {
        let mut touches: Vec<InjectedTouch> = paths.iter().map(|_| InjectedTouch::default()).collect();
        let schedule = merge_schedule(paths);
        let origin = Instant::now();
        debug!(events = schedule.len(), "delivering touch schedule");

        for entry in schedule {
            let Some(at) = origin.checked_add(entry.offset) else {
                self.cancel_in_flight(paths, &mut touches, origin).await;
                return Err(InjectionError::InvalidOffset {
                    finger: entry.finger,
                    offset: entry.offset,
                });
            };
            tokio::time::sleep_until(at).await;

            let path = &paths[entry.finger];
            let point = path.samples()[entry.sample].point;
            let touch = &mut touches[entry.finger];
            touch.sample = entry.sample;

            for &phase in phases_for(entry.sample, path.len()) {
                if phase == TouchPhase::Began {
                    touch.operation = Some(
                        self.tracker
                            .track_labeled_scoped(ActivityCategory::Touch, format!("finger {}", entry.finger)),
                    );
                }

                let event = TouchEvent {
                    finger: entry.finger,
                    point,
                    phase,
                    timestamp: entry.offset,
                };
                trace!(finger = entry.finger, sample = entry.sample, %phase, "deliver");

                if let Err(source) = self.deliverer.deliver(&event).await {
                    warn!(
                        finger = entry.finger,
                        sample = entry.sample,
                        %phase,
                        error = %source,
                        "touch delivery failed, cancelling in-flight fingers"
                    );
                    self.cancel_in_flight(paths, &mut touches, origin).await;
                    return Err(InjectionError::Delivery {
                        finger: entry.finger,
                        sample: entry.sample,
                        source,
                    });
                }

                if phase == TouchPhase::Ended {
                    if let Some(guard) = touch.operation.take() {
                        // A failure here is a collaborator bug and is logged by the tracker.
                        let _ = guard.finish();
                    }
                }
            }
        }

        debug!(elapsed_ms = origin.elapsed().as_millis() as u64, "touch schedule delivered");
        Ok(())
    }

    /// Sends `Cancelled` to every finger that is down and untracks it.
    /// Delivery failures while cancelling are logged and otherwise ignored.
    async fn cancel_in_flight(&self, paths: &[TouchPath], touches: &mut [InjectedTouch], origin: Instant) {
        for (finger, touch) in touches.iter_mut().enumerate() {
            let Some(guard) = touch.operation.take() else {
                continue;
            };
            let event = TouchEvent {
                finger,
                point: paths[finger].samples()[touch.sample].point,
                phase: TouchPhase::Cancelled,
                timestamp: origin.elapsed(),
            };
            if let Err(e) = self.deliverer.deliver(&event).await {
                debug!(finger, error = %e, "cancel event not delivered");
            }
            let _ = guard.finish();
            debug!(finger, sample = touch.sample, "finger cancelled");
        }
    }
}

impl fmt::Debug for MultiTouchInjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiTouchInjector")
            .field("tracker", &self.tracker)
            .field("deliverer", &"<dyn TouchDeliverer>")
            .finish()
    }
}
