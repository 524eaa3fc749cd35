//! Touch trajectory computation.
//!
//! A [`TouchPath`] is the ordered list of samples one finger follows during a
//! gesture. Paths are pure data: computing them has no side effects, and they
//! never change once built. The [`MultiTouchInjector`](crate::injector::MultiTouchInjector)
//! turns a set of paths into delivered touch events.
//!
//! # Placement
//!
//! All placement happens inside a *safe area*: the element's bounds inset on
//! every side by [`PathConfig::safe_area_inset`] of the corresponding
//! dimension. Touches landing exactly on an element's edge are unreliable, so
//! start points are always strictly inside the bounds.
//!
//! - [`StartPoint::MaximizeTravel`] starts where a ray from the safe area's
//!   center, pointing against the swipe, leaves the safe area. An upward
//!   swipe therefore starts near the bottom edge.
//! - [`StartPoint::Fractional`] starts at `origin + fraction * size`.
//!
//! The end point is where the finger, moving along the swipe direction from
//! its start, reaches the safe area's boundary.
//!
//! Parallel fingers are spread perpendicular to the swipe direction, centered
//! on the start point and [`PathConfig::finger_spacing`] apart. On narrow
//! elements the spacing shrinks to keep every finger inside the bounds; if
//! it would shrink to nothing, the gesture is rejected.

use std::time::Duration;

use serde::Serialize;
use tracing::trace;

use crate::config::PathConfig;
use crate::element::{ElementFrame, Point, Vector};
use crate::gesture::{GestureError, GestureSpec, StartPoint};

/// One point of a finger's trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TouchSample {
    /// Where the finger is.
    pub point: Point,
    /// When the finger is there, relative to the start of the gesture.
    pub offset: Duration,
}

/// The full trajectory of one finger, ordered by time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TouchPath {
    samples: Vec<TouchSample>,
}

impl TouchPath {
    /// Wraps precomputed samples. Offsets must be non-decreasing.
    pub fn from_samples(samples: Vec<TouchSample>) -> Self {
        debug_assert!(samples.windows(2).all(|w| w[0].offset <= w[1].offset));
        Self { samples }
    }

    /// A straight line from `start` to `end`, sampled `count` times evenly
    /// over `duration`.
    pub fn linear(start: Point, end: Point, duration: Duration, count: usize) -> Self {
        let count = count.max(1);
        let last = count.saturating_sub(1).max(1) as f64;
        let samples = (0..count)
            .map(|i| {
                let t = i as f64 / last;
                TouchSample {
                    point: start.lerp(end, t),
                    offset: if i + 1 == count && count > 1 {
                        duration
                    } else {
                        duration.mul_f64(t)
                    },
                }
            })
            .collect();
        Self { samples }
    }

    /// Computes the path of one finger.
    ///
    /// `finger_offset` displaces this finger's start from the gesture's start
    /// point; pass [`Vector::default()`] for a single finger.
    ///
    /// # Errors
    ///
    /// - [`GestureError::ElementNotInteractable`] for degenerate bounds
    /// - [`GestureError::InvalidStartPoint`] if the displaced start is not
    ///   strictly inside the bounds
    /// - [`GestureError::NoRoomToTravel`] if the finger cannot move at least
    ///   [`PathConfig::min_travel`] points inside the safe area
    pub fn compute(
        spec: &GestureSpec,
        bounds: &ElementFrame,
        finger_offset: Vector,
        config: &PathConfig,
    ) -> Result<TouchPath, GestureError> {
        check_bounds(bounds)?;
        let safe = bounds.inset_by_fraction(config.safe_area_inset);
        let dir = spec.unit_direction();

        let start = anchor_point(spec, bounds, &safe) + finger_offset;
        if !bounds.contains_strictly(start) {
            return Err(GestureError::InvalidStartPoint {
                x: (start.x - bounds.x) / bounds.width,
                y: (start.y - bounds.y) / bounds.height,
            });
        }

        let travel = safe.distance_to_edge(start, dir);
        if travel < config.min_travel {
            return Err(GestureError::NoRoomToTravel { travel });
        }
        let end = start + dir * travel;

        let count = sample_count(spec.duration(), config);
        trace!(?start, ?end, count, "computed touch path");
        Ok(TouchPath::linear(start, end, spec.duration(), count))
    }

    /// Computes one path per finger of `spec`.
    pub fn compute_all(
        spec: &GestureSpec,
        bounds: &ElementFrame,
        config: &PathConfig,
    ) -> Result<Vec<TouchPath>, GestureError> {
        check_bounds(bounds)?;
        finger_offsets(spec, bounds, config)?
            .into_iter()
            .map(|offset| TouchPath::compute(spec, bounds, offset, config))
            .collect()
    }

    pub fn samples(&self) -> &[TouchSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn start(&self) -> Option<Point> {
        self.samples.first().map(|s| s.point)
    }

    pub fn end(&self) -> Option<Point> {
        self.samples.last().map(|s| s.point)
    }

    /// Time from the first sample to the last.
    pub fn duration(&self) -> Duration {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.offset.saturating_sub(first.offset),
            _ => Duration::ZERO,
        }
    }
}

fn check_bounds(bounds: &ElementFrame) -> Result<(), GestureError> {
    if bounds.is_interactable() {
        Ok(())
    } else {
        Err(GestureError::ElementNotInteractable {
            reason: format!(
                "degenerate bounds ({}, {}, {}x{})",
                bounds.x, bounds.y, bounds.width, bounds.height
            ),
        })
    }
}

/// The start point before any per-finger displacement.
fn anchor_point(spec: &GestureSpec, bounds: &ElementFrame, safe: &ElementFrame) -> Point {
    match spec.start() {
        StartPoint::MaximizeTravel => {
            let back = spec.unit_direction() * -1.0;
            let center = safe.center();
            center + back * safe.distance_to_edge(center, back)
        }
        StartPoint::Fractional { x, y } => bounds.point_at_fraction(x, y),
    }
}

/// Per-finger displacements, perpendicular to the swipe and centered on the
/// anchor. The spacing shrinks so that every finger starts at least
/// `min_travel` points inside the bounds, and fails when that leaves no
/// room to keep the fingers apart.
fn finger_offsets(
    spec: &GestureSpec,
    bounds: &ElementFrame,
    config: &PathConfig,
) -> Result<Vec<Vector>, GestureError> {
    let n = spec.finger_count();
    if n <= 1 {
        return Ok(vec![Vector::default()]);
    }

    let safe = bounds.inset_by_fraction(config.safe_area_inset);
    let anchor = anchor_point(spec, bounds, &safe);
    let perp = spec.unit_direction().perpendicular();
    let room = (bounds
        .distance_to_edge(anchor, perp)
        .min(bounds.distance_to_edge(anchor, perp * -1.0))
        - config.min_travel)
        .max(0.0);

    let steps = (n - 1) as f64;
    let spacing = config.finger_spacing.min(2.0 * room / steps);
    if spacing <= f64::EPSILON {
        return Err(GestureError::NoRoomForFingers { fingers: n, room });
    }
    Ok((0..n)
        .map(|i| perp * ((i as f64 - steps / 2.0) * spacing))
        .collect())
}

/// Number of samples for a gesture of the given duration.
pub fn sample_count(duration: Duration, config: &PathConfig) -> usize {
    // Absorb float noise so that exact multiples don't gain a sample.
    let intervals = (duration.as_secs_f64() * config.sample_rate_hz - 1e-9).ceil();
    let by_rate = if intervals > 0.0 {
        // The cast saturates (infinity included); so does the endpoint sample.
        (intervals as usize).saturating_add(1)
    } else {
        0
    };
    by_rate.max(config.min_samples)
}
