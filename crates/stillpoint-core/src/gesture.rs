//! Gesture specifications.
//!
//! A [`GestureSpec`] describes a swipe independently of any element: its
//! direction, duration, number of parallel fingers, and where the fingers
//! start. Specs are validated once, when built, so that configuration
//! mistakes are reported before any touch is injected.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use stillpoint_core::gesture::{GestureSpec, StartPoint, SwipeDirection};
//!
//! let spec = GestureSpec::new(SwipeDirection::Up, Duration::from_millis(300), 2, StartPoint::MaximizeTravel)
//!     .expect("valid spec");
//! assert_eq!(spec.finger_count(), 2);
//!
//! // Swipes must start strictly inside the element.
//! let bad = GestureSpec::new(SwipeDirection::Left, Duration::from_millis(300), 1, StartPoint::fractional(1.0, 0.5));
//! assert!(bad.is_err());
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::element::Vector;

/// Smallest number of parallel fingers a swipe may use.
pub const MIN_FINGERS: usize = 1;

/// Largest number of parallel fingers a swipe may use.
pub const MAX_FINGERS: usize = 4;

/// Longest duration a single swipe may take.
pub const MAX_DURATION: Duration = Duration::from_secs(60);

/// Errors detected while building or resolving a gesture.
///
/// All of these are raised before any touch is delivered.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GestureError {
    /// The finger count is outside `1..=4`.
    #[error("Invalid finger count {count}: must be between 1 and 4")]
    InvalidFingerCount { count: usize },

    /// A start fraction is not strictly between 0 and 1.
    #[error("Invalid start point ({x}, {y}): fractions must be in (0, 1) exclusive")]
    InvalidStartPoint { x: f64, y: f64 },

    /// The duration is zero or longer than [`MAX_DURATION`].
    #[error("Invalid gesture duration {0:?}: must be greater than zero and at most 60s")]
    InvalidDuration(Duration),

    /// An explicit direction vector has no usable direction.
    #[error("Invalid swipe direction ({dx}, {dy}): vector must be finite and non-zero")]
    InvalidDirection { dx: f64, dy: f64 },

    /// The target's bounds cannot receive touches.
    #[error("Element is not interactable: {reason}")]
    ElementNotInteractable { reason: String },

    /// A finger would travel (almost) no distance inside the safe area.
    #[error("No room to swipe: only {travel:.1}pt of travel inside the element")]
    NoRoomToTravel { travel: f64 },

    /// The element is too narrow across the swipe to keep fingers apart.
    #[error("No room to spread {fingers} fingers: only {room:.1}pt across the swipe")]
    NoRoomForFingers { fingers: usize, room: f64 },
}

/// The direction a swipe travels in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
    /// An arbitrary direction in screen coordinates (y grows downward).
    Vector { dx: f64, dy: f64 },
}

impl SwipeDirection {
    /// The direction as a unit vector, or `None` for a degenerate explicit
    /// vector.
    pub fn unit_vector(&self) -> Option<Vector> {
        match *self {
            SwipeDirection::Up => Some(Vector::new(0.0, -1.0)),
            SwipeDirection::Down => Some(Vector::new(0.0, 1.0)),
            SwipeDirection::Left => Some(Vector::new(-1.0, 0.0)),
            SwipeDirection::Right => Some(Vector::new(1.0, 0.0)),
            SwipeDirection::Vector { dx, dy } => Vector::new(dx, dy).normalized(),
        }
    }
}

impl fmt::Display for SwipeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwipeDirection::Up => f.write_str("up"),
            SwipeDirection::Down => f.write_str("down"),
            SwipeDirection::Left => f.write_str("left"),
            SwipeDirection::Right => f.write_str("right"),
            SwipeDirection::Vector { dx, dy } => write!(f, "({}, {})", dx, dy),
        }
    }
}

/// Where the fingers of a swipe are placed before they start moving.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPoint {
    /// Start near the edge opposite the swipe direction, so the fingers
    /// travel as far as possible inside the element.
    #[default]
    MaximizeTravel,
    /// Start at a fractional position within the element's bounds:
    /// `x = 0` is the left edge, `x = 1` the right edge; likewise for `y`.
    Fractional { x: f64, y: f64 },
}

impl StartPoint {
    pub fn fractional(x: f64, y: f64) -> Self {
        StartPoint::Fractional { x, y }
    }

    fn validate(&self) -> Result<(), GestureError> {
        match *self {
            StartPoint::MaximizeTravel => Ok(()),
            StartPoint::Fractional { x, y } => {
                let interior = |f: f64| f > 0.0 && f < 1.0;
                if interior(x) && interior(y) {
                    Ok(())
                } else {
                    Err(GestureError::InvalidStartPoint { x, y })
                }
            }
        }
    }
}

/// A validated description of a (multi-finger) swipe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GestureSpec {
    direction: SwipeDirection,
    duration: Duration,
    finger_count: usize,
    start: StartPoint,
}

impl GestureSpec {
    /// Builds a spec, validating every field.
    ///
    /// # Errors
    ///
    /// - [`GestureError::InvalidFingerCount`] unless `1 <= finger_count <= 4`
    /// - [`GestureError::InvalidStartPoint`] for fractions outside (0, 1)
    /// - [`GestureError::InvalidDuration`] for a zero duration or one longer
    ///   than [`MAX_DURATION`]
    /// - [`GestureError::InvalidDirection`] for a zero or non-finite vector
    pub fn new(
        direction: SwipeDirection,
        duration: Duration,
        finger_count: usize,
        start: StartPoint,
    ) -> Result<Self, GestureError> {
        if !(MIN_FINGERS..=MAX_FINGERS).contains(&finger_count) {
            return Err(GestureError::InvalidFingerCount {
                count: finger_count,
            });
        }
        start.validate()?;
        if duration.is_zero() || duration > MAX_DURATION {
            return Err(GestureError::InvalidDuration(duration));
        }
        if direction.unit_vector().is_none() {
            let (dx, dy) = match direction {
                SwipeDirection::Vector { dx, dy } => (dx, dy),
                _ => (0.0, 0.0),
            };
            return Err(GestureError::InvalidDirection { dx, dy });
        }
        Ok(Self {
            direction,
            duration,
            finger_count,
            start,
        })
    }

    pub fn direction(&self) -> SwipeDirection {
        self.direction
    }

    /// The unit vector of the swipe direction.
    pub fn unit_direction(&self) -> Vector {
        // Validated in `new`.
        self.direction.unit_vector().unwrap_or_default()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn finger_count(&self) -> usize {
        self.finger_count
    }

    pub fn start(&self) -> StartPoint {
        self.start
    }
}
