//! Geometry and target-element types for gesture synthesis.
//!
//! Coordinates are in screen points with the origin at the top-left corner
//! of the screen and y growing downward. Element lookup itself happens
//! outside this crate; gestures only need an element's current frame, which
//! they obtain through the [`TargetElement`] trait.

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// A location in screen points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(self, other: Point) -> f64 {
        (other - self).length()
    }

    /// Linear interpolation between `self` (t = 0) and `other` (t = 1).
    pub fn lerp(self, other: Point, t: f64) -> Point {
        self + (other - self) * t
    }
}

/// A displacement in screen points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    pub dx: f64,
    pub dy: f64,
}

impl Vector {
    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    pub fn length(self) -> f64 {
        self.dx.hypot(self.dy)
    }

    /// Returns the unit vector in the same direction, or `None` for a zero
    /// or non-finite vector.
    pub fn normalized(self) -> Option<Vector> {
        let len = self.length();
        if len.is_finite() && len > f64::EPSILON {
            Some(Vector::new(self.dx / len, self.dy / len))
        } else {
            None
        }
    }

    /// The vector rotated a quarter turn (perpendicular, same length).
    pub fn perpendicular(self) -> Vector {
        Vector::new(-self.dy, self.dx)
    }

    pub fn dot(self, other: Vector) -> f64 {
        self.dx * other.dx + self.dy * other.dy
    }
}

impl Add<Vector> for Point {
    type Output = Point;

    fn add(self, v: Vector) -> Point {
        Point::new(self.x + v.dx, self.y + v.dy)
    }
}

impl Sub<Vector> for Point {
    type Output = Point;

    fn sub(self, v: Vector) -> Point {
        Point::new(self.x - v.dx, self.y - v.dy)
    }
}

impl Sub for Point {
    type Output = Vector;

    fn sub(self, other: Point) -> Vector {
        Vector::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f64> for Vector {
    type Output = Vector;

    fn mul(self, k: f64) -> Vector {
        Vector::new(self.dx * k, self.dy * k)
    }
}

/// The frame (position and dimensions) of a UI element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementFrame {
    /// The x-coordinate of the element's top-left corner.
    pub x: f64,
    /// The y-coordinate of the element's top-left corner.
    pub y: f64,
    /// The width of the element in points.
    pub width: f64,
    /// The height of the element in points.
    pub height: f64,
}

impl ElementFrame {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn min_x(&self) -> f64 {
        self.x
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn min_y(&self) -> f64 {
        self.y
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Returns `true` if the frame has finite coordinates and a strictly
    /// positive area. Gestures cannot target anything else.
    pub fn is_interactable(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Returns `true` if `p` lies inside the frame, edges excluded.
    pub fn contains_strictly(&self, p: Point) -> bool {
        p.x > self.min_x() && p.x < self.max_x() && p.y > self.min_y() && p.y < self.max_y()
    }

    /// Returns `true` if `p` lies inside the frame or on its edge, with
    /// `tolerance` points of slack for rounding.
    pub fn contains(&self, p: Point, tolerance: f64) -> bool {
        p.x >= self.min_x() - tolerance
            && p.x <= self.max_x() + tolerance
            && p.y >= self.min_y() - tolerance
            && p.y <= self.max_y() + tolerance
    }

    /// Shrinks the frame by `fraction` of its width on the left and right,
    /// and by `fraction` of its height on the top and bottom.
    pub fn inset_by_fraction(&self, fraction: f64) -> ElementFrame {
        let dx = self.width * fraction;
        let dy = self.height * fraction;
        ElementFrame::new(
            self.x + dx,
            self.y + dy,
            self.width - 2.0 * dx,
            self.height - 2.0 * dy,
        )
    }

    /// The point at fractional position (`fx`, `fy`) within the frame.
    pub fn point_at_fraction(&self, fx: f64, fy: f64) -> Point {
        Point::new(self.x + fx * self.width, self.y + fy * self.height)
    }

    /// Distance travelled from `from` along the unit vector `dir` before
    /// leaving the frame. Zero if `from` is already outside in that
    /// direction.
    pub fn distance_to_edge(&self, from: Point, dir: Vector) -> f64 {
        fn axis(pos: f64, d: f64, lo: f64, hi: f64) -> f64 {
            if d > f64::EPSILON {
                (hi - pos) / d
            } else if d < -f64::EPSILON {
                (lo - pos) / d
            } else {
                f64::INFINITY
            }
        }
        let tx = axis(from.x, dir.dx, self.min_x(), self.max_x());
        let ty = axis(from.y, dir.dy, self.min_y(), self.max_y());
        tx.min(ty).max(0.0)
    }
}

/// Something a gesture can be performed on.
///
/// Implemented by whatever the element-matching layer hands back. The frame
/// is queried at the moment the action runs, so it reflects the current
/// layout rather than the layout at match time.
pub trait TargetElement: Send + Sync {
    /// The element's current frame in screen points, or `None` if the
    /// element is not on screen.
    fn frame(&self) -> Option<ElementFrame>;

    /// Short description for logs and error messages.
    fn description(&self) -> String;
}

/// A plain element description, as produced by a hierarchy snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UIElement {
    /// The accessibility identifier, if any.
    #[serde(default)]
    pub identifier: Option<String>,

    /// The accessibility label, if any.
    #[serde(default)]
    pub label: Option<String>,

    /// The element's frame in screen coordinates.
    #[serde(default)]
    pub frame: Option<ElementFrame>,
}

impl UIElement {
    /// An anonymous element occupying `frame`.
    pub fn with_frame(frame: ElementFrame) -> Self {
        Self {
            frame: Some(frame),
            ..Self::default()
        }
    }

    pub fn identified(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

impl TargetElement for UIElement {
    fn frame(&self) -> Option<ElementFrame> {
        self.frame
    }

    fn description(&self) -> String {
        match (&self.identifier, &self.label) {
            (Some(id), _) => format!("element '{}'", id),
            (None, Some(label)) => format!("element with label '{}'", label),
            (None, None) => "anonymous element".to_string(),
        }
    }
}

impl TargetElement for ElementFrame {
    fn frame(&self) -> Option<ElementFrame> {
        Some(*self)
    }

    fn description(&self) -> String {
        format!(
            "frame ({}, {}, {}x{})",
            self.x, self.y, self.width, self.height
        )
    }
}
