//! Gesture actions and their execution records.
//!
//! A [`GestureAction`] is what the test script performs on an element. The
//! only built-in action is the [`MultiFingerSwipeAction`], which:
//!
//! 1. resolves the element's current frame,
//! 2. computes one [`TouchPath`] per finger,
//! 3. injects them through the [`MultiTouchInjector`],
//! 4. waits for the app to become idle.
//!
//! The action succeeds only if every step does. Problems with the element or
//! the gesture are reported before any touch is injected.
//!
//! [`ActionRecord`]s capture the outcome of each performed action for
//! reporting; see [`SyncEngine::history`](crate::engine::SyncEngine::history).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::config::PathConfig;
use crate::element::TargetElement;
use crate::gesture::{GestureError, GestureSpec, StartPoint, SwipeDirection};
use crate::idle::{IdleTimeout, IdlenessMonitor, WaitError};
use crate::injector::{InjectionError, MultiTouchInjector};
use crate::path::TouchPath;

/// Errors returned by [`GestureAction::perform`].
#[derive(Error, Debug)]
pub enum ActionError {
    /// The element has no frame, or a frame that cannot receive touches.
    #[error("Element not interactable: {reason}")]
    ElementNotInteractable { reason: String },

    /// The gesture cannot be performed on this element.
    #[error(transparent)]
    Gesture(GestureError),

    /// Touch delivery failed. In-flight fingers were cancelled.
    #[error(transparent)]
    Injection(#[from] InjectionError),

    /// The app did not become idle after the gesture.
    #[error(transparent)]
    Timeout(IdleTimeout),

    /// The idle wait was cancelled.
    #[error("Action cancelled while waiting for idle")]
    Cancelled,
}

impl From<GestureError> for ActionError {
    fn from(e: GestureError) -> Self {
        match e {
            GestureError::ElementNotInteractable { reason } => ActionError::ElementNotInteractable { reason },
            other => ActionError::Gesture(other),
        }
    }
}

impl From<WaitError> for ActionError {
    fn from(e: WaitError) -> Self {
        match e {
            WaitError::Timeout(timeout) => ActionError::Timeout(timeout),
            WaitError::Cancelled => ActionError::Cancelled,
        }
    }
}

/// Everything an action needs to run.
#[derive(Debug)]
pub struct ActionContext {
    pub injector: MultiTouchInjector,
    pub monitor: IdlenessMonitor,
    /// How long to wait for idleness after the gesture.
    pub idle_timeout: Duration,
    pub path: PathConfig,
}

impl ActionContext {
    pub fn new(injector: MultiTouchInjector, monitor: IdlenessMonitor, idle_timeout: Duration) -> Self {
        Self {
            injector,
            monitor,
            idle_timeout,
            path: PathConfig::default(),
        }
    }

    pub fn with_path_config(mut self, path: PathConfig) -> Self {
        self.path = path;
        self
    }
}

/// An action performed on a UI element.
#[async_trait]
pub trait GestureAction: Send + Sync {
    /// Short human-readable name, used in logs and action records.
    fn name(&self) -> String;

    /// Performs the action on `element` and waits for the app to settle.
    async fn perform(&self, element: &dyn TargetElement, ctx: &ActionContext) -> Result<(), ActionError>;
}

/// A swipe with one to four parallel fingers.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use stillpoint_core::action::{GestureAction, MultiFingerSwipeAction};
/// use stillpoint_core::gesture::SwipeDirection;
///
/// let action = MultiFingerSwipeAction::swipe(SwipeDirection::Up, Duration::from_millis(300), 2)
///     .expect("valid gesture");
/// assert_eq!(action.name(), "swipe up with 2 fingers");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MultiFingerSwipeAction {
    spec: GestureSpec,
}

impl MultiFingerSwipeAction {
    pub fn new(spec: GestureSpec) -> Self {
        Self { spec }
    }

    /// A swipe that travels as far as possible inside the element.
    pub fn swipe(direction: SwipeDirection, duration: Duration, fingers: usize) -> Result<Self, GestureError> {
        GestureSpec::new(direction, duration, fingers, StartPoint::MaximizeTravel).map(Self::new)
    }

    /// A swipe starting at fractional position (`x`, `y`) of the element,
    /// both strictly between 0 and 1.
    pub fn swipe_from(
        direction: SwipeDirection,
        duration: Duration,
        fingers: usize,
        x: f64,
        y: f64,
    ) -> Result<Self, GestureError> {
        GestureSpec::new(direction, duration, fingers, StartPoint::fractional(x, y)).map(Self::new)
    }

    pub fn spec(&self) -> &GestureSpec {
        &self.spec
    }

    async fn perform_inner(&self, element: &dyn TargetElement, ctx: &ActionContext) -> Result<(), ActionError> {
        let Some(frame) = element.frame() else {
            return Err(ActionError::ElementNotInteractable {
                reason: format!("{} is not on screen", element.description()),
            });
        };
        if !frame.is_interactable() {
            return Err(ActionError::ElementNotInteractable {
                reason: format!(
                    "{} has a degenerate frame ({}x{})",
                    element.description(),
                    frame.width,
                    frame.height
                ),
            });
        }

        let paths = TouchPath::compute_all(&self.spec, &frame, &ctx.path)?;
        debug!(fingers = paths.len(), samples = paths.first().map_or(0, TouchPath::len), "paths computed");

        ctx.injector.inject(&paths).await?;
        ctx.monitor.wait_until_idle(ctx.idle_timeout).await?;
        Ok(())
    }
}

#[async_trait]
impl GestureAction for MultiFingerSwipeAction {
    fn name(&self) -> String {
        match self.spec.finger_count() {
            1 => format!("swipe {} with 1 finger", self.spec.direction()),
            n => format!("swipe {} with {} fingers", self.spec.direction(), n),
        }
    }

    async fn perform(&self, element: &dyn TargetElement, ctx: &ActionContext) -> Result<(), ActionError> {
        let span = info_span!("perform_action", action = %self.name(), element = %element.description());
        self.perform_inner(element, ctx).instrument(span).await
    }
}

/// The result of a performed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionResult {
    /// The action completed and the app became idle.
    Success,

    /// The action failed with the given error message.
    Failure(String),
}

impl ActionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Success)
    }
}

impl<E: std::fmt::Display> From<&Result<(), E>> for ActionResult {
    fn from(result: &Result<(), E>) -> Self {
        match result {
            Ok(()) => ActionResult::Success,
            Err(e) => ActionResult::Failure(e.to_string()),
        }
    }
}

/// A record of one performed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Unique identifier for this record.
    pub id: Uuid,

    /// When the action finished.
    pub timestamp: DateTime<Utc>,

    /// The action's name.
    pub action: String,

    /// Target description.
    pub element: String,

    pub result: ActionResult,

    /// How long the action took, idle wait included.
    pub duration_ms: u64,
}

impl ActionRecord {
    pub fn new(action: String, element: String, result: ActionResult, duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            element,
            result,
            duration_ms: duration.as_millis() as u64,
        }
    }
}
