//! End-to-end tests for multi-finger swipe actions: path resolution,
//! injection, and the idle wait that follows.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{init_tracing, tracker_and_mock, MockBehavior, MockDeliverer};
use stillpoint_core::action::{ActionContext, ActionError, GestureAction, MultiFingerSwipeAction};
use stillpoint_core::element::{ElementFrame, UIElement};
use stillpoint_core::gesture::{GestureError, SwipeDirection};
use stillpoint_core::idle::IdlenessMonitor;
use stillpoint_core::injector::{InjectionError, MultiTouchInjector, TouchPhase};
use stillpoint_core::tracker::{ActivityCategory, ActivityTracker};
use tokio::time::Instant;

const TOL: f64 = 1e-6;

fn context(tracker: &Arc<ActivityTracker>, mock: Arc<MockDeliverer>, idle_timeout: Duration) -> ActionContext {
    let injector = MultiTouchInjector::new(Arc::clone(tracker), mock);
    let monitor = IdlenessMonitor::new(Arc::clone(tracker));
    ActionContext::new(injector, monitor, idle_timeout)
}

fn square() -> UIElement {
    UIElement::with_frame(ElementFrame::new(0.0, 0.0, 100.0, 100.0)).identified("canvas")
}

#[tokio::test(start_paused = true)]
async fn two_finger_swipe_up_on_square() {
    init_tracing();
    let (tracker, mock) = tracker_and_mock();
    let mock = mock.into_arc();
    let ctx = context(&tracker, mock.clone(), Duration::from_secs(5));

    let action = MultiFingerSwipeAction::swipe(SwipeDirection::Up, Duration::from_millis(300), 2).unwrap();
    action.perform(&square(), &ctx).await.unwrap();

    for finger in 0..2 {
        let events: Vec<_> = mock.events().into_iter().filter(|e| e.finger == finger).collect();
        assert!(events.len() >= 3, "finger {finger} got {} events", events.len());
        let first = events.first().unwrap();
        let last = events.last().unwrap();
        assert_eq!(first.phase, TouchPhase::Began);
        assert_eq!(last.phase, TouchPhase::Ended);
        assert!(first.point.y > 80.0 && first.point.y < 100.0, "start {:?}", first.point);
        assert!(last.point.y < 20.0 && last.point.y > 0.0, "end {:?}", last.point);
        assert!((first.point.x - last.point.x).abs() < TOL);
        assert_eq!(last.timestamp, Duration::from_millis(300));
    }

    let start_x: Vec<f64> = mock
        .events()
        .iter()
        .filter(|e| e.phase == TouchPhase::Began)
        .map(|e| e.point.x)
        .collect();
    assert_eq!(start_x.len(), 2);
    assert!((start_x[1] - start_x[0] - 10.0).abs() < TOL);
    assert!(tracker.is_idle());
}

#[tokio::test(start_paused = true)]
async fn action_waits_for_work_the_gesture_triggers() {
    let (tracker, mock) = tracker_and_mock();
    // Finger 0's last event (index 3 for a 50 ms swipe) kicks off a request.
    let mock = mock
        .on(0, 3, MockBehavior::StartWork(Duration::from_millis(500)))
        .into_arc();
    let ctx = context(&tracker, mock.clone(), Duration::from_secs(5));

    let action = MultiFingerSwipeAction::swipe(SwipeDirection::Left, Duration::from_millis(50), 1).unwrap();
    let start = Instant::now();
    action.perform(&square(), &ctx).await.unwrap();

    assert_eq!(mock.phases_of(0).last(), Some(&TouchPhase::Ended));
    assert!(start.elapsed() >= Duration::from_millis(550), "{:?}", start.elapsed());
    assert!(tracker.is_idle());
}

#[tokio::test(start_paused = true)]
async fn elements_without_usable_frame_are_rejected_before_injection() {
    let (tracker, mock) = tracker_and_mock();
    let mock = mock.into_arc();
    let ctx = context(&tracker, mock.clone(), Duration::from_secs(5));
    let action = MultiFingerSwipeAction::swipe(SwipeDirection::Down, Duration::from_millis(200), 3).unwrap();

    let zero_width = UIElement::with_frame(ElementFrame::new(10.0, 10.0, 0.0, 50.0)).identified("divider");
    let err = action.perform(&zero_width, &ctx).await.unwrap_err();
    assert!(matches!(err, ActionError::ElementNotInteractable { .. }));
    assert!(err.to_string().contains("divider"));

    let offscreen = UIElement::default();
    let err = action.perform(&offscreen, &ctx).await.unwrap_err();
    assert!(matches!(err, ActionError::ElementNotInteractable { .. }));

    assert!(mock.events().is_empty());
    assert!(tracker.is_idle());
}

#[tokio::test(start_paused = true)]
async fn gesture_that_cannot_fit_is_rejected_before_injection() {
    let (tracker, mock) = tracker_and_mock();
    let mock = mock.into_arc();
    let ctx = context(&tracker, mock.clone(), Duration::from_secs(5));

    // Starting at 5% height, an upward swipe has nowhere to go.
    let action =
        MultiFingerSwipeAction::swipe_from(SwipeDirection::Up, Duration::from_millis(200), 1, 0.5, 0.05).unwrap();
    let err = action.perform(&square(), &ctx).await.unwrap_err();
    assert!(matches!(err, ActionError::Gesture(GestureError::NoRoomToTravel { .. })));
    assert!(mock.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stuck_work_times_out_with_snapshot() {
    let (tracker, mock) = tracker_and_mock();
    let mock = mock.on(0, 3, MockBehavior::StartStuckWork).into_arc();
    let ctx = context(&tracker, mock, Duration::from_secs(1));

    let action = MultiFingerSwipeAction::swipe(SwipeDirection::Right, Duration::from_millis(50), 1).unwrap();
    let start = Instant::now();
    let err = action.perform(&square(), &ctx).await.unwrap_err();

    let ActionError::Timeout(timeout) = err else {
        panic!("expected timeout, got {err:?}");
    };
    assert_eq!(timeout.timeout, Duration::from_secs(1));
    assert!(start.elapsed() >= Duration::from_millis(1050));
    assert_eq!(timeout.pending.len(), 1);
    let pending = &timeout.pending[0];
    assert_eq!(pending.category, ActivityCategory::Network);
    assert_eq!(pending.label.as_deref(), Some("GET /never-responds"));
    assert!(pending.age >= Duration::from_secs(1));
    assert!(pending.age < Duration::from_millis(1100), "{:?}", pending.age);
}

#[tokio::test(start_paused = true)]
async fn idle_wait_can_be_cancelled() {
    let (tracker, mock) = tracker_and_mock();
    let mock = mock.on(0, 3, MockBehavior::StartStuckWork).into_arc();
    let ctx = context(&tracker, mock, Duration::from_secs(30));

    let token = ctx.monitor.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        token.cancel();
    });

    let action = MultiFingerSwipeAction::swipe(SwipeDirection::Up, Duration::from_millis(50), 1).unwrap();
    let start = Instant::now();
    let err = action.perform(&square(), &ctx).await.unwrap_err();
    assert!(matches!(err, ActionError::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(3));
    // The stuck request is still outstanding; cancellation leaves the ledger alone.
    assert_eq!(tracker.pending_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn delivery_failure_surfaces_as_injection_error() {
    let (tracker, mock) = tracker_and_mock();
    let mock = mock
        .on(2, 1, MockBehavior::Fail("event queue full".to_string()))
        .into_arc();
    let ctx = context(&tracker, mock.clone(), Duration::from_secs(5));

    let action = MultiFingerSwipeAction::swipe(SwipeDirection::Down, Duration::from_millis(100), 4).unwrap();
    let err = action.perform(&square(), &ctx).await.unwrap_err();
    assert!(matches!(
        err,
        ActionError::Injection(InjectionError::Delivery { finger: 2, sample: 1, .. })
    ));

    for finger in 0..4 {
        assert_eq!(mock.phases_of(finger).last(), Some(&TouchPhase::Cancelled), "finger {finger}");
    }
    assert!(tracker.is_idle());
}
