//! # stillpoint-core
//!
//! In-app UI test synchronization and multi-touch gesture synthesis.
//!
//! This crate lets a test drive an application deterministically: it injects
//! realistic touch gestures on UI elements and knows when the application has
//! finished reacting to them before the next step runs.
//!
//! ## Modules
//!
//! - [`tracker`] - Ledger of outstanding asynchronous app activity
//! - [`idle`] - Waiting until that ledger is empty, with timeout and cancellation
//! - [`element`] - Screen geometry and the [`element::TargetElement`] seam
//! - [`gesture`] - Validated swipe specifications
//! - [`path`] - Per-finger touch trajectories
//! - [`injector`] - Multi-finger event delivery through a platform [`injector::TouchDeliverer`]
//! - [`action`] - Gesture actions that inject and then wait for idleness
//! - [`engine`] - The per-run service owning the tracker, with action history
//! - [`config`] - Persistent configuration and environment overrides
//!
//! ## Logging
//!
//! All diagnostics go through `tracing`. The crate never installs a
//! subscriber; embedders choose how to collect spans and events.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use stillpoint_core::idle::IdlenessMonitor;
//! use stillpoint_core::tracker::{ActivityCategory, ActivityTracker};
//!
//! let tracker = Arc::new(ActivityTracker::new());
//! let monitor = IdlenessMonitor::new(Arc::clone(&tracker));
//!
//! let request = tracker.track(ActivityCategory::Network);
//! let network = Arc::clone(&tracker);
//! std::thread::spawn(move || {
//!     std::thread::sleep(Duration::from_millis(20));
//!     network.untrack(request).expect("tracked above");
//! });
//!
//! monitor.block_until_idle(Duration::from_secs(5)).expect("app settles");
//! assert!(tracker.is_idle());
//! ```

pub mod action;
pub mod config;
pub mod element;
pub mod engine;
pub mod gesture;
pub mod idle;
pub mod injector;
pub mod path;
pub mod tracker;
