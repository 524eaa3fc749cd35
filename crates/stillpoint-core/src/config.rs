//! Persistent configuration for stillpoint.
//!
//! Settings live in `~/.stillpoint/config.json`. Every field has a default,
//! so a missing or partial file is fine. A handful of timing knobs can also
//! be overridden from the environment, which is handy on slow CI machines.
//!
//! # Example
//!
//! ```no_run
//! use stillpoint_core::config::EngineConfig;
//!
//! // Load (returns defaults if file doesn't exist), then apply env overrides
//! let config = EngineConfig::load().with_env_overrides();
//! config.validate().expect("invalid stillpoint config");
//! println!("idle timeout: {:?}", config.idle_timeout());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

const CONFIG_FILENAME: &str = "config.json";

/// Returns the stillpoint directory (`~/.stillpoint/`).
///
/// Creates the directory if it doesn't exist.
pub fn stillpoint_dir() -> PathBuf {
    let dir = dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".stillpoint");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// A configuration value that cannot be used.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Tuning constants for touch path computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Samples per second along each finger's trajectory.
    pub sample_rate_hz: f64,
    /// Fewest samples per finger. Below this, recognizers see a tap.
    pub min_samples: usize,
    /// Distance between neighbouring fingers, in points.
    pub finger_spacing: f64,
    /// Fraction of each dimension kept clear at every edge of the element.
    pub safe_area_inset: f64,
    /// Shortest travel, in points, a finger may have.
    pub min_travel: f64,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 60.0,
            min_samples: 3,
            finger_spacing: 10.0,
            safe_area_inset: 0.1,
            min_travel: 1.0,
        }
    }
}

impl PathConfig {
    /// Checks that the values can produce a usable path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(invalid("sample_rate_hz", "must be a positive number"));
        }
        if self.min_samples < 2 {
            return Err(invalid("min_samples", "a path needs at least 2 samples"));
        }
        if !(self.finger_spacing.is_finite() && self.finger_spacing > 0.0) {
            return Err(invalid("finger_spacing", "must be a positive number"));
        }
        if !(self.safe_area_inset > 0.0 && self.safe_area_inset < 0.5) {
            return Err(invalid("safe_area_inset", "must be in (0, 0.5)"));
        }
        if !(self.min_travel.is_finite() && self.min_travel > 0.0) {
            return Err(invalid("min_travel", "must be a positive number"));
        }
        Ok(())
    }
}

/// Persistent engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long an action waits for the app to become idle.
    pub idle_timeout_ms: u64,
    /// Upper bound between idle checks when no change notification arrives.
    pub idle_poll_interval_ms: u64,
    /// Touch path tuning.
    pub path: PathConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 30_000,
            idle_poll_interval_ms: 10,
            path: PathConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load config from `~/.stillpoint/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        let path = stillpoint_dir().join(CONFIG_FILENAME);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unparseable config");
                Self::default()
            }
        }
    }

    /// Save config to `~/.stillpoint/config.json`.
    pub fn save(&self) -> std::io::Result<()> {
        let path = stillpoint_dir().join(CONFIG_FILENAME);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }

    /// Applies `STILLPOINT_IDLE_TIMEOUT_MS`, `STILLPOINT_IDLE_POLL_MS` and
    /// `STILLPOINT_SAMPLE_RATE_HZ` when set to a parseable value.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("STILLPOINT_IDLE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.idle_timeout_ms = v;
        }
        if let Some(v) = lookup("STILLPOINT_IDLE_POLL_MS").and_then(|v| v.parse().ok()) {
            self.idle_poll_interval_ms = v;
        }
        if let Some(v) = lookup("STILLPOINT_SAMPLE_RATE_HZ").and_then(|v| v.parse().ok()) {
            self.path.sample_rate_hz = v;
        }
        self
    }

    /// Checks every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_poll_interval_ms == 0 {
            return Err(invalid("idle_poll_interval_ms", "must be at least 1"));
        }
        self.path.validate()
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }
}
