//! Configuration for the navigation engine.
//!
//! Loaded from TOML; every field has a default so an empty document
//! (or `NavigatorConfig::default()`) gives the stock behaviour.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{NavError, Result};

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NavigatorConfig {
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub directions: DirectionsConfig,
}

/// Distance thresholds driving the state machine
#[derive(Clone, Debug, Deserialize)]
pub struct ThresholdConfig {
    /// Distance to the step end that advances to the next step (default: 30.0)
    #[serde(default = "default_step_advance")]
    pub step_advance_m: f64,

    /// Distance from both step endpoints that marks the user off-route (default: 100.0)
    #[serde(default = "default_off_route")]
    pub off_route_m: f64,

    /// Distance to the destination that counts as arrival (default: 20.0)
    #[serde(default = "default_arrival")]
    pub arrival_m: f64,
}

/// Location tracking settings
#[derive(Clone, Debug, Deserialize)]
pub struct TrackingConfig {
    /// Minimum time between delivered samples in milliseconds (default: 2000)
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    /// Minimum movement between delivered samples in meters (default: 5.0)
    #[serde(default = "default_min_distance")]
    pub min_distance_m: f64,

    /// Bounded wait for the initial fix in milliseconds (default: 10000)
    #[serde(default = "default_fix_timeout")]
    pub fix_timeout_ms: u64,

    /// Periodic progress check interval in milliseconds (default: 5000)
    #[serde(default = "default_progress_check")]
    pub progress_check_interval_ms: u64,
}

/// Directions provider settings
#[derive(Clone, Debug, Deserialize)]
pub struct DirectionsConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    /// Request timeout in milliseconds (default: 15000)
    #[serde(default = "default_request_timeout")]
    pub timeout_ms: u64,

    /// Instruction language, passed through to the provider
    #[serde(default)]
    pub language: Option<String>,
}

fn default_step_advance() -> f64 {
    30.0
}
fn default_off_route() -> f64 {
    100.0
}
fn default_arrival() -> f64 {
    20.0
}
fn default_min_interval() -> u64 {
    2000
}
fn default_min_distance() -> f64 {
    5.0
}
fn default_fix_timeout() -> u64 {
    10_000
}
fn default_progress_check() -> u64 {
    5000
}
fn default_base_url() -> String {
    "https://maps.googleapis.com/maps/api/directions/json".to_string()
}
fn default_request_timeout() -> u64 {
    15_000
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            step_advance_m: default_step_advance(),
            off_route_m: default_off_route(),
            arrival_m: default_arrival(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval(),
            min_distance_m: default_min_distance(),
            fix_timeout_ms: default_fix_timeout(),
            progress_check_interval_ms: default_progress_check(),
        }
    }
}

impl Default for DirectionsConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            timeout_ms: default_request_timeout(),
            language: None,
        }
    }
}

impl TrackingConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn fix_timeout(&self) -> Duration {
        Duration::from_millis(self.fix_timeout_ms)
    }

    pub fn progress_check_interval(&self) -> Duration {
        Duration::from_millis(self.progress_check_interval_ms)
    }
}

impl DirectionsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl NavigatorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: NavigatorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            NavError::Config(format!("{}: {e}", path.as_ref().display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        for (name, value) in [
            ("step_advance_m", t.step_advance_m),
            ("off_route_m", t.off_route_m),
            ("arrival_m", t.arrival_m),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(NavError::Config(format!("{name} must be positive, got {value}")));
            }
        }

        let tr = &self.tracking;
        if !tr.min_distance_m.is_finite() || tr.min_distance_m < 0.0 {
            return Err(NavError::Config("min_distance_m must be non-negative".into()));
        }
        if tr.fix_timeout_ms == 0 || tr.progress_check_interval_ms == 0 {
            return Err(NavError::Config("tracking intervals must be non-zero".into()));
        }
        if self.directions.timeout_ms == 0 {
            return Err(NavError::Config("directions timeout must be non-zero".into()));
        }
        Ok(())
    }
}
