//! Configuration loading for the hamster activity tracker
//!
//! All sections are optional; missing keys fall back to the defaults below.
//!
//! ```toml
//! [sweeper]
//! interval_seconds = 60
//! hamster_inactivity_minutes = 60
//! sensor_inactivity_minutes = 30
//!
//! [report]
//! active_threshold = 0
//!
//! [alerts]
//! rate_limit_per_minute = 30
//! max_queue_size = 100
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Largest accepted inactivity threshold, about 100 years
pub const MAX_INACTIVITY_MINUTES: u64 = 100 * 366 * 24 * 60;

/// Top-level application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sweeper: SweeperConfig,
    pub report: ReportConfig,
    pub alerts: AlertsConfig,
}

/// Inactivity sweep schedule and staleness thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    /// Pause between two sweeps
    pub interval_seconds: u64,
    /// Hamsters idle longer than this are reported
    pub hamster_inactivity_minutes: u64,
    /// Working sensors silent longer than this are reported
    pub sensor_inactivity_minutes: u64,
}

/// Daily report projection settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// A hamster is active when its rounds exceed this value
    pub active_threshold: u64,
}

/// Alert dispatch limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub rate_limit_per_minute: usize,
    pub max_queue_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            hamster_inactivity_minutes: 60,
            sensor_inactivity_minutes: 30,
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 30,
            max_queue_size: 100,
        }
    }
}

impl SweeperConfig {
    /// Pause between sweeps as a std duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Hamster staleness threshold
    pub fn hamster_threshold(&self) -> chrono::Duration {
        minutes_capped(self.hamster_inactivity_minutes)
    }

    /// Sensor staleness threshold
    pub fn sensor_threshold(&self) -> chrono::Duration {
        minutes_capped(self.sensor_inactivity_minutes)
    }
}

/// Convert minutes to a duration, clamped to `MAX_INACTIVITY_MINUTES`
fn minutes_capped(minutes: u64) -> chrono::Duration {
    chrono::Duration::minutes(minutes.min(MAX_INACTIVITY_MINUTES) as i64)
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read,
    /// `ConfigError::TomlError` if it is not valid TOML for this schema, and
    /// `ConfigError::ValidationError` if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Same as `from_file`, minus the read error.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that all values are usable
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&str, bool); 5] = [
            ("sweeper.interval_seconds", self.sweeper.interval_seconds > 0),
            (
                "sweeper.hamster_inactivity_minutes",
                self.sweeper.hamster_inactivity_minutes > 0,
            ),
            (
                "sweeper.sensor_inactivity_minutes",
                self.sweeper.sensor_inactivity_minutes > 0,
            ),
            (
                "alerts.rate_limit_per_minute",
                self.alerts.rate_limit_per_minute > 0,
            ),
            ("alerts.max_queue_size", self.alerts.max_queue_size > 0),
        ];

        if let Some((key, _)) = checks.iter().find(|(_, valid)| !valid) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be greater than zero",
                key
            )));
        }

        let thresholds = [
            (
                "sweeper.hamster_inactivity_minutes",
                self.sweeper.hamster_inactivity_minutes,
            ),
            (
                "sweeper.sensor_inactivity_minutes",
                self.sweeper.sensor_inactivity_minutes,
            ),
        ];

        match thresholds
            .iter()
            .find(|(_, minutes)| *minutes > MAX_INACTIVITY_MINUTES)
        {
            Some((key, minutes)) => Err(ConfigError::ValidationError(format!(
                "{} = {} exceeds the maximum of {} minutes",
                key, minutes, MAX_INACTIVITY_MINUTES
            ))),
            None => Ok(()),
        }
    }
}
