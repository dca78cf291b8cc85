//! Simulation configuration.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Default minimal delay between consecutive task scheduler updates.
pub const DEFAULT_MIN_TIME_BETWEEN_EVENTS: f64 = 0.1;

/// Holds raw simulation config parsed from JSON document.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Default)]
struct RawSimulationConfig {
    pub min_time_between_events: Option<f64>,
    pub cpu_oversubscription: Option<bool>,
    pub disk_oversubscription: Option<bool>,
    pub fail_on_unreachable_data: Option<bool>,
}

/// Error returned on invalid configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    message: String,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "invalid config: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Represents simulation configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SimulationConfig {
    /// Minimal delay between consecutive task scheduler updates.
    pub min_time_between_events: f64,
    /// Whether hosts accept VMs requesting more CPU than available.
    pub cpu_oversubscription: bool,
    /// Whether disks accept VMs requesting more IOPS than available.
    pub disk_oversubscription: bool,
    /// Whether tasks with data not reachable from VM fail at submission.
    /// Otherwise such tasks stay in execution with zero I/O throughput.
    pub fail_on_unreachable_data: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::from_raw(RawSimulationConfig::default())
    }
}

impl SimulationConfig {
    /// Creates simulation config by reading parameter values from JSON string
    /// (uses default values if some parameters are absent).
    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let raw: RawSimulationConfig = serde_json::from_str(data).map_err(|e| ConfigError {
            message: e.to_string(),
        })?;
        let config = Self::from_raw(raw);
        config.validate()?;
        Ok(config)
    }

    /// Checks parameter values, which is needed for configs built without [`from_json`](Self::from_json).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_time_between_events.is_finite() || self.min_time_between_events <= 0. {
            return Err(ConfigError {
                message: format!(
                    "min_time_between_events should be positive, got {}",
                    self.min_time_between_events
                ),
            });
        }
        Ok(())
    }

    fn from_raw(raw: RawSimulationConfig) -> Self {
        Self {
            min_time_between_events: raw.min_time_between_events.unwrap_or(DEFAULT_MIN_TIME_BETWEEN_EVENTS),
            cpu_oversubscription: raw.cpu_oversubscription.unwrap_or(false),
            disk_oversubscription: raw.disk_oversubscription.unwrap_or(true),
            fail_on_unreachable_data: raw.fail_on_unreachable_data.unwrap_or(true),
        }
    }
}
