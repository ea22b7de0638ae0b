//! Runner configuration loaded from YAML.
//!
//! ```yaml
//! device_type: petkit_fountain
//! address: "A1:B2:C3:D4:E5:F6"
//! adapter_index: 0
//! scan_timeout_ms: 10000
//! poll_interval_secs: 60
//! engine:
//!   command_timeout_ms: 10000
//!   max_retries: 2
//! ```

use std::path::Path;
use std::time::Duration;

use petkit_engine::{EngineConfig, PETKIT_FOUNTAIN};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading or validating the runner configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for [`RunnerConfig`].
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// No device address in the file or on the command line.
    #[error("no device address configured")]
    MissingAddress,

    /// A value is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Everything the runner needs to reach and poll one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Registry name of the device implementation.
    pub device_type: String,

    /// Bluetooth address of the device.
    pub address: Option<String>,

    /// Which local Bluetooth adapter to use.
    pub adapter_index: usize,

    /// How long to scan for the device before giving up (milliseconds).
    pub scan_timeout_ms: u64,

    /// Pause between fetch cycles in `poll` (seconds).
    pub poll_interval_secs: u64,

    /// Engine timing.
    pub engine: EngineConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            device_type: PETKIT_FOUNTAIN.to_string(),
            address: None,
            adapter_index: 0,
            scan_timeout_ms: 10_000,
            poll_interval_secs: 60,
            engine: EngineConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Read a config file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(text: &str) -> ConfigResult<Self> {
        let config: RunnerConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.engine.command_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "engine.command_timeout_ms",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// The configured address, or an error if there is none.
    pub fn require_address(&self) -> ConfigResult<&str> {
        self.address.as_deref().ok_or(ConfigError::MissingAddress)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Override the address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Override the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_secs = interval.as_secs().max(1);
        self
    }
}
