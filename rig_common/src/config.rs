//! Daemon configuration loading.
//!
//! One TOML file configures the device, the watchdog defaults and the
//! registry persistence path. A missing file is not fatal; the daemon
//! falls back to defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the given path.
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// PWM expander device settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// I²C bus index (`/dev/i2c-N`).
    pub i2c_bus: u8,
    /// Device address on the bus.
    pub address: u16,
    /// PWM carrier frequency [Hz].
    pub frequency_hz: f64,
    /// Use the simulation backend instead of hardware.
    pub simulation: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            address: 0x40,
            frequency_hz: 50.0,
            simulation: false,
        }
    }
}

/// Watchdog defaults applied at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Arm the watchdog when the daemon starts.
    pub enabled: bool,
    /// Timeout before the recovery handler fires [ms].
    pub timeout_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 5000,
        }
    }
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// PWM expander settings.
    pub device: DeviceConfig,
    /// Watchdog defaults.
    pub watchdog: WatchdogConfig,
    /// Registry persistence file.
    pub registry_path: Option<PathBuf>,
}

impl RigConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, falling back to defaults when absent.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::FileNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    /// Semantic validation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.frequency_hz <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "device.frequency_hz must be positive, got {}",
                self.device.frequency_hz
            )));
        }
        if self.device.address > 0x7F {
            return Err(ConfigError::ValidationError(format!(
                "device.address {:#x} exceeds the 7-bit I2C range",
                self.device.address
            )));
        }
        if self.watchdog.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "watchdog.timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
