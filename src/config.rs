//! # Board Profile Configuration
//!
//! A board profile describes the simulated board the `boardio` binary drives
//! and the logging it should produce.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [board]
//! name = "uno"
//! sampling_interval_ms = 19
//!
//! [logging]
//! level = "debug"
//!
//! [[pins]]
//! supported_modes = ["input", "output", "pwm"]
//! mode = "output"
//! report = 0
//! analog_channel = 127
//!
//! [sim]
//! onewire_devices = [[0x28, 0xff, 0x4c, 0x2a, 0x61, 0x16, 0x04, 0x3e]]
//! ```
//!
//! Pin fields are optional on purpose: an incomplete profile loads fine and is
//! rejected by the board's validator at the readiness transition instead.

use crate::pins::PinDescriptor;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pins: Vec<PinDescriptor>,
    #[serde(default)]
    pub sim: SimConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BoardConfig {
    #[serde(default = "default_board_name")]
    pub name: String,
    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u32,
    #[serde(default)]
    pub i2c_delay_us: u32,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            name: default_board_name(),
            sampling_interval_ms: default_sampling_interval_ms(),
            i2c_delay_us: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Only errors are logged when set.
    #[serde(default)]
    pub quiet: bool,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            quiet: false,
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    pub fn max_level(&self) -> Result<tracing::Level, ConfigError> {
        if self.quiet {
            return Ok(tracing::Level::ERROR);
        }
        tracing::Level::from_str(&self.level)
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.level)))
    }
}

/// Behaviour of the simulated board.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimConfig {
    #[serde(default)]
    pub onewire_devices: Vec<[u8; 8]>,
    #[serde(default = "default_onewire_pin")]
    pub onewire_pin: u8,
    /// First byte of every simulated I2C/OneWire read; later bytes count up from it.
    #[serde(default = "default_fill_byte")]
    pub fill_byte: u8,
    #[serde(default = "default_firmware_name")]
    pub firmware_name: String,
    #[serde(default = "default_firmware_version")]
    pub firmware_version: (u8, u8),
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            onewire_devices: Vec::new(),
            onewire_pin: default_onewire_pin(),
            fill_byte: default_fill_byte(),
            firmware_name: default_firmware_name(),
            firmware_version: default_firmware_version(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.board.name.trim().is_empty() {
            return Err(ConfigError::Invalid("board name cannot be empty".to_string()));
        }
        if self.board.sampling_interval_ms < 10 {
            return Err(ConfigError::Invalid(format!(
                "sampling_interval_ms must be at least 10, got {}",
                self.board.sampling_interval_ms
            )));
        }
        self.logging.max_level()?;
        Ok(())
    }
}

fn default_board_name() -> String { "board".to_string() }
fn default_sampling_interval_ms() -> u32 { 19 }
fn default_log_level() -> String { "info".to_string() }
fn default_onewire_pin() -> u8 { 2 }
fn default_fill_byte() -> u8 { 0xA5 }
fn default_firmware_name() -> String { "boardio-sim".to_string() }
fn default_firmware_version() -> (u8, u8) { (2, 5) }

pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path, e);
        ConfigError::Io(e)
    })?;
    let config: Config = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}
