//! Configuration loader and validator
//!
//! Loads tunnel configuration from TOML files in the configs/ directory.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::bus::constants::{BASE_PORT, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_IO_TIMEOUT_MS, LOOPBACK_HOST};
use crate::bus::types::BusIndex;
use crate::bus::socket::TcpConnector;
use crate::gamepad::bridge::BridgeSettings;
use crate::gamepad::registry::AdapterSignature;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bus: BusSettings,

    #[serde(default)]
    pub input: InputSettings,

    /// Devices treated as tunnel adapters
    #[serde(default = "default_adapters")]
    pub adapters: Vec<AdapterSignature>,
}

/// Tunnel transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusSettings {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port of bus A; B..D follow
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Read/write timeout, 0 disables it
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            base_port: default_base_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            io_timeout_ms: default_io_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSettings {
    /// LT + RT + Start opens the settings UI
    #[serde(default = "default_true")]
    pub combo_enabled: bool,

    #[serde(default)]
    pub trigger_threshold: u8,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            combo_enabled: true,
            trigger_threshold: 0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus: BusSettings::default(),
            input: InputSettings::default(),
            adapters: default_adapters(),
        }
    }
}

fn default_host() -> IpAddr { LOOPBACK_HOST }
fn default_base_port() -> u16 { BASE_PORT }
fn default_connect_timeout_ms() -> u64 { DEFAULT_CONNECT_TIMEOUT_MS }
fn default_io_timeout_ms() -> u64 { DEFAULT_IO_TIMEOUT_MS }
fn default_true() -> bool { true }
fn default_adapters() -> Vec<AdapterSignature> { vec![AdapterSignature::dreamconn()] }

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        info!("Loading configuration from: {}", path_ref.display());

        let content = std::fs::read_to_string(path_ref)?;
        Self::from_toml_str(&content)
    }

    /// Load default configuration from configs/default.toml
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load("configs/default.toml")
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;

        info!("✓ Config parsed successfully");
        debug!("  - Endpoint: {}:{}", config.bus.host, config.bus.base_port);
        debug!("  - Adapters: {}", config.adapters.len());

        config.validate()?;
        info!("✓ Config validation passed");

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.bus.host.is_loopback() {
            return Err(ConfigError::Invalid(format!(
                "host {} is not a loopback address",
                self.bus.host
            )));
        }

        if self.bus.base_port == 0 {
            return Err(ConfigError::Invalid("base_port must be non-zero".into()));
        }
        for bus in BusIndex::ALL {
            bus.tcp_port(self.bus.base_port)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }

        if self.bus.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connect_timeout_ms must be positive".into()
            ));
        }

        for adapter in &self.adapters {
            if adapter.name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "adapter signatures need a name".into()
                ));
            }
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.bus.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        match self.bus.io_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn tcp_connector(&self) -> TcpConnector {
        TcpConnector::new(self.connect_timeout(), self.io_timeout())
    }

    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            combo_enabled: self.input.combo_enabled,
            trigger_threshold: self.input.trigger_threshold,
        }
    }
}
