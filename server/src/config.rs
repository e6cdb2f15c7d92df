//! Server configuration, loaded from a TOML file.
//!
//! Every section and key is optional. Missing values take the defaults below, so an empty file
//! is a valid configuration for the simulated lab.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{field_ramp::FieldRampSettings, power_ramp::PowerRampSettings};

/// Errors when loading the configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete configuration of the server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ListenSettings,
    pub field: FieldRampSettings,
    pub power: PowerRampSettings,
    pub instruments: InstrumentsConfig,
}

/// The `[server]` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenSettings {
    /// Address to listen on.
    pub listen: String,
    /// Receive timeout while the log is active, in ms. Each timeout takes one sample.
    pub idle_poll_ms: u64,
    /// Size of a single socket read in bytes.
    pub read_chunk: usize,
}

impl Default for ListenSettings {
    fn default() -> Self {
        ListenSettings {
            listen: "0.0.0.0:6002".to_string(),
            idle_poll_ms: 1,
            read_chunk: 1024,
        }
    }
}

impl ListenSettings {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

/// The `[instruments]` section: where to find the hardware.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InstrumentsConfig {
    /// Magnet supply, `host:port`.
    pub supply_address: String,
    /// Gaussmeter serial port.
    pub gaussmeter_port: String,
    /// Power meter, `host:port`.
    pub meter_address: String,
    /// Microwave bridge serial port.
    pub bridge_port: String,
    /// Substring expected in the identity of the supply.
    pub supply_idn: Option<String>,
    /// Substring expected in the identity of the gaussmeter.
    pub gaussmeter_idn: Option<String>,
    /// Substring expected in the identity of the power meter.
    pub meter_idn: Option<String>,
    /// Substring expected in the identity of the bridge.
    pub bridge_idn: Option<String>,
    /// Frequency step of the dip search, in kHz.
    pub dip_step_khz: f64,
    /// I/O timeout of the TCP instruments, in ms.
    pub timeout_ms: u64,
}

impl Default for InstrumentsConfig {
    fn default() -> Self {
        InstrumentsConfig {
            supply_address: "192.168.0.10:5025".to_string(),
            gaussmeter_port: "/dev/ttyUSB0".to_string(),
            meter_address: "192.168.0.11:5025".to_string(),
            bridge_port: "/dev/ttyACM0".to_string(),
            supply_idn: None,
            gaussmeter_idn: None,
            meter_idn: None,
            bridge_idn: None,
            dip_step_khz: 100.0,
            timeout_ms: 3_000,
        }
    }
}

impl InstrumentsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ServerConfig {
    /// Read and validate the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// Reject values the controllers cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let field = &self.field;
        if !(field.current_per_gauss > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "field.current_per_gauss must be positive, got {}",
                field.current_per_gauss
            )));
        }
        if !(field.max_current > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "field.max_current must be positive, got {}",
                field.max_current
            )));
        }
        if !(field.tolerance_gauss > 0.0 && field.tolerance_gauss <= field.coarse_tolerance_gauss)
        {
            return Err(ConfigError::Invalid(format!(
                "field.tolerance_gauss ({}) must be positive and at most field.coarse_tolerance_gauss ({})",
                field.tolerance_gauss, field.coarse_tolerance_gauss
            )));
        }
        if field.max_tries == 0 {
            return Err(ConfigError::Invalid(
                "field.max_tries must be at least 1".to_string(),
            ));
        }
        if !(self.power.max_step_db > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "power.max_step_db must be positive, got {}",
                self.power.max_step_db
            )));
        }
        if self.server.idle_poll_ms == 0 {
            return Err(ConfigError::Invalid(
                "server.idle_poll_ms must be at least 1".to_string(),
            ));
        }
        if self.server.read_chunk == 0 {
            return Err(ConfigError::Invalid(
                "server.read_chunk must be at least 1".to_string(),
            ));
        }
        if !(self.instruments.dip_step_khz >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "instruments.dip_step_khz must be at least 1, got {}",
                self.instruments.dip_step_khz
            )));
        }
        Ok(())
    }
}

impl std::str::FromStr for ServerConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}
