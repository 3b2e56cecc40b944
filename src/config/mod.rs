//! Configuration module
//!
//! Handles loading and saving fakekey configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::device::{CapabilityRegistrar, Timing};
use crate::input::{DeviceIdentity, EventKind, KeyCode, BUS_USB, DEFAULT_UINPUT_NODE};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Unknown key in [capabilities]: {0}")]
    UnknownKey(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Virtual device settings
    #[serde(default)]
    pub device: DeviceConfig,

    /// Session timing
    #[serde(default)]
    pub timing: TimingConfig,

    /// Declared key set
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// uinput control node
    #[serde(default = "default_node")]
    pub node: PathBuf,
    /// Name shown by host tooling
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_bus_type")]
    pub bus_type: u16,
    #[serde(default = "default_vendor")]
    pub vendor: u16,
    #[serde(default = "default_product")]
    pub product: u16,
    #[serde(default = "default_version")]
    pub version: u16,
}

fn default_node() -> PathBuf {
    PathBuf::from(DEFAULT_UINPUT_NODE)
}

fn default_name() -> String {
    "Example device".to_string()
}

fn default_bus_type() -> u16 {
    BUS_USB
}

fn default_vendor() -> u16 {
    0x1234
}

fn default_product() -> u16 {
    0x5678
}

fn default_version() -> u16 {
    1
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            node: default_node(),
            name: default_name(),
            bus_type: default_bus_type(),
            vendor: default_vendor(),
            product: default_product(),
            version: default_version(),
        }
    }
}

/// Timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Wait after creation (ms)
    #[serde(default = "default_settle")]
    pub settle_ms: u64,
    /// Wait before destruction (ms)
    #[serde(default = "default_drain")]
    pub drain_ms: u64,
    /// Sleep after an emission that asks for it (ms)
    #[serde(default = "default_step")]
    pub step_ms: u64,
}

fn default_settle() -> u64 {
    1000
}

fn default_drain() -> u64 {
    2000
}

fn default_step() -> u64 {
    200
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle(),
            drain_ms: default_drain(),
            step_ms: default_step(),
        }
    }
}

/// Capability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    /// Key names to declare (default: the standard keyboard set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("fakekey/config.toml")),
            Some(PathBuf::from("./fakekey.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                tracing::debug!("Using configuration at {}", path.display());
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            bus_type: self.device.bus_type,
            vendor: self.device.vendor,
            product: self.device.product,
            version: self.device.version,
            name: self.device.name.clone(),
        }
    }

    pub fn timing(&self) -> Timing {
        Timing {
            settle: Duration::from_millis(self.timing.settle_ms),
            drain: Duration::from_millis(self.timing.drain_ms),
            step: Duration::from_millis(self.timing.step_ms),
        }
    }

    /// Capability set to configure the device with
    pub fn capabilities(&self) -> ConfigResult<CapabilityRegistrar> {
        let Some(names) = &self.capabilities.keys else {
            return Ok(CapabilityRegistrar::keyboard());
        };

        let keys = names
            .iter()
            .map(|name| KeyCode::from_name(name).ok_or_else(|| ConfigError::UnknownKey(name.clone())))
            .collect::<ConfigResult<Vec<_>>>()?;

        let mut registrar = CapabilityRegistrar::new();
        registrar
            .declare_event_type(EventKind::Key)
            .declare_event_type(EventKind::Sync)
            .declare_keys(keys);
        Ok(registrar)
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        device: DeviceConfig {
            name: "fakekey keyboard".to_string(),
            ..Default::default()
        },
        capabilities: CapabilitiesConfig {
            keys: Some(
                ["KEY_LEFTSHIFT", "KEY_LEFTALT", "KEY_GRAVE", "KEY_U", "KEY_SPACE"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
        },
        ..Default::default()
    };

    Ok(toml::to_string_pretty(&config)?)
}
