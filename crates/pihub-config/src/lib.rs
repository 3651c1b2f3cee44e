//! Configuration management for the PiHub daemon.
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. `PIHUB_*` environment variables (highest precedence)
//! 2. `pihub.toml` (explicit path or discovered in the working directory)
//! 3. Built-in defaults (lowest precedence)

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

mod error;
mod loader;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Main PiHub configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HubConfig {
    pub server: ServerSection,
    pub dispatcher: DispatcherSection,
    pub hardware: HardwareSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSection {
    /// TCP port the hub listens on.
    pub port: u16,
    /// Maximum number of clients connected at the same time.
    pub max_clients: usize,
    /// Maximum number of pending connection requests.
    pub max_pending: u32,
    /// Size of the receive buffer for client commands.
    pub recv_buffer: usize,
    /// Network interface reported by `server net`.
    pub net_interface: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: 65002,
            max_clients: 5,
            max_pending: 10,
            recv_buffer: 128,
            net_interface: "wlan0".to_string(),
        }
    }
}

impl ServerSection {
    /// The socket address the daemon binds to (all interfaces).
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatcherSection {
    /// Token delimiter in commands; every byte acts as a separator.
    pub delimiter: String,
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            delimiter: " ".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HardwareSection {
    /// Index N of the `/dev/i2c-N` adapter the sensors hang off.
    pub i2c_adapter: u32,
    /// Override for the GPIO sysfs base directory; `None` means the
    /// live `/sys/class/gpio` tree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpio_base: Option<PathBuf>,
    /// Environmental sensors attached to the board.
    pub sensors: Vec<SensorDef>,
}

impl Default for HardwareSection {
    fn default() -> Self {
        Self {
            i2c_adapter: 1,
            gpio_base: None,
            sensors: vec![SensorDef {
                addr: 0x76,
                bus: BusKind::I2c,
            }],
        }
    }
}

/// One configured sensor: its device address and the bus it sits on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SensorDef {
    /// Device address (7 lower bits for I²C).
    pub addr: u8,
    /// Transport the sensor is wired to.
    #[serde(default)]
    pub bus: BusKind,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BusKind {
    #[default]
    I2c,
    Spi,
}

impl HubConfig {
    /// Load configuration from default locations.
    pub fn load() -> ConfigResult<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        ConfigLoader::new().with_path(path).load()
    }

    /// Checks field ranges; called by the loader after merging.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.max_clients == 0 {
            return Err(ConfigError::Validation(
                "server.max_clients must be positive".to_string(),
            ));
        }
        if self.server.max_pending == 0 {
            return Err(ConfigError::Validation(
                "server.max_pending must be positive".to_string(),
            ));
        }
        if self.server.recv_buffer == 0 {
            return Err(ConfigError::Validation(
                "server.recv_buffer must be positive".to_string(),
            ));
        }
        if self.dispatcher.delimiter.is_empty() || self.dispatcher.delimiter.len() > 8 {
            return Err(ConfigError::Validation(
                "dispatcher.delimiter must be 1..=8 bytes".to_string(),
            ));
        }
        for sensor in &self.hardware.sensors {
            if sensor.bus == BusKind::I2c && sensor.addr > 0x7F {
                return Err(ConfigError::Validation(format!(
                    "sensor address {:#04x} is not a 7-bit I2C address",
                    sensor.addr
                )));
            }
        }
        Ok(())
    }
}
