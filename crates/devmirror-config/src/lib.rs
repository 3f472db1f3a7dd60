//! Configuration management for devmirror
//!
//! Configuration is layered: built-in defaults, then a YAML, TOML or JSON
//! file, then `DEVMIRROR__`-prefixed environment variables. The result is
//! validated before it is handed out.
//!
//! # Examples
//!
//! ```rust
//! use devmirror_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("devmirror.yaml")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Bridge server on port {}", config.adb.port);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use devmirror_types::FolderConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Prefix of environment variables overriding configuration values
pub const ENV_PREFIX: &str = "DEVMIRROR";

/// Main configuration structure for devmirror
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Debug bridge server connection
    #[serde(default)]
    pub adb: AdbConfig,
    /// Local write behaviour
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Devices to back up and their folder configurations
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    /// Folder configurations of `device_id`, or `None` for an unknown device
    pub fn folders_for(&self, device_id: &str) -> Option<&[FolderConfig]> {
        self.devices
            .iter()
            .find(|device| device.id == device_id)
            .map(|device| device.folders.as_slice())
    }

    /// Identifiers of every configured device, in configuration order
    pub fn device_ids(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|device| device.id.as_str())
    }
}

/// Debug bridge server connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdbConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Seconds allowed for connecting and opening a sync session
    pub connect_timeout_secs: u64,
}

impl AdbConfig {
    /// Connection timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5037,
            connect_timeout_secs: 10,
        }
    }
}

/// Local write settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Buffer capacity for destination file writes
    pub write_buffer_size: usize,
}

impl TransferConfig {
    /// Smallest accepted write buffer (4KB)
    pub const MIN_WRITE_BUFFER: usize = 4 * 1024;
    /// Largest accepted write buffer (64MB)
    pub const MAX_WRITE_BUFFER: usize = 64 * 1024 * 1024;
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            write_buffer_size: 64 * 1024,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Also write logs to this file
    pub log_file: Option<PathBuf>,
    /// Enable JSON formatting
    pub json_format: bool,
    /// Enable colored output
    pub colored_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
            json_format: false,
            colored_output: true,
        }
    }
}

/// Folder configurations of one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device serial as reported by the debug bridge
    pub id: String,
    /// Folders to mirror, processed in order
    #[serde(default)]
    pub folders: Vec<FolderConfig>,
}

impl DeviceConfig {
    /// Create a device configuration
    pub fn new<S: Into<String>>(id: S, folders: Vec<FolderConfig>) -> Self {
        Self {
            id: id.into(),
            folders,
        }
    }
}
