//! Configuration file support for scalelink.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (SCALELINK_*)
//! 3. Local config file (./scalelink.toml)
//! 4. Global config file (~/.config/scalelink/config.toml)
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud = 9600
//!
//! [protocol]
//! layout = "addressed"
//! width = 14
//! address = "A"
//!
//! [ports]
//! "/dev/ttyUSB0" = "scale-1"
//! ```

use directories::ProjectDirs;
use log::{debug, warn};
use scalelink::{
    ChecksumPolicy, ExchangeConfig, FrameLayout, ListenerConfig, ProtocolVariant, RegistryConfig,
    SerialConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::CliError;

/// Local config file name.
pub const LOCAL_CONFIG_FILE: &str = "scalelink.toml";

/// Serial line settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SerialSection {
    /// Default port (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: Option<String>,
    /// Baud rate.
    pub baud: Option<u32>,
    /// Read timeout in milliseconds.
    pub read_timeout_ms: Option<u64>,
    /// Write timeout in milliseconds.
    pub write_timeout_ms: Option<u64>,
}

/// Frame and payload settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtocolSection {
    /// Frame layout.
    pub layout: Option<FrameLayout>,
    /// Payload width in bytes (8 or 14).
    pub width: Option<usize>,
    /// Device address, a single ASCII character.
    pub address: Option<String>,
    /// Reject frames with a bad checksum.
    pub strict_checksum: Option<bool>,
}

/// Request/response timing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExchangeSection {
    /// Wait after writing a command, in milliseconds.
    pub settle_delay_ms: Option<u64>,
    /// Upper bound on draining a response, in milliseconds.
    pub max_wait_ms: Option<u64>,
}

/// Listener timing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListenerSection {
    /// Poll period in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Wait between reconnect attempts in milliseconds.
    pub reconnect_backoff_ms: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Serial line settings.
    #[serde(default)]
    pub serial: SerialSection,
    /// Frame and payload settings.
    #[serde(default)]
    pub protocol: ProtocolSection,
    /// Request/response timing.
    #[serde(default)]
    pub exchange: ExchangeSection,
    /// Listener timing.
    #[serde(default)]
    pub listener: ListenerSection,
    /// System port name to cache key.
    #[serde(default)]
    pub ports: BTreeMap<String, String>,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path()
            && let Some(global_config) = Self::load_from_file(&global_path)
        {
            debug!("Loaded global config from {}", global_path.display());
            config.merge(global_config);
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "scalelink").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one; set values in `other` win.
    fn merge(&mut self, other: Self) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.serial.port, other.serial.port);
        take(&mut self.serial.baud, other.serial.baud);
        take(&mut self.serial.read_timeout_ms, other.serial.read_timeout_ms);
        take(&mut self.serial.write_timeout_ms, other.serial.write_timeout_ms);

        take(&mut self.protocol.layout, other.protocol.layout);
        take(&mut self.protocol.width, other.protocol.width);
        take(&mut self.protocol.address, other.protocol.address);
        take(&mut self.protocol.strict_checksum, other.protocol.strict_checksum);

        take(&mut self.exchange.settle_delay_ms, other.exchange.settle_delay_ms);
        take(&mut self.exchange.max_wait_ms, other.exchange.max_wait_ms);

        take(&mut self.listener.poll_interval_ms, other.listener.poll_interval_ms);
        take(
            &mut self.listener.reconnect_backoff_ms,
            other.listener.reconnect_backoff_ms,
        );

        self.ports.extend(other.ports);
    }

    /// Port-name to cache-key mapping, as handed to the registry.
    pub fn port_mappings(&self) -> HashMap<String, String> {
        self.ports
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Build the library configuration, validating file values.
    pub fn registry_config(&self) -> Result<RegistryConfig, CliError> {
        let mut serial = SerialConfig::default();
        if let Some(baud) = self.serial.baud {
            serial.baud_rate = baud;
        }
        if let Some(ms) = self.serial.read_timeout_ms {
            serial.read_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.serial.write_timeout_ms {
            serial.write_timeout = Duration::from_millis(ms);
        }

        let defaults = ProtocolVariant::default();
        let width = self
            .protocol
            .width
            .unwrap_or(defaults.payload_width);
        let variant = ProtocolVariant::new(
            self.protocol
                .layout
                .unwrap_or(defaults.layout),
            check_width(width).map_err(|e| CliError::Config(format!("protocol.width: {e}")))?,
        );

        let address = self
            .protocol
            .address
            .as_deref()
            .map(parse_address)
            .transpose()
            .map_err(|e| CliError::Config(format!("protocol.address: {e}")))?;

        let checksum_policy = if self
            .protocol
            .strict_checksum
            .unwrap_or(false)
        {
            ChecksumPolicy::Strict
        } else {
            ChecksumPolicy::Lenient
        };

        let mut exchange = ExchangeConfig::default();
        if let Some(ms) = self.exchange.settle_delay_ms {
            exchange.settle_delay = Duration::from_millis(ms);
        }
        exchange.max_wait = self
            .exchange
            .max_wait_ms
            .map(Duration::from_millis);

        let mut listener = ListenerConfig::default();
        if let Some(ms) = self.listener.poll_interval_ms {
            if ms == 0 {
                return Err(CliError::Config(
                    "listener.poll_interval_ms must be greater than 0".into(),
                ));
            }
            listener.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.listener.reconnect_backoff_ms {
            listener.reconnect_backoff = Duration::from_millis(ms);
        }

        Ok(RegistryConfig {
            serial,
            exchange,
            listener,
            variant,
            checksum_policy,
            address,
        })
    }
}

/// Accept one of the known payload widths.
pub fn check_width(width: usize) -> Result<usize, String> {
    match width {
        8 | 14 => Ok(width),
        other => Err(format!("unsupported payload width {other} (expected 8 or 14)")),
    }
}

/// Parse a device address given as a single ASCII character.
pub fn parse_address(s: &str) -> Result<u8, String> {
    match s.as_bytes() {
        [b] if b.is_ascii_graphic() => Ok(*b),
        _ => Err(format!(
            "invalid address '{s}' (expected a single printable ASCII character)"
        )),
    }
}
