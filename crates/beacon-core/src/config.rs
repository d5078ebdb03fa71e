//! Application configuration management.
//!
//! Configuration is layered with the `config` crate:
//!
//! 1. Built-in defaults (every field has one)
//! 2. An optional TOML file (`BEACON_CONFIG`, else the platform default path)
//! 3. Environment variables prefixed with `BEACON_`, using `__` between
//!    section and key, e.g. `BEACON_SCAN__STALE_AFTER_SECS=10`
//!
//! The merged result is validated before it is handed out; every problem is
//! reported, not just the first.

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::advertising::{
    AdvertisingParameters, DEFAULT_MANUFACTURER_ID, DEFAULT_OFF_FRAME, DEFAULT_ON_FRAME,
    MAX_DEVICE_NAME_LEN, MAX_FRAME_LEN,
};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "BEACON_CONFIG";

const ENV_PREFIX: &str = "BEACON";

static MAC_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").expect("MAC address pattern is valid")
});

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read, parsed, or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// One field holds an invalid value.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted path of the field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} configuration values are invalid", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Advertisement content and radio parameters.
    pub advertising: AdvertisingConfig,
    /// Scan aggregation.
    pub scan: ScanConfig,
    /// Host platform capabilities.
    pub platform: PlatformConfig,
    /// The simulated radio.
    pub simulation: SimulationConfig,
    /// HTTP server.
    pub server: ServerConfig,
}

/// `[advertising]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvertisingConfig {
    /// Local name used when the caller does not supply one.
    pub device_name: String,
    /// Service UUIDs used when the caller does not supply any.
    pub service_uuids: Vec<Uuid>,
    /// Company identifier of the manufacturer-specific data.
    pub manufacturer_id: u16,
    /// Hex frame broadcast while data is on.
    pub on_frame: String,
    /// Hex frame broadcast while data is off.
    pub off_frame: String,
    /// Push the off frame in place before stopping an advertisement.
    pub send_off_frame_on_stop: bool,
    /// Radio parameters of the advertising set.
    pub parameters: AdvertisingParameters,
}

impl Default for AdvertisingConfig {
    fn default() -> Self {
        Self {
            device_name: "beacon".to_string(),
            service_uuids: Vec::new(),
            manufacturer_id: DEFAULT_MANUFACTURER_ID,
            on_frame: DEFAULT_ON_FRAME.to_string(),
            off_frame: DEFAULT_OFF_FRAME.to_string(),
            send_off_frame_on_stop: true,
            parameters: AdvertisingParameters::default(),
        }
    }
}

/// `[scan]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Devices not seen for this long drop out of results.
    pub stale_after_secs: u64,
    /// Scan timeout applied when the caller does not give one. `None` scans
    /// until stopped.
    pub default_timeout_secs: Option<u64>,
    /// Capacity of the discovery event channel.
    pub event_buffer: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 30,
            default_timeout_secs: None,
            event_buffer: 256,
        }
    }
}

impl ScanConfig {
    /// The staleness horizon.
    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// The default scan timeout.
    #[must_use]
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs.map(Duration::from_secs)
    }
}

/// `[platform]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Whether the host gates Bluetooth behind runtime permissions. When
    /// `false` every permission counts as granted.
    pub has_permission_subsystem: bool,
}

/// `[simulation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Whether the simulated radio starts powered.
    pub powered: bool,
    /// How often each simulated peer is sighted while scanning.
    pub sighting_interval_ms: u64,
    /// Peers the simulated radio reports.
    pub peers: Vec<SimulatedPeer>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            powered: true,
            sighting_interval_ms: 1000,
            peers: Vec::new(),
        }
    }
}

/// A peer reported by the simulated radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedPeer {
    /// Device address.
    pub address: String,
    /// Advertised name.
    #[serde(default)]
    pub name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: i16,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_address: String,
    /// Port to listen on.
    pub port: u16,
    /// Production logging (JSON files plus compact stdout).
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            production: false,
        }
    }
}

impl Config {
    /// Load configuration from the default file location and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(default_config_path().as_deref())
    }

    /// Load configuration from `path` (if it exists) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load_from(path: Option<&Path>) -> ConfigResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field, collecting all problems.
    ///
    /// # Errors
    ///
    /// Returns the single problem found, or
    /// [`ConfigError::MultipleValidationErrors`] when there are several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |field: &str, message: String| {
            errors.push(ConfigError::ValidationError {
                field: field.to_string(),
                message,
            });
        };

        let name = &self.advertising.device_name;
        if name.trim().is_empty() {
            invalid("advertising.device_name", "cannot be empty".to_string());
        } else if name.len() > MAX_DEVICE_NAME_LEN {
            invalid(
                "advertising.device_name",
                format!("must be at most {MAX_DEVICE_NAME_LEN} bytes"),
            );
        }

        for (field, frame) in [
            ("advertising.on_frame", &self.advertising.on_frame),
            ("advertising.off_frame", &self.advertising.off_frame),
        ] {
            match hex::decode(frame) {
                Ok(bytes) if bytes.is_empty() => invalid(field, "cannot be empty".to_string()),
                Ok(bytes) if bytes.len() > MAX_FRAME_LEN => invalid(
                    field,
                    format!("is {} bytes, at most {MAX_FRAME_LEN} allowed", bytes.len()),
                ),
                Ok(_) => {}
                Err(e) => invalid(field, format!("not a valid hex frame: {e}")),
            }
        }

        if self.scan.stale_after_secs == 0 {
            invalid("scan.stale_after_secs", "must be greater than zero".to_string());
        }
        if self.scan.default_timeout_secs == Some(0) {
            invalid(
                "scan.default_timeout_secs",
                "must be greater than zero; omit it to scan until stopped".to_string(),
            );
        }
        if self.scan.event_buffer == 0 {
            invalid("scan.event_buffer", "must be greater than zero".to_string());
        }

        if self.simulation.sighting_interval_ms == 0 {
            invalid(
                "simulation.sighting_interval_ms",
                "must be greater than zero".to_string(),
            );
        }
        for peer in &self.simulation.peers {
            if !is_valid_mac_address(&peer.address) {
                invalid(
                    "simulation.peers.address",
                    format!("'{}' is not in XX:XX:XX:XX:XX:XX format", peer.address),
                );
            }
            if !is_valid_rssi(peer.rssi) {
                invalid(
                    "simulation.peers.rssi",
                    format!("{} dBm is outside -127..=20", peer.rssi),
                );
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Path of the configuration file.
///
/// `BEACON_CONFIG` wins. Otherwise `/etc/beacon/config.toml` on Linux and
/// the platform config directory elsewhere.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    #[cfg(target_os = "linux")]
    {
        Some(PathBuf::from("/etc/beacon/config.toml"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "beacon")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Whether `address` is a colon-separated 48-bit Bluetooth address.
#[must_use]
pub fn is_valid_mac_address(address: &str) -> bool {
    MAC_ADDRESS.is_match(address)
}

/// Whether `rssi` is a plausible received signal strength in dBm.
#[must_use]
pub fn is_valid_rssi(rssi: i16) -> bool {
    (-127..=20).contains(&rssi)
}
