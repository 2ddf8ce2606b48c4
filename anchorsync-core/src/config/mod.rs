//! Node configuration
//!
//! Defaults cover a LAN session out of the box. A TOML file can replace
//! any section, and `ANCHORSYNC_<SECTION>_<KEY>` environment variables
//! override individual keys on top of either.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::core_codec::{MAX_ANCHOR_BLOB_SIZE, MAX_WORLD_MAP_SIZE};

mod error;

pub use error::ConfigError;

/// Service name used when none is configured
pub const DEFAULT_SERVICE_NAME: &str = "arsketchsession";

/// File name of the persisted world map inside the data directory
pub const DEFAULT_MAP_FILE_NAME: &str = "mymap.arexperience";

const MAX_SERVICE_NAME_LEN: usize = 15;

/// Main node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transport: TransportConfig,
    pub discovery: DiscoveryConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Peer transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// TCP address to accept peers on
    pub listen_address: SocketAddr,

    /// Service name peers must share (1-15 chars, lowercase, digits, hyphen)
    pub service_name: String,

    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,

    /// Largest application message accepted from a peer
    pub max_message_size: usize,

    /// Outbound messages buffered per peer before sends are dropped
    pub send_queue_capacity: usize,

    pub event_channel_capacity: usize,
}

/// UDP beacon discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub enabled: bool,

    pub bind_address: IpAddr,

    /// UDP port beacons are sent to and received on
    pub port: u16,

    pub broadcast_address: IpAddr,

    #[serde(with = "humantime_serde")]
    pub beacon_interval: Duration,
}

/// Session reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Send our own anchors to peers that join after they were created
    pub replay_anchors_on_connect: bool,

    pub command_channel_capacity: usize,

    pub event_channel_capacity: usize,
}

/// Map persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,

    pub map_file_name: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    pub json_format: bool,

    pub with_timestamp: bool,

    pub with_target: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 7420),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            max_message_size: MAX_WORLD_MAP_SIZE,
            send_queue_capacity: 32,
            event_channel_capacity: 256,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 7421,
            broadcast_address: IpAddr::V4(Ipv4Addr::BROADCAST),
            beacon_interval: Duration::from_secs(2),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            replay_anchors_on_connect: true,
            command_channel_capacity: 256,
            event_channel_capacity: 256,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            map_file_name: DEFAULT_MAP_FILE_NAME.to_string(),
        }
    }
}

impl StorageConfig {
    /// Full path of the persisted world map
    pub fn map_path(&self) -> PathBuf {
        self.data_dir.join(&self.map_file_name)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime_serde::re::humantime::parse_duration(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: ANCHORSYNC_<SECTION>_<KEY>
    /// Example: ANCHORSYNC_TRANSPORT_LISTEN_ADDRESS=0.0.0.0:7420
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let mut config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `ANCHORSYNC_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        macro_rules! set {
            (duration $key:literal, $field:expr) => {
                if let Some(raw) = lookup($key) {
                    $field = parse_duration($key, &raw)?;
                }
            };
            ($key:literal, $field:expr) => {
                if let Some(raw) = lookup($key) {
                    $field = parse_value($key, &raw)?;
                }
            };
        }

        // Transport
        set!("ANCHORSYNC_TRANSPORT_LISTEN_ADDRESS", self.transport.listen_address);
        set!("ANCHORSYNC_TRANSPORT_SERVICE_NAME", self.transport.service_name);
        set!(duration "ANCHORSYNC_TRANSPORT_CONNECT_TIMEOUT", self.transport.connect_timeout);
        set!(duration "ANCHORSYNC_TRANSPORT_HANDSHAKE_TIMEOUT", self.transport.handshake_timeout);
        set!("ANCHORSYNC_TRANSPORT_MAX_MESSAGE_SIZE", self.transport.max_message_size);
        set!("ANCHORSYNC_TRANSPORT_SEND_QUEUE_CAPACITY", self.transport.send_queue_capacity);
        set!(
            "ANCHORSYNC_TRANSPORT_EVENT_CHANNEL_CAPACITY",
            self.transport.event_channel_capacity
        );

        // Discovery
        set!("ANCHORSYNC_DISCOVERY_ENABLED", self.discovery.enabled);
        set!("ANCHORSYNC_DISCOVERY_BIND_ADDRESS", self.discovery.bind_address);
        set!("ANCHORSYNC_DISCOVERY_PORT", self.discovery.port);
        set!("ANCHORSYNC_DISCOVERY_BROADCAST_ADDRESS", self.discovery.broadcast_address);
        set!(duration "ANCHORSYNC_DISCOVERY_BEACON_INTERVAL", self.discovery.beacon_interval);

        // Session
        set!(
            "ANCHORSYNC_SESSION_REPLAY_ANCHORS_ON_CONNECT",
            self.session.replay_anchors_on_connect
        );
        set!(
            "ANCHORSYNC_SESSION_COMMAND_CHANNEL_CAPACITY",
            self.session.command_channel_capacity
        );
        set!(
            "ANCHORSYNC_SESSION_EVENT_CHANNEL_CAPACITY",
            self.session.event_channel_capacity
        );

        // Storage
        set!("ANCHORSYNC_STORAGE_DATA_DIR", self.storage.data_dir);
        set!("ANCHORSYNC_STORAGE_MAP_FILE_NAME", self.storage.map_file_name);

        // Logging
        set!("ANCHORSYNC_LOGGING_LEVEL", self.logging.level);
        set!("ANCHORSYNC_LOGGING_JSON_FORMAT", self.logging.json_format);
        set!("ANCHORSYNC_LOGGING_WITH_TIMESTAMP", self.logging.with_timestamp);
        set!("ANCHORSYNC_LOGGING_WITH_TARGET", self.logging.with_target);

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_service_name(&self.transport.service_name)?;

        if self.transport.max_message_size < MAX_ANCHOR_BLOB_SIZE {
            return Err(ConfigError::ValidationFailed(format!(
                "max_message_size must be at least {} bytes",
                MAX_ANCHOR_BLOB_SIZE
            )));
        }

        if self.transport.send_queue_capacity == 0
            || self.transport.event_channel_capacity == 0
            || self.session.command_channel_capacity == 0
            || self.session.event_channel_capacity == 0
        {
            return Err(ConfigError::ValidationFailed(
                "channel capacities must be greater than 0".to_string(),
            ));
        }

        if self.transport.handshake_timeout.is_zero() || self.transport.connect_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "transport timeouts must be greater than 0".to_string(),
            ));
        }

        if self.discovery.enabled {
            if self.discovery.port == 0 {
                return Err(ConfigError::ValidationFailed(
                    "discovery port must be set when discovery is enabled".to_string(),
                ));
            }
            if self.discovery.beacon_interval.is_zero() {
                return Err(ConfigError::ValidationFailed(
                    "beacon_interval must be greater than 0".to_string(),
                ));
            }
        }

        let name = &self.storage.map_file_name;
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(ConfigError::ValidationFailed(format!(
                "map_file_name must be a plain file name, got {:?}",
                name
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}

fn validate_service_name(name: &str) -> Result<(), ConfigError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if name.is_empty() || name.len() > MAX_SERVICE_NAME_LEN || !valid_chars {
        return Err(ConfigError::ValidationFailed(format!(
            "service_name must be 1-{} lowercase letters, digits or hyphens, got {:?}",
            MAX_SERVICE_NAME_LEN, name
        )));
    }

    Ok(())
}
