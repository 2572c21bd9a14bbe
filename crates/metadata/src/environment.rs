use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::MetadataError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    Nats,
    Memory,
}

/// Default relay server host
pub const DEFAULT_RELAY_HOST: &str = "127.0.0.1";
/// Default relay server port
pub const DEFAULT_RELAY_PORT: u16 = 40123;
/// Default JetStream duplicate window in seconds
pub const DEFAULT_DUPLICATE_WINDOW_SECS: u64 = 2 * 60 * 60;

fn default_relay_host() -> String {
    DEFAULT_RELAY_HOST.to_string()
}

fn default_relay_port() -> u16 {
    DEFAULT_RELAY_PORT
}

fn default_duplicate_window_secs() -> u64 {
    DEFAULT_DUPLICATE_WINDOW_SECS
}

/// Downstream relay link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(rename = "type")]
    pub transport_type: TransportType,
    #[serde(default = "default_relay_host")]
    pub host: String,
    #[serde(default = "default_relay_port")]
    pub port: u16,
    /// Subject prefix for relay publishing (e.g., "prod.markets")
    /// If not set, defaults to the environment name
    pub subject_prefix: Option<String>,
    /// JetStream stream name; when set the stream is created on connect
    pub stream: Option<String>,
    /// Window in which trades with the same id are deduplicated by JetStream
    #[serde(default = "default_duplicate_window_secs")]
    pub duplicate_window_secs: u64,
}

impl RelayConfig {
    /// Relay server URL for the given port
    pub fn url(&self, port: u16) -> String {
        format!("nats://{}:{}", self.host, port)
    }
}

/// Fixed delay between connect attempts
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 10;
/// Market read timeout before the link is considered dead
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 120;
/// Interval between app-level pings to the exchange
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 30;
/// Minimum allowed retry delay
pub const MIN_RETRY_DELAY_SECS: u64 = 1;
/// Upper bound for the retry delay and the ping interval
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;
/// Upper bound for the read timeout
pub const MAX_READ_TIMEOUT_SECS: u64 = 4 * MAX_INTERVAL_SECS;

fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

fn default_read_timeout_secs() -> u64 {
    DEFAULT_READ_TIMEOUT_SECS
}

fn default_ping_interval_secs() -> u64 {
    DEFAULT_PING_INTERVAL_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

impl SupervisorConfig {
    /// Validate the configuration, clamping every interval into range.
    /// Returns a tuple of (validated_config, was_clamped).
    pub fn validated(mut self) -> (Self, bool) {
        let original = (
            self.retry_delay_secs,
            self.read_timeout_secs,
            self.ping_interval_secs,
        );

        self.retry_delay_secs = self
            .retry_delay_secs
            .clamp(MIN_RETRY_DELAY_SECS, MAX_INTERVAL_SECS);
        if self.ping_interval_secs == 0 {
            self.ping_interval_secs = DEFAULT_PING_INTERVAL_SECS;
        }
        self.ping_interval_secs = self.ping_interval_secs.min(MAX_INTERVAL_SECS);
        self.read_timeout_secs = self.read_timeout_secs.min(MAX_READ_TIMEOUT_SECS);
        if self.read_timeout_secs <= self.ping_interval_secs {
            self.read_timeout_secs = self
                .ping_interval_secs
                .saturating_mul(4)
                .min(MAX_READ_TIMEOUT_SECS);
        }

        let clamped = original
            != (
                self.retry_delay_secs,
                self.read_timeout_secs,
                self.ping_interval_secs,
            );
        (self, clamped)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    pub relay: RelayConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

impl Environment {
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path).map_err(MetadataError::read(path))?;
        let env: Environment = serde_yaml::from_str(&content).map_err(MetadataError::parse(path))?;
        Ok(env)
    }

    /// Subject prefix for relay publishing, falling back to the environment name
    pub fn subject_prefix(&self) -> &str {
        self.relay.subject_prefix.as_deref().unwrap_or(&self.name)
    }
}
