//! # Configuration Management
//!
//! Centralized configuration for the server framework.
//!
//! This module provides structured configuration for the accept loop, the
//! per-connection queues, and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()` (`SEEKER_*`)
//!
//! ## Tuning Notes
//! - `accept_timeout` bounds how long the accept loop waits before re-checking shutdown
//! - `accept_error_limit` bounds how many consecutive accept failures are tolerated
//! - Queue limits bound memory per connection and drive backpressure

use crate::error::{Result, ServerError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default per-iteration accept deadline
pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default number of consecutive accept failures tolerated
pub const DEFAULT_ACCEPT_ERROR_LIMIT: u32 = 10;

/// Default capacity for both per-connection queues
pub const DEFAULT_QUEUE_LIMIT: usize = 64;

/// Largest queue capacity accepted by validation
pub const MAX_QUEUE_LIMIT: usize = 1_000_000;

/// Top-level configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ServerError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ServerError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ServerError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(network) = std::env::var("SEEKER_NETWORK") {
            config.server.network = network.parse()?;
        }

        if let Ok(addr) = std::env::var("SEEKER_BIND_ADDRESS") {
            config.server.bind_address = addr;
        }

        if let Ok(timeout) = std::env::var("SEEKER_ACCEPT_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.server.accept_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(limit) = std::env::var("SEEKER_ACCEPT_ERROR_LIMIT") {
            if let Ok(val) = limit.parse::<u32>() {
                config.server.accept_error_limit = val;
            }
        }

        if let Ok(limit) = std::env::var("SEEKER_SEND_QUEUE_LIMIT") {
            if let Ok(val) = limit.parse::<usize>() {
                config.server.send_queue_limit = val;
            }
        }

        if let Ok(limit) = std::env::var("SEEKER_RECEIVE_QUEUE_LIMIT") {
            if let Ok(val) = limit.parse::<usize>() {
                config.server.receive_queue_limit = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ServerError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ServerError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ServerError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Transport family used to resolve the bind address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Either address family
    #[default]
    Tcp,
    /// IPv4 only
    Tcp4,
    /// IPv6 only
    Tcp6,
}

impl Network {
    /// Whether a resolved address belongs to this family
    pub fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Network::Tcp => true,
            Network::Tcp4 => addr.is_ipv4(),
            Network::Tcp6 => addr.is_ipv6(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
        }
    }
}

impl std::str::FromStr for Network {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            other => Err(ServerError::ConfigError(format!(
                "Unknown network family: '{other}' (expected tcp, tcp4 or tcp6)"
            ))),
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address family used to resolve `bind_address`
    pub network: Network,

    /// Local listen address, literal or `host:port` (e.g., "127.0.0.1:9000", "localhost:9000")
    pub bind_address: String,

    /// Deadline for each accept attempt before shutdown is re-checked
    #[serde(with = "duration_serde")]
    pub accept_timeout: Duration,

    /// Consecutive accept failures tolerated before the server exits
    pub accept_error_limit: u32,

    /// Whether an accept deadline expiring with no client counts as a failure
    pub count_accept_timeouts: bool,

    /// Capacity of each connection's outbound queue
    pub send_queue_limit: usize,

    /// Capacity of each connection's inbound queue
    pub receive_queue_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: Network::Tcp,
            bind_address: String::from("127.0.0.1:9000"),
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            accept_error_limit: DEFAULT_ACCEPT_ERROR_LIMIT,
            count_accept_timeouts: true,
            send_queue_limit: DEFAULT_QUEUE_LIMIT,
            receive_queue_limit: DEFAULT_QUEUE_LIMIT,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.bind_address.is_empty() {
            errors.push("Bind address cannot be empty".to_string());
        } else {
            match self.bind_address.parse::<SocketAddr>() {
                Ok(addr) if !self.network.accepts(&addr) => errors.push(format!(
                    "Bind address '{}' does not belong to network family '{}'",
                    self.bind_address, self.network
                )),
                Ok(_) => {}
                // hostnames are resolved at bind time, where the family is checked
                Err(_) if is_host_port(&self.bind_address) => {}
                Err(_) => errors.push(format!(
                    "Invalid bind address format: '{}' (expected format: '0.0.0.0:8080' or 'localhost:8080')",
                    self.bind_address
                )),
            }
        }

        if self.accept_timeout.is_zero() {
            errors.push("Accept timeout must be greater than 0".to_string());
        } else if self.accept_timeout.as_secs() > 300 {
            errors.push("Accept timeout too long (maximum: 300s)".to_string());
        }

        errors.extend(validate_queue_limit("Send queue limit", self.send_queue_limit));
        errors.extend(validate_queue_limit(
            "Receive queue limit",
            self.receive_queue_limit,
        ));

        errors
    }
}

fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty()
                && !host.contains(|c: char| c.is_whitespace() || c == ':')
                && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}

fn validate_queue_limit(name: &str, limit: usize) -> Option<String> {
    if limit == 0 {
        Some(format!("{name} must be greater than 0"))
    } else if limit > MAX_QUEUE_LIMIT {
        Some(format!(
            "{name} too large: {limit} (max recommended: 1,000,000)"
        ))
    } else {
        None
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("seeker"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
