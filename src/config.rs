//! # Configuration Management
//!
//! Centralized configuration for servers, client endpoints and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()` (`MEDIA_STREAM_IO_*`)
//!
//! Durations are written in milliseconds. A heartbeat interval of `0` disables
//! the liveness protocol.

use crate::core::buffer::MIN_BUFFER_SIZE;
use crate::core::header::{Direction, StreamType};
use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default size of each message buffer (header included).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Largest buffer size accepted by validation.
pub const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Default stream-type tag.
pub const DEFAULT_STREAM_TYPE: &str = "DATA";

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `MEDIA_STREAM_IO_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("MEDIA_STREAM_IO_BIND_ADDRESS") {
            config.server.bind_address = addr;
        }

        if let Ok(port) = std::env::var("MEDIA_STREAM_IO_PORT") {
            let port = port
                .parse::<u16>()
                .map_err(|e| ProtocolError::ConfigError(format!("Invalid port '{port}': {e}")))?;
            config.server.port = port;
            config.client.port = port;
        }

        if let Ok(size) = std::env::var("MEDIA_STREAM_IO_BUFFER_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                config.server.buffer_size = val;
                config.client.buffer_size = val;
            }
        }

        if let Ok(heartbeat) = std::env::var("MEDIA_STREAM_IO_HEARTBEAT_MS") {
            if let Ok(val) = heartbeat.parse::<u64>() {
                config.server.heartbeat_interval = Duration::from_millis(val);
            }
        }

        if let Ok(host) = std::env::var("MEDIA_STREAM_IO_HOST") {
            config.client.host = host;
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
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        strict(self.validate())
    }
}

fn strict(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ProtocolError::ConfigError(format!(
            "Configuration validation failed:\n  - {}",
            errors.join("\n  - ")
        )))
    }
}

fn validate_buffer_size(size: usize, errors: &mut Vec<String>) {
    if size < MIN_BUFFER_SIZE {
        errors.push(format!(
            "Buffer size too small: {size} bytes (minimum: {MIN_BUFFER_SIZE})"
        ));
    } else if size > MAX_BUFFER_SIZE {
        errors.push(format!(
            "Buffer size too large: {size} bytes (maximum: {MAX_BUFFER_SIZE})"
        ));
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Local address to bind (e.g., "0.0.0.0")
    pub bind_address: String,

    /// Listen port; 0 picks an ephemeral port
    pub port: u16,

    /// Size of each message buffer, header included
    pub buffer_size: usize,

    /// Stream-type tag stamped on outbound envelopes
    pub stream_type: String,

    /// Which way data flows through sessions
    pub direction: Direction,

    /// Keep a connection open across messages; otherwise one message per connection
    pub persistent: bool,

    /// SO_KEEPALIVE on the listening socket (inherited by accepted sockets)
    pub keep_alive: bool,

    /// TCP_NODELAY on accepted sockets
    pub no_delay: bool,

    /// Heartbeat interval, zero disables
    #[serde(with = "duration_serde")]
    pub heartbeat_interval: Duration,

    /// How long an output session waits for `ack` after sending `beat`
    #[serde(with = "duration_serde")]
    pub ack_timeout: Duration,

    /// Longest wait of one probe for inbound bytes
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,

    /// Bound on a single read or write transaction
    #[serde(with = "duration_serde")]
    pub io_timeout: Duration,

    /// Pause before accepting again after an accept error
    #[serde(with = "duration_serde")]
    pub accept_retry_delay: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: String::from("0.0.0.0"),
            port: 9000,
            buffer_size: DEFAULT_BUFFER_SIZE,
            stream_type: String::from(DEFAULT_STREAM_TYPE),
            direction: Direction::Input,
            persistent: true,
            keep_alive: true,
            no_delay: true,
            heartbeat_interval: Duration::ZERO,
            ack_timeout: timeout::ACK_TIMEOUT,
            poll_interval: timeout::POLL_INTERVAL,
            io_timeout: timeout::IO_TIMEOUT,
            accept_retry_delay: timeout::ACCEPT_RETRY_DELAY,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.bind_address.is_empty() {
            errors.push("Bind address cannot be empty".to_string());
        } else if self.bind_address.parse::<std::net::IpAddr>().is_err() {
            errors.push(format!(
                "Invalid bind address: '{}' (expected an IP such as '0.0.0.0')",
                self.bind_address
            ));
        }

        validate_buffer_size(self.buffer_size, &mut errors);

        if self.stream_type.is_empty() {
            errors.push("Stream type cannot be empty".to_string());
        }

        if self.poll_interval.is_zero() {
            errors.push("Poll interval must be greater than 0".to_string());
        } else if self.poll_interval > Duration::from_secs(1) {
            errors.push("Poll interval too long (maximum: 1s)".to_string());
        }

        if self.io_timeout < Duration::from_millis(10) {
            errors.push("I/O timeout too short (minimum: 10ms)".to_string());
        }

        if !self.heartbeat_interval.is_zero() {
            if self.heartbeat_interval < self.poll_interval {
                errors.push("Heartbeat interval shorter than poll interval".to_string());
            }
            if self.direction == Direction::Output && self.ack_timeout.is_zero() {
                errors.push("Ack timeout must be greater than 0 when heartbeats are enabled".to_string());
            }
        }

        if self.heartbeat_interval > Duration::from_secs(3600) {
            errors.push("Heartbeat interval too long (maximum: 1 hour)".to_string());
        }

        if self.accept_retry_delay > Duration::from_secs(60) {
            errors.push("Accept retry delay too long (maximum: 60s)".to_string());
        }

        errors
    }

    pub fn validate_strict(&self) -> Result<()> {
        strict(self.validate())
    }

    pub fn stream_type(&self) -> StreamType {
        StreamType::new(&self.stream_type)
    }

    pub fn heartbeat_enabled(&self) -> bool {
        !self.heartbeat_interval.is_zero()
    }
}

/// Client endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Target host name or IP
    pub host: String,

    /// Target port
    pub port: u16,

    /// Size of the endpoint's message buffer, header included
    pub buffer_size: usize,

    /// Stream-type tag stamped on outbound envelopes
    pub stream_type: String,

    /// Direction tag stamped on outbound envelopes
    pub direction: Direction,

    /// Timeout for TCP connect
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Socket read timeout for message bodies and UDP receives
    #[serde(with = "duration_serde")]
    pub read_timeout: Duration,

    /// TCP_NODELAY on the connected socket
    pub no_delay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 9000,
            buffer_size: DEFAULT_BUFFER_SIZE,
            stream_type: String::from(DEFAULT_STREAM_TYPE),
            direction: Direction::Output,
            connect_timeout: timeout::CONNECT_TIMEOUT,
            read_timeout: timeout::CLIENT_READ_TIMEOUT,
            no_delay: true,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("Client host cannot be empty".to_string());
        }

        if self.port == 0 {
            errors.push("Client port must be greater than 0".to_string());
        }

        validate_buffer_size(self.buffer_size, &mut errors);

        if self.connect_timeout.as_millis() < 10 {
            errors.push("Connect timeout too short (minimum: 10ms)".to_string());
        }

        if self.read_timeout.is_zero() {
            errors.push("Read timeout must be greater than 0".to_string());
        }

        errors
    }

    pub fn validate_strict(&self) -> Result<()> {
        strict(self.validate())
    }

    pub fn stream_type(&self) -> StreamType {
        StreamType::new(&self.stream_type)
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

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("media-stream-io"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
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

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
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
