//! Client Configuration
//!
//! Connection, queue and stream settings, loaded from a TOML file at
//! `~/.config/chatlink/client.toml` and overridden by environment variables.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [connection]
//! endpoint = "ws://localhost:8765"
//! connect_timeout_ms = 10000
//! reconnect_attempts = 5
//! reconnect_delay_ms = 1000
//! retry_manual_connects = true
//!
//! [queue]
//! max_messages = 100
//! max_age_ms = 300000
//!
//! [stream]
//! end_marker = "[STREAM_END]"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection::ReconnectPolicy;
use crate::streaming::STREAM_END_SENTINEL;

/// Default endpoint of the reference deployment
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8765";

/// Highest accepted reconnect attempt cap
pub const MAX_RECONNECT_ATTEMPTS_LIMIT: u32 = 16;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Where the effective configuration last came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Effective Configuration
// =============================================================================

/// Connection manager configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Socket endpoint
    pub endpoint: String,

    /// Handshake ceiling in milliseconds
    pub connect_timeout_ms: u64,

    /// Automatic reconnection attempts before giving up
    pub reconnect_attempts: u32,

    /// Base backoff delay in milliseconds (doubles per attempt)
    pub reconnect_delay_ms: u64,

    /// Whether a failed manual connect enters the retry policy
    pub retry_manual_connects: bool,

    /// Outbound queue bound (0 = unbounded)
    pub max_queued_messages: usize,

    /// Maximum age of a queued message in milliseconds (0 = no limit)
    pub max_queue_age_ms: u64,

    /// Literal inbound frame that ends a streamed response
    pub stream_end_marker: String,

    /// Where the configuration came from
    #[serde(skip)]
    pub source: ConfigSource,

    /// Config file that was loaded, if any
    #[serde(skip)]
    pub config_file_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout_ms: 10_000,
            reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
            retry_manual_connects: true,
            max_queued_messages: 100,
            max_queue_age_ms: 300_000,
            stream_end_marker: STREAM_END_SENTINEL.to_string(),
            source: ConfigSource::Default,
            config_file_path: None,
        }
    }
}

impl ClientConfig {
    /// Defaults pointed at a specific endpoint
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Handshake ceiling
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Maximum queued message age, if bounded
    #[must_use]
    pub fn max_queue_age(&self) -> Option<Duration> {
        (self.max_queue_age_ms > 0).then(|| Duration::from_millis(self.max_queue_age_ms))
    }

    /// Outbound queue bound, if bounded
    #[must_use]
    pub fn queue_limit(&self) -> Option<usize> {
        (self.max_queued_messages > 0).then_some(self.max_queued_messages)
    }

    /// Backoff policy derived from this configuration
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect_attempts,
            base_delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }

    /// Check the configuration for values the manager cannot work with
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` describing the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(format!(
                "endpoint must start with ws:// or wss://, got {:?}",
                self.endpoint
            )));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "reconnect_delay_ms must be greater than 0".into(),
            ));
        }
        if self.reconnect_attempts > MAX_RECONNECT_ATTEMPTS_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "reconnect_attempts must be at most {MAX_RECONNECT_ATTEMPTS_LIMIT}"
            )));
        }
        if self.stream_end_marker.is_empty() {
            return Err(ConfigError::ValidationError(
                "stream end marker must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Apply CLI overrides
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        let mut applied = false;
        if let Some(ref endpoint) = overrides.endpoint {
            self.endpoint.clone_from(endpoint);
            applied = true;
        }
        if let Some(timeout) = overrides.connect_timeout_ms {
            self.connect_timeout_ms = timeout;
            applied = true;
        }
        if let Some(attempts) = overrides.reconnect_attempts {
            self.reconnect_attempts = attempts;
            applied = true;
        }
        if applied {
            self.source = ConfigSource::Cli;
        }
    }
}

/// Command-line overrides, highest priority
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Endpoint override
    pub endpoint: Option<String>,
    /// Handshake ceiling override
    pub connect_timeout_ms: Option<u64>,
    /// Attempt cap override
    pub reconnect_attempts: Option<u32>,
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Connection section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionToml {
    /// Socket endpoint
    pub endpoint: Option<String>,
    /// Handshake ceiling in milliseconds
    pub connect_timeout_ms: Option<u64>,
    /// Automatic reconnection attempts
    pub reconnect_attempts: Option<u32>,
    /// Base backoff delay in milliseconds
    pub reconnect_delay_ms: Option<u64>,
    /// Whether failed manual connects are retried
    pub retry_manual_connects: Option<bool>,
}

/// Queue section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueToml {
    /// Outbound queue bound
    pub max_messages: Option<usize>,
    /// Maximum queued message age in milliseconds
    pub max_age_ms: Option<u64>,
}

/// Stream section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// End-of-stream sentinel literal
    pub end_marker: Option<String>,
}

/// Root of the TOML configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// `[connection]`
    pub connection: ConnectionToml,
    /// `[queue]`
    pub queue: QueueToml,
    /// `[stream]`
    pub stream: StreamToml,
}

// =============================================================================
// Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/chatlink/client.toml` or
/// `~/.config/chatlink/client.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chatlink").join("client.toml"))
}

/// Load configuration from the default path, defaults and environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path().as_deref())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::default();

    if let Some(config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.to_path_buf(),
                    source: e,
                })?;

            let toml_config: ClientToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.to_path_buf());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    if let Some(ref endpoint) = toml.connection.endpoint {
        config.endpoint.clone_from(endpoint);
    }
    if let Some(timeout) = toml.connection.connect_timeout_ms {
        config.connect_timeout_ms = timeout;
    }
    if let Some(attempts) = toml.connection.reconnect_attempts {
        config.reconnect_attempts = attempts;
    }
    if let Some(delay) = toml.connection.reconnect_delay_ms {
        config.reconnect_delay_ms = delay;
    }
    if let Some(retry) = toml.connection.retry_manual_connects {
        config.retry_manual_connects = retry;
    }

    if let Some(max) = toml.queue.max_messages {
        config.max_queued_messages = max;
    }
    if let Some(age) = toml.queue.max_age_ms {
        config.max_queue_age_ms = age;
    }

    if let Some(ref marker) = toml.stream.end_marker {
        config.stream_end_marker.clone_from(marker);
    }
}

/// Apply environment variable overrides to the config
///
/// Environment variables:
/// - `CHATLINK_ENDPOINT`: socket endpoint
/// - `CHATLINK_CONNECT_TIMEOUT`: handshake ceiling in ms
/// - `CHATLINK_RECONNECT_ATTEMPTS`: attempt cap
/// - `CHATLINK_RECONNECT_DELAY`: base backoff in ms
/// - `CHATLINK_QUEUE_LIMIT`: outbound queue bound
/// - `CHATLINK_QUEUE_MAX_AGE`: queued message max age in ms
fn apply_env_config<F>(config: &mut ClientConfig, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    fn parsed<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
        value.and_then(|v| v.trim().parse().ok())
    }

    let mut applied = false;

    if let Some(endpoint) = var("CHATLINK_ENDPOINT").filter(|v| !v.trim().is_empty()) {
        config.endpoint = endpoint.trim().to_string();
        applied = true;
    }
    if let Some(ms) = parsed(var("CHATLINK_CONNECT_TIMEOUT")) {
        config.connect_timeout_ms = ms;
        applied = true;
    }
    if let Some(attempts) = parsed(var("CHATLINK_RECONNECT_ATTEMPTS")) {
        config.reconnect_attempts = attempts;
        applied = true;
    }
    if let Some(ms) = parsed(var("CHATLINK_RECONNECT_DELAY")) {
        config.reconnect_delay_ms = ms;
        applied = true;
    }
    if let Some(limit) = parsed(var("CHATLINK_QUEUE_LIMIT")) {
        config.max_queued_messages = limit;
        applied = true;
    }
    if let Some(ms) = parsed(var("CHATLINK_QUEUE_MAX_AGE")) {
        config.max_queue_age_ms = ms;
        applied = true;
    }

    if applied {
        config.source = ConfigSource::Env;
    }
}
