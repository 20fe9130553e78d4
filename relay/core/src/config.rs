//! TOML Configuration File Support
//!
//! Centralized configuration for the relay, read from
//! `~/.config/agent-relay/relay.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [agent]
//! transport = "websocket"
//! ws_url = "ws://localhost:10338/agentOS/v1/ws_stream"
//! http_url = "http://localhost:10338/agentOS/v1/stream"
//!
//! [stream]
//! channel_capacity = 256
//! connect_timeout_ms = 10000
//!
//! [session]
//! store_path = "/home/me/.local/share/agent-relay/thread-sessions.json"
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `AGENT_WS_URL` | `agent.ws_url` |
//! | `AGENT_HTTP_URL` | `agent.http_url` |
//! | `AGENT_RELAY_TRANSPORT` | `agent.transport` |
//! | `AGENT_RELAY_CONNECT_TIMEOUT` | `stream.connect_timeout_ms` |
//! | `AGENT_RELAY_CHANNEL_CAPACITY` | `stream.channel_capacity` |
//! | `AGENT_RELAY_SESSION_STORE` | `session.store_path` |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default agent WebSocket endpoint
pub const DEFAULT_WS_URL: &str = "ws://localhost:10338/agentOS/v1/ws_stream";

/// Default agent HTTP streaming endpoint
pub const DEFAULT_HTTP_URL: &str = "http://localhost:10338/agentOS/v1/stream";

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

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Which transport reaches the agent
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Duplex WebSocket
    #[default]
    Websocket,
    /// Streamed HTTP POST
    Http,
}

impl TransportKind {
    /// Config-file spelling
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Websocket => "websocket",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Ok(Self::Websocket),
            "http" | "sse" => Ok(Self::Http),
            other => Err(ConfigError::ValidationError(format!(
                "unknown transport '{other}' (expected websocket or http)"
            ))),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[agent]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentToml {
    /// Transport kind
    pub transport: Option<TransportKind>,
    /// WebSocket endpoint
    pub ws_url: Option<String>,
    /// HTTP streaming endpoint
    pub http_url: Option<String>,
}

/// `[stream]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Downstream chunk buffer per response
    pub channel_capacity: Option<usize>,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
}

/// `[session]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Session store file
    pub store_path: Option<PathBuf>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayToml {
    /// Agent endpoint section
    pub agent: AgentToml,
    /// Stream tuning section
    pub stream: StreamToml,
    /// Session store section
    pub session: SessionToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Agent endpoint settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentConfig {
    /// Transport in use
    pub transport: TransportKind,
    /// WebSocket endpoint
    pub ws_url: String,
    /// HTTP streaming endpoint
    pub http_url: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            ws_url: DEFAULT_WS_URL.to_string(),
            http_url: DEFAULT_HTTP_URL.to_string(),
        }
    }
}

impl AgentConfig {
    /// Endpoint of the selected transport
    #[must_use]
    pub fn endpoint(&self) -> &str {
        match self.transport {
            TransportKind::Websocket => &self.ws_url,
            TransportKind::Http => &self.http_url,
        }
    }
}

/// Per-response stream settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Downstream chunk buffer per response
    pub channel_capacity: usize,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            connect_timeout_ms: 10_000,
        }
    }
}

impl StreamConfig {
    /// Connect timeout as a `Duration`
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Centralized configuration for the relay
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Agent endpoint
    pub agent: AgentConfig,
    /// Stream tuning
    pub stream: StreamConfig,
    /// Session store file (`None` keeps bindings in memory only)
    pub session_store: Option<PathBuf>,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    /// Source of configuration values
    source: ConfigSource,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            stream: StreamConfig::default(),
            session_store: default_session_store_path(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl RelayConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check that the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for an empty endpoint, an
    /// endpoint scheme that does not match the transport, or a zero channel
    /// capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.agent.endpoint();
        if url.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} endpoint is empty",
                self.agent.transport
            )));
        }

        let schemes: &[&str] = match self.agent.transport {
            TransportKind::Websocket => &["ws://", "wss://"],
            TransportKind::Http => &["http://", "https://"],
        };
        if !schemes.iter().any(|s| url.starts_with(s)) {
            return Err(ConfigError::ValidationError(format!(
                "{} endpoint '{url}' must start with {}",
                self.agent.transport,
                schemes.join(" or ")
            )));
        }

        if self.stream.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "stream.channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/agent-relay/relay.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("agent-relay").join("relay.toml"))
}

/// Get the default session store path
///
/// Returns `$XDG_DATA_HOME/agent-relay/thread-sessions.json`.
#[must_use]
pub fn default_session_store_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("agent-relay").join("thread-sessions.json"))
}

/// Load configuration from all sources with proper priority
///
/// CLI overrides are not handled here; apply [`ConfigOverrides`] after.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<RelayConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or an environment variable holds an invalid transport name.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<RelayConfig, ConfigError> {
    let mut config = RelayConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: RelayToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
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

    apply_env_config(&mut config, |key| std::env::var(key).ok())?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut RelayConfig, toml: &RelayToml) {
    if let Some(transport) = toml.agent.transport {
        config.agent.transport = transport;
    }
    if let Some(url) = &toml.agent.ws_url {
        config.agent.ws_url.clone_from(url);
    }
    if let Some(url) = &toml.agent.http_url {
        config.agent.http_url.clone_from(url);
    }

    if let Some(capacity) = toml.stream.channel_capacity {
        config.stream.channel_capacity = capacity;
    }
    if let Some(timeout) = toml.stream.connect_timeout_ms {
        config.stream.connect_timeout_ms = timeout;
    }

    if let Some(path) = &toml.session.store_path {
        config.session_store = Some(path.clone());
    }
}

/// Apply environment overrides read through `var`
fn apply_env_config(
    config: &mut RelayConfig,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(url) = var("AGENT_WS_URL") {
        config.agent.ws_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(url) = var("AGENT_HTTP_URL") {
        config.agent.http_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(transport) = var("AGENT_RELAY_TRANSPORT") {
        config.agent.transport = transport.parse()?;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = var("AGENT_RELAY_CONNECT_TIMEOUT") {
        if let Ok(ms) = timeout.parse::<u64>() {
            config.stream.connect_timeout_ms = ms;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(capacity) = var("AGENT_RELAY_CHANNEL_CAPACITY") {
        if let Ok(n) = capacity.parse::<usize>() {
            config.stream.channel_capacity = n;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(path) = var("AGENT_RELAY_SESSION_STORE") {
        config.session_store = Some(PathBuf::from(path));
        config.source = ConfigSource::Env;
    }
    Ok(())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Transport override
    pub transport: Option<TransportKind>,
    /// WebSocket endpoint override
    pub ws_url: Option<String>,
    /// HTTP endpoint override
    pub http_url: Option<String>,
    /// Session store override
    pub session_store: Option<PathBuf>,
    /// Connect timeout override (milliseconds)
    pub connect_timeout_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set transport override
    #[must_use]
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set WebSocket endpoint override
    #[must_use]
    pub fn with_ws_url(mut self, url: String) -> Self {
        self.ws_url = Some(url);
        self
    }

    /// Set HTTP endpoint override
    #[must_use]
    pub fn with_http_url(mut self, url: String) -> Self {
        self.http_url = Some(url);
        self
    }

    /// Set session store override
    #[must_use]
    pub fn with_session_store(mut self, path: PathBuf) -> Self {
        self.session_store = Some(path);
        self
    }

    /// Set connect timeout override
    #[must_use]
    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = Some(ms);
        self
    }

    /// Whether any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transport.is_none()
            && self.ws_url.is_none()
            && self.http_url.is_none()
            && self.session_store.is_none()
            && self.connect_timeout_ms.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut RelayConfig) {
        if self.is_empty() {
            return;
        }
        if let Some(transport) = self.transport {
            config.agent.transport = transport;
        }
        if let Some(url) = &self.ws_url {
            config.agent.ws_url.clone_from(url);
        }
        if let Some(url) = &self.http_url {
            config.agent.http_url.clone_from(url);
        }
        if let Some(path) = &self.session_store {
            config.session_store = Some(path.clone());
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.stream.connect_timeout_ms = ms;
        }
        config.source = ConfigSource::Cli;
    }
}
