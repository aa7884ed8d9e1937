//! Configuration
//!
//! Centralized configuration loading for the comparison service, with an
//! optional TOML file at `~/.config/model-compare/config.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [upstream]
//! base_url = "https://openrouter.ai/api/v1"
//! app_title = "Model Compare"
//! connect_timeout_ms = 10000
//!
//! [server]
//! listen_addr = "127.0.0.1:3000"
//!
//! [stream]
//! channel_capacity = 256
//! ```
//!
//! The API key is normally taken from `OPENROUTER_API_KEY` rather than the
//! file, although `upstream.api_key` is accepted.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default upstream endpoint
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default `X-Title` sent upstream
pub const DEFAULT_APP_TITLE: &str = "Model Compare";

/// Environment variable holding the upstream credential
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

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

/// Tracks where the configuration came from
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
// TOML Configuration Structures
// =============================================================================

/// Upstream section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamToml {
    /// Chat-completion API base URL
    pub base_url: Option<String>,
    /// API key (prefer the environment)
    pub api_key: Option<String>,
    /// Title sent as `X-Title`
    pub app_title: Option<String>,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
}

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Address the HTTP daemon listens on
    pub listen_addr: Option<String>,
}

/// Stream section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Records buffered between workers and the consumer
    pub channel_capacity: Option<usize>,
}

/// Root of the TOML configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareToml {
    /// `[upstream]`
    pub upstream: UpstreamToml,
    /// `[server]`
    pub server: ServerToml,
    /// `[stream]`
    pub stream: StreamToml,
}

// =============================================================================
// Effective Configuration
// =============================================================================

/// Upstream chat-completion endpoint settings
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Base URL, `/chat/completions` is appended
    pub base_url: String,
    /// Bearer credential; `None` rejects every comparison
    pub api_key: Option<String>,
    /// Sent as `X-Title`
    pub app_title: String,
    /// Connection timeout (no timeout when `None`)
    pub connect_timeout_ms: Option<u64>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            app_title: DEFAULT_APP_TITLE.to_string(),
            connect_timeout_ms: None,
        }
    }
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("app_title", &self.app_title)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

/// HTTP daemon settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

/// Fan-out stream settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Records buffered between workers and the consumer
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Complete effective configuration
#[derive(Clone, Debug, Default)]
pub struct CompareConfig {
    /// Upstream endpoint
    pub upstream: UpstreamConfig,
    /// HTTP daemon
    pub server: ServerConfig,
    /// Fan-out stream
    pub stream: StreamConfig,
    /// File the configuration was read from, if any
    pub config_file_path: Option<PathBuf>,
    /// Highest-priority source that contributed
    pub source: ConfigSource,
}

impl CompareConfig {
    /// Check values that cannot be enforced by types
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "stream.channel_capacity must be greater than zero".to_string(),
            ));
        }
        let base = self.upstream.base_url.as_str();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "upstream.base_url must be an http(s) URL, got '{base}'"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Default configuration file path
///
/// `$XDG_CONFIG_HOME/model-compare/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("model-compare").join("config.toml"))
}

/// Load configuration from the default path and the environment
pub fn load_config() -> Result<CompareConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific file (if it exists) and the environment
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<CompareConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration, resolving environment variables through `env`
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<CompareConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = CompareConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: CompareToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
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

    apply_env_config(&mut config, env)?;
    config.validate()?;

    Ok(config)
}

fn parse_listen_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::ValidationError(format!("invalid listen address '{value}': {e}")))
}

fn apply_toml_config(config: &mut CompareConfig, toml: &CompareToml) -> Result<(), ConfigError> {
    if let Some(ref url) = toml.upstream.base_url {
        config.upstream.base_url = url.clone();
    }
    if let Some(ref key) = toml.upstream.api_key {
        config.upstream.api_key = Some(key.clone());
    }
    if let Some(ref title) = toml.upstream.app_title {
        config.upstream.app_title = title.clone();
    }
    if let Some(ms) = toml.upstream.connect_timeout_ms {
        config.upstream.connect_timeout_ms = Some(ms);
    }
    if let Some(ref addr) = toml.server.listen_addr {
        config.server.listen_addr = parse_listen_addr(addr)?;
    }
    if let Some(capacity) = toml.stream.channel_capacity {
        config.stream.channel_capacity = capacity;
    }
    Ok(())
}

/// Apply environment variables
///
/// - `OPENROUTER_API_KEY`: upstream credential
/// - `MODEL_COMPARE_BASE_URL`: upstream base URL
/// - `MODEL_COMPARE_APP_TITLE`: `X-Title` header value
/// - `MODEL_COMPARE_LISTEN`: daemon listen address
/// - `MODEL_COMPARE_CHANNEL_CAPACITY`: sink capacity
fn apply_env_config<F>(config: &mut CompareConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut touched = false;

    if let Some(key) = env(API_KEY_ENV).filter(|k| !k.is_empty()) {
        config.upstream.api_key = Some(key);
        touched = true;
    }
    if let Some(url) = env("MODEL_COMPARE_BASE_URL") {
        config.upstream.base_url = url;
        touched = true;
    }
    if let Some(title) = env("MODEL_COMPARE_APP_TITLE") {
        config.upstream.app_title = title;
        touched = true;
    }
    if let Some(addr) = env("MODEL_COMPARE_LISTEN") {
        config.server.listen_addr = parse_listen_addr(&addr)?;
        touched = true;
    }
    if let Some(capacity) = env("MODEL_COMPARE_CHANNEL_CAPACITY") {
        config.stream.channel_capacity = capacity.parse().map_err(|e| {
            ConfigError::ValidationError(format!("invalid channel capacity '{capacity}': {e}"))
        })?;
        touched = true;
    }

    if touched {
        config.source = ConfigSource::Env;
    }
    Ok(())
}

// =============================================================================
// CLI Overrides
// =============================================================================

/// Overrides applied on top of file and environment configuration
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Listen address
    pub listen_addr: Option<SocketAddr>,
    /// Upstream base URL
    pub base_url: Option<String>,
}

impl ConfigOverrides {
    /// Create empty overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the listen address
    #[must_use]
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = Some(addr);
        self
    }

    /// Override the upstream base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut CompareConfig) -> Result<(), ConfigError> {
        let mut touched = false;
        if let Some(addr) = self.listen_addr {
            config.server.listen_addr = addr;
            touched = true;
        }
        if let Some(ref url) = self.base_url {
            config.upstream.base_url = url.clone();
            touched = true;
        }
        if touched {
            config.source = ConfigSource::Cli;
        }
        config.validate()
    }
}
