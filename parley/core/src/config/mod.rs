//! TOML Configuration File Support
//!
//! Client configuration lives in a TOML file at
//! `$XDG_CONFIG_HOME/parley/client.toml` (typically
//! `~/.config/parley/client.toml`).
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! base_url = "http://localhost:8000"
//! request_timeout_secs = 300
//!
//! [chat]
//! endpoint = "single"
//! model = "llama3.2"
//! provider = "ollama"
//!
//! [status]
//! poll_interval_secs = 30
//!
//! [ollama]
//! base_url = "http://localhost:11434"
//!
//! [recording]
//! chunk_size = 4096
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

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
// Chat Endpoint Selection
// =============================================================================

/// Which chat endpoint the client talks to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatEndpoint {
    /// `POST /api/chat`: payloads are raw text fragments
    Simple,
    /// `POST /api/chat/single`: payloads are JSON envelopes
    #[default]
    Single,
}

impl ChatEndpoint {
    /// Request path for this endpoint
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Simple => "/api/chat",
            Self::Single => "/api/chat/single",
        }
    }
}

impl std::str::FromStr for ChatEndpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "single" => Ok(Self::Single),
            other => Err(ConfigError::ValidationError(format!(
                "unknown chat endpoint '{other}' (expected 'simple' or 'single')"
            ))),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Base URL of the chat backend
    pub base_url: Option<String>,

    /// Response stall and upload timeout in seconds (0 = none)
    pub request_timeout_secs: Option<u64>,
}

/// Chat section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// `simple` or `single`
    pub endpoint: Option<ChatEndpoint>,

    /// Model name sent with each message
    pub model: Option<String>,

    /// Provider name sent with each message
    pub provider: Option<String>,
}

/// Status section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusToml {
    /// Seconds between service health polls
    pub poll_interval_secs: Option<u64>,
}

/// Ollama section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaToml {
    /// Ollama base URL, used by diagnostics
    pub base_url: Option<String>,
}

/// Recording section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingToml {
    /// Bytes read per captured chunk
    pub chunk_size: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Server configuration section
    pub server: ServerToml,

    /// Chat configuration section
    pub chat: ChatToml,

    /// Status polling configuration section
    pub status: StatusToml,

    /// Ollama configuration section
    pub ollama: OllamaToml,

    /// Recording configuration section
    pub recording: RecordingToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the chat backend
    pub base_url: String,

    /// Longest silence tolerated on a response, and the whole-request limit
    /// for uploads and image generation
    ///
    /// A streamed reply is never cut off while the server keeps sending.
    /// `None` waits forever.
    pub request_timeout: Option<Duration>,

    /// Chat endpoint flavor
    pub endpoint: ChatEndpoint,

    /// Model name sent with each message
    pub model: String,

    /// Provider name sent with each message
    pub provider: String,

    /// Service health poll interval
    pub poll_interval: Duration,

    /// Ollama base URL
    pub ollama_url: String,

    /// Bytes read per captured audio chunk
    pub chunk_size: usize,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout: Some(Duration::from_secs(300)),
            endpoint: ChatEndpoint::Single,
            model: "llama3.2".to_string(),
            provider: "ollama".to_string(),
            poll_interval: Duration::from_secs(30),
            ollama_url: "http://localhost:11434".to_string(),
            chunk_size: 4096,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
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

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Reject values the client cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "server.base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "status.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "recording.chunk_size must be greater than zero".to_string(),
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
/// Returns `$XDG_CONFIG_HOME/parley/client.toml` or
/// `~/.config/parley/client.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("parley").join("client.toml"))
}

/// Load configuration from the default path and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ClientToml = toml::from_str(&toml_content)?;
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

    apply_env_config(&mut config, env);

    Ok(config)
}

fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    if let Some(ref url) = toml.server.base_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(secs) = toml.server.request_timeout_secs {
        config.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }

    if let Some(endpoint) = toml.chat.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(ref model) = toml.chat.model {
        config.model.clone_from(model);
    }
    if let Some(ref provider) = toml.chat.provider {
        config.provider.clone_from(provider);
    }

    if let Some(secs) = toml.status.poll_interval_secs {
        config.poll_interval = Duration::from_secs(secs);
    }

    if let Some(ref url) = toml.ollama.base_url {
        config.ollama_url = url.trim_end_matches('/').to_string();
    }

    if let Some(size) = toml.recording.chunk_size {
        config.chunk_size = size;
    }
}

fn apply_env_config<F>(config: &mut ClientConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env("PARLEY_SERVER_URL") {
        config.base_url = url.trim_end_matches('/').to_string();
        config.source = ConfigSource::Env;
    }
    if let Some(model) = env("PARLEY_MODEL") {
        config.model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(provider) = env("PARLEY_PROVIDER") {
        config.provider = provider;
        config.source = ConfigSource::Env;
    }
    if let Some(interval) = env("PARLEY_POLL_INTERVAL") {
        if let Ok(secs) = interval.parse::<u64>() {
            config.poll_interval = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(host) = env("OLLAMA_HOST") {
        config.ollama_url = normalize_ollama_host(&host);
        config.source = ConfigSource::Env;
    }
}

/// `OLLAMA_HOST` is often given as a bare `host:port`
fn normalize_ollama_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Server URL override
    pub base_url: Option<String>,

    /// Endpoint override
    pub endpoint: Option<ChatEndpoint>,

    /// Model override
    pub model: Option<String>,

    /// Provider override
    pub provider: Option<String>,

    /// Poll interval override (seconds)
    pub poll_interval_secs: Option<u64>,
}

impl ConfigOverrides {
    /// Create an empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the server URL
    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Override the chat endpoint
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: ChatEndpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Override the model
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Override the provider
    #[must_use]
    pub fn with_provider(mut self, provider: String) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Override the poll interval
    #[must_use]
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = Some(secs);
        self
    }

    /// Whether any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.base_url.is_none()
            && self.endpoint.is_none()
            && self.model.is_none()
            && self.provider.is_none()
            && self.poll_interval_secs.is_none()
    }

    /// Apply overrides to a loaded configuration
    pub fn apply(&self, config: &mut ClientConfig) {
        if self.is_empty() {
            return;
        }
        if let Some(ref url) = self.base_url {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(ref model) = self.model {
            config.model.clone_from(model);
        }
        if let Some(ref provider) = self.provider {
            config.provider.clone_from(provider);
        }
        if let Some(secs) = self.poll_interval_secs {
            config.poll_interval = Duration::from_secs(secs);
        }
        config.source = ConfigSource::Cli;
    }
}
