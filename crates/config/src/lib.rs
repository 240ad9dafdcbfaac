//! Configuration loading, validation, and management for Verdant.
//!
//! Loads configuration from `~/.verdant/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.verdant/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language-model gateway configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Memory store configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Language-model gateway settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key; usually supplied via environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Which provider to build ("gemini" is the default).
    #[serde(default = "default_provider_kind")]
    pub kind: String,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Override the API base URL (proxies, test servers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Per-call timeout in seconds. A timed-out call is treated exactly
    /// like a failed call by every pipeline stage.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Transient-failure retries performed by the provider client.
    /// The pipeline itself never retries.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_provider_kind() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_retries() -> u32 {
    2
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            kind: default_provider_kind(),
            model: default_model(),
            base_url: None,
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("retries", &self.retries)
            .finish()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("memory", &self.memory)
            .field("server", &self.server)
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

/// Memory store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Backend: "sqlite" or "in_memory".
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// SQLite database path ("verdant.db" by default; ":memory:" for tests).
    #[serde(default = "default_memory_path")]
    pub path: String,
}

fn default_memory_backend() -> String {
    "sqlite".into()
}
fn default_memory_path() -> String {
    "verdant.db".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: default_memory_path(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8642
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether agent traces are recorded at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How many trace entries the in-process ring buffer keeps.
    #[serde(default = "default_trace_capacity")]
    pub trace_capacity: usize,
}

fn default_true() -> bool {
    true
}
fn default_trace_capacity() -> usize {
    256
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trace_capacity: default_trace_capacity(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.verdant/config.toml).
    ///
    /// Environment variables take priority over the file:
    /// - `VERDANT_API_KEY` (or `GEMINI_API_KEY`)
    /// - `VERDANT_MODEL`
    /// - `VERDANT_DB_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.provider.api_key.is_none() {
            config.provider.api_key = std::env::var("VERDANT_API_KEY")
                .ok()
                .or_else(|| std::env::var("GEMINI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("VERDANT_MODEL") {
            config.provider.model = model;
        }

        if let Ok(path) = std::env::var("VERDANT_DB_PATH") {
            config.memory.path = path;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".verdant")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "provider.timeout_secs must be greater than 0".into(),
            ));
        }

        match self.memory.backend.as_str() {
            "sqlite" | "in_memory" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown memory backend '{other}' (expected 'sqlite' or 'in_memory')"
                )));
            }
        }

        if self.telemetry.trace_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "telemetry.trace_capacity must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            memory: MemoryConfig::default(),
            server: ServerConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
