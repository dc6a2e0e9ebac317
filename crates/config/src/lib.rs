//! Configuration loading, validation, and management for Harness.
//!
//! Loads configuration from `~/.harness/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.harness/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Anthropic API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upper bound on provider round-trips per prompt
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// System instruction; empty means none is sent
    #[serde(default)]
    pub system_prompt: String,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";

fn default_model() -> String {
    DEFAULT_MODEL.into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_max_turns() -> u32 {
    10
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("max_turns", &self.max_turns)
            .field("system_prompt", &self.system_prompt)
            .field("gateway", &self.gateway)
            .field("provider", &self.provider)
            .field("logging", &self.logging)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Undelivered events each SSE subscriber may buffer
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Seconds between keep-alive comments on idle event streams
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_subscriber_buffer() -> usize {
    100
}
fn default_heartbeat_secs() -> u64 {
    30
}

impl GatewayConfig {
    /// `host:port` for binding.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            subscriber_buffer: default_subscriber_buffer(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Token budget for extended thinking; unset disables it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            thinking_budget: None,
        }
    }
}

/// Output format for diagnostic logs and the transcript.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Anything other than `json` (any case) is text.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Conversation transcript file; unset disables it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<PathBuf>,

    #[serde(default)]
    pub transcript_format: LogFormat,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            transcript_path: None,
            transcript_format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.harness/config.toml),
    /// then apply overrides from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with(&config_path, |key| std::env::var(key).ok())
    }

    /// Load from `path`, then apply overrides read through `lookup`.
    pub fn load_with<F>(path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::load_from(path)?;
        config.apply_env(lookup)?;
        config.validate()?;
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

    /// Apply environment overrides. Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(model) = get("HARNESS_MODEL") {
            self.model = model;
        }
        if let Some(v) = get("HARNESS_MAX_TOKENS") {
            self.max_tokens = parse_number("HARNESS_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("HARNESS_MAX_TURNS") {
            self.max_turns = parse_number("HARNESS_MAX_TURNS", &v)?;
        }
        if let Some(prompt) = get("HARNESS_SYSTEM_PROMPT") {
            self.system_prompt = prompt;
        }
        if let Some(addr) = get("HARNESS_ADDR") {
            let (host, port) = parse_addr(&addr)?;
            if let Some(host) = host {
                self.gateway.host = host;
            }
            self.gateway.port = port;
        }
        if let Some(url) = get("ANTHROPIC_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(level) = get("HARNESS_LOG_LEVEL") {
            self.logging.level = level.to_ascii_lowercase();
        }
        if let Some(format) = get("HARNESS_LOG_FORMAT") {
            self.logging.format = LogFormat::parse(&format);
        }
        if let Some(path) = get("HARNESS_AGENT_LOG") {
            self.logging.transcript_path = Some(PathBuf::from(path));
        }
        if let Some(format) = get("HARNESS_AGENT_LOG_FORMAT") {
            self.logging.transcript_format = LogFormat::parse(&format);
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".harness")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "max_turns must be at least 1".into(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "max_tokens must be at least 1".into(),
            ));
        }
        if self.gateway.subscriber_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.subscriber_buffer must be at least 1".into(),
            ));
        }
        if self.gateway.heartbeat_secs == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.heartbeat_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The API key, or an error naming the variable to set.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            max_turns: default_max_turns(),
            system_prompt: String::new(),
            gateway: GatewayConfig::default(),
            provider: ProviderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key}: invalid number '{value}'")))
}

/// Accepts `:port` or `host:port`.
fn parse_addr(addr: &str) -> Result<(Option<String>, u16), ConfigError> {
    let (host, port) = addr.rsplit_once(':').ok_or_else(|| {
        ConfigError::ValidationError(format!("HARNESS_ADDR: expected host:port, got '{addr}'"))
    })?;
    let port = parse_number("HARNESS_ADDR", port)?;
    let host = (!host.is_empty()).then(|| host.to_string());
    Ok((host, port))
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

    #[error("ANTHROPIC_API_KEY environment variable is required")]
    MissingApiKey,
}
