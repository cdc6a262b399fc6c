//! Configuration loading, validation, and management for Ripple.
//!
//! Loads configuration from `~/.ripple/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use ripple_core::Role;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ripple/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// History trimming policy
    #[serde(default)]
    pub history: HistoryConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Conversation and checkpoint storage
    #[serde(default)]
    pub store: StoreConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Base URL of a remote tool service (tools without their own endpoint
    /// are posted to `{tool_service_url}/{name}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_service_url: Option<String>,

    /// Key sent to the remote tool service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_service_key: Option<String>,

    /// Remote tool definitions
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
}

fn default_provider() -> String {
    "anthropic".into()
}
fn default_model() -> String {
    "claude-3-5-sonnet-20241022".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
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
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("history", &self.history)
            .field("gateway", &self.gateway)
            .field("store", &self.store)
            .field("providers", &self.providers)
            .field("tool_service_url", &self.tool_service_url)
            .field("tool_service_key", &redact(&self.tool_service_key))
            .field("tools", &self.tools)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// System prompt prepended to every model invocation
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Upper bound on AGENT visits per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_system_prompt() -> String {
    "You are a helpful assistant with access to tools. Use a tool when it \
     helps answer the question, and explain tool failures plainly."
        .into()
}
fn default_max_iterations() -> u32 {
    25
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_iterations: default_max_iterations(),
        }
    }
}

/// What the history budget is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimUnit {
    MessageCount,
    ApproxTokenCount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Budget, in `unit`s
    #[serde(default = "default_max_units")]
    pub max_units: usize,

    #[serde(default = "default_unit")]
    pub unit: TrimUnit,

    /// Keep a leading system message regardless of budget pressure
    #[serde(default = "default_true")]
    pub always_include_system: bool,

    /// Role the retained window must start on
    #[serde(default = "default_boundary_role")]
    pub boundary_role: Role,

    /// Allow cutting an oversized newest message instead of dropping it
    #[serde(default = "default_true")]
    pub allow_partial: bool,
}

fn default_max_units() -> usize {
    10
}
fn default_unit() -> TrimUnit {
    TrimUnit::MessageCount
}
fn default_boundary_role() -> Role {
    Role::User
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_units: default_max_units(),
            unit: default_unit(),
            always_include_system: true,
            boundary_role: default_boundary_role(),
            allow_partial: true,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Accepted bearer tokens. Empty = accept unauthenticated local callers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bearer_tokens: Vec<String>,

    /// Idle interval after which the relay writes a keep-alive comment
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_keep_alive_secs() -> u64 {
    15
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("bearer_tokens", &format!("[{} REDACTED]", self.bearer_tokens.len()))
            .field("keep_alive_secs", &self.keep_alive_secs)
            .field("body_limit_bytes", &self.body_limit_bytes)
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            bearer_tokens: vec![],
            keep_alive_secs: default_keep_alive_secs(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory" or "file"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Directory for the file backend (defaults to `~/.ripple/data`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_store_backend() -> String {
    "memory".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Send cache breakpoints to providers that support prompt caching
    #[serde(default = "default_true")]
    pub prompt_caching: bool,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("prompt_caching", &self.prompt_caching)
            .finish()
    }
}

/// A tool exposed by a remote tool service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Full endpoint URL; falls back to `{tool_service_url}/{name}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// JSON Schema for the tool input
    #[serde(default = "default_parameters")]
    pub parameters: serde_json::Value,

    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_parameters() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}
fn default_tool_timeout() -> u64 {
    60
}

impl AppConfig {
    /// Load configuration from the default path (~/.ripple/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `RIPPLE_API_KEY` (highest priority)
    /// - `ANTHROPIC_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
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

    fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("RIPPLE_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("RIPPLE_PROVIDER") {
            self.default_provider = provider;
        }

        if let Ok(model) = std::env::var("RIPPLE_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ripple")
    }

    /// Directory used by the file store when `store.path` is unset.
    pub fn data_dir(&self) -> PathBuf {
        self.store
            .path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::config_dir().join("data"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.history.max_units == 0 {
            return Err(ConfigError::ValidationError(
                "history.max_units must be at least 1".into(),
            ));
        }

        if self.history.boundary_role == Role::System {
            return Err(ConfigError::ValidationError(
                "history.boundary_role cannot be \"system\"".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "memory" | "file") {
            return Err(ConfigError::ValidationError(format!(
                "unknown store backend '{}' (expected \"memory\" or \"file\")",
                self.store.backend
            )));
        }

        for tool in &self.tools {
            if tool.endpoint.is_none() && self.tool_service_url.is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "tool '{}' has no endpoint and no tool_service_url is set",
                    tool.name
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            history: HistoryConfig::default(),
            gateway: GatewayConfig::default(),
            store: StoreConfig::default(),
            providers: HashMap::new(),
            tool_service_url: None,
            tool_service_key: None,
            tools: vec![],
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
