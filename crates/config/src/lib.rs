//! Configuration loading, validation, and management for groupclaw.
//!
//! Loads configuration from `~/.groupclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Value used in place of a missing API key. Every completion call made
/// with it is rejected by the provider.
pub const MISSING_API_KEY: &str = "null";

/// The root configuration structure.
///
/// Maps directly to `~/.groupclaw/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// User segment of the single group conversation to answer in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<String>,

    /// Google AI Studio API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Completion provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Messaging bridge settings
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Persona prompt settings
    #[serde(default)]
    pub persona: PersonaConfig,

    /// Context window settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Delays and retry bounds
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("whitelist", &self.whitelist)
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("bridge", &self.bridge)
            .field("persona", &self.persona)
            .field("context", &self.context)
            .field("timing", &self.timing)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_model() -> String {
    "gemini-2.0-flash-lite".into()
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            temperature: None,
            max_output_tokens: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// HTTP base URL of the WhatsApp Web bridge
    #[serde(default = "default_bridge_url")]
    pub base_url: String,

    /// WebSocket URL for session events; derived from `base_url` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_url: Option<String>,

    /// Bearer token sent with every bridge request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Per-request timeout for bridge HTTP calls
    #[serde(default = "default_bridge_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_bridge_timeout_secs() -> u64 {
    30
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:3000".into()
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("base_url", &self.base_url)
            .field("events_url", &self.events_url)
            .field("token", &redact(&self.token))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_bridge_url(),
            events_url: None,
            token: None,
            timeout_secs: default_bridge_timeout_secs(),
        }
    }
}

impl BridgeConfig {
    /// The events WebSocket URL: explicit, or `ws(s)://<base>/events`.
    pub fn resolved_events_url(&self) -> String {
        if let Some(url) = &self.events_url {
            return url.clone();
        }
        let base = self.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{ws_base}/events")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Persona instructions prepended to every completion request
    #[serde(default = "default_persona")]
    pub prompt: String,

    /// Author name shown for our own messages in the context window
    #[serde(default = "default_persona_name")]
    pub name: String,
}

fn default_persona_name() -> String {
    "groupclaw".into()
}

/// Default persona: a terse, sarcastic regular of the group.
pub const DEFAULT_PERSONA: &str = "You are a long-time member of this group chat. \
Reply the way a blunt, sarcastic friend would: short, casual, in the language the \
group is using. Answer only what was asked. Do not mention that you are an AI and \
do not prefix your reply with your own name.";

fn default_persona() -> String {
    DEFAULT_PERSONA.into()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            prompt: default_persona(),
            name: default_persona_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Ceiling of the growing context window
    #[serde(default = "default_max_window")]
    pub max_window: usize,
}

fn default_max_window() -> usize {
    8
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_window: default_max_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Hold each incoming message this long before answering
    #[serde(default = "default_trigger_delay_ms")]
    pub trigger_delay_ms: u64,

    /// Fixed pause between attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Attempts per message before giving up (0 = never give up)
    #[serde(default)]
    pub max_attempts: u32,

    /// Pause before re-opening the session after a disconnect
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_trigger_delay_ms() -> u64 {
    3_000
}
fn default_retry_delay_ms() -> u64 {
    5_000
}
fn default_reconnect_delay_ms() -> u64 {
    5_000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            trigger_delay_ms: default_trigger_delay_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_attempts: 0,
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.groupclaw/config.toml),
    /// then apply environment overrides.
    ///
    /// Callers wanting `.env` support load it before calling this.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through `lookup`.
    ///
    /// - `GROUP_WHITELIST_ID` → `whitelist`
    /// - `GOOGLE_AI_STUDIO_API_KEY` → `api_key` (only when the file has none)
    /// - `GROUPCLAW_MODEL` → `provider.model`
    /// - `GROUPCLAW_BRIDGE_URL` → `bridge.base_url`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(whitelist) = lookup("GROUP_WHITELIST_ID").filter(|v| !v.is_empty()) {
            self.whitelist = Some(whitelist);
        }

        if self.api_key.is_none() {
            self.api_key = lookup("GOOGLE_AI_STUDIO_API_KEY").filter(|v| !v.is_empty());
        }

        if let Some(model) = lookup("GROUPCLAW_MODEL") {
            self.provider.model = model;
        }

        if let Some(url) = lookup("GROUPCLAW_BRIDGE_URL") {
            self.bridge.base_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".groupclaw")
    }

    /// Get the configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(t) = self.provider.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.context.max_window == 0 {
            return Err(ConfigError::ValidationError(
                "context.max_window must be at least 1".into(),
            ));
        }

        if !self.bridge.base_url.starts_with("http://")
            && !self.bridge.base_url.starts_with("https://")
        {
            return Err(ConfigError::ValidationError(format!(
                "bridge.base_url must be an http(s) URL, got '{}'",
                self.bridge.base_url
            )));
        }

        if let Some(events) = &self.bridge.events_url
            && !events.starts_with("ws://")
            && !events.starts_with("wss://")
        {
            return Err(ConfigError::ValidationError(format!(
                "bridge.events_url must be a ws(s) URL, got '{events}'"
            )));
        }

        Ok(())
    }

    /// The configured whitelist, or an error when unset.
    pub fn whitelist(&self) -> Result<&str, ConfigError> {
        self.whitelist
            .as_deref()
            .ok_or(ConfigError::MissingValue("whitelist (GROUP_WHITELIST_ID)"))
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The API key, or the [`MISSING_API_KEY`] sentinel.
    pub fn api_key_or_sentinel(&self) -> &str {
        self.api_key.as_deref().unwrap_or(MISSING_API_KEY)
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            whitelist: None,
            api_key: None,
            provider: ProviderConfig::default(),
            bridge: BridgeConfig::default(),
            persona: PersonaConfig::default(),
            context: ContextConfig::default(),
            timing: TimingConfig::default(),
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

    #[error("Missing required setting: {0}")]
    MissingValue(&'static str),
}
