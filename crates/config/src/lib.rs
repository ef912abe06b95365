//! Configuration loading and validation for SiteMentor.
//!
//! Loads configuration from a TOML file with environment variable overrides.
//! Validates all settings at startup; every field has a sensible default so
//! an empty file (or no file) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Conversation store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Context assembly settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Generator settings
    #[serde(default)]
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// History TTL in seconds, refreshed on every write (default 30 days).
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Maximum messages kept per session blob (default 16 = 8 Q/A pairs).
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,

    /// Which backend to use ("in_memory" or "file").
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Directory for the file backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_dir: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            max_history_messages: default_max_history_messages(),
            backend: default_store_backend(),
            file_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// How many recent turns to load per request.
    #[serde(default = "default_load_limit")]
    pub load_limit: usize,

    /// Message-window bound for the assembled generator message list.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Messages kept from the head of an over-long window.
    #[serde(default = "default_window_head")]
    pub window_head: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            load_limit: default_load_limit(),
            max_messages: default_max_messages(),
            window_head: default_window_head(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Hard timeout for a generation call, in seconds.
    #[serde(default = "default_generator_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_generator_timeout_secs(),
        }
    }
}

fn default_ttl_seconds() -> u64 {
    2_592_000 // 30 days
}
fn default_max_history_messages() -> usize {
    16
}
fn default_store_backend() -> String {
    "in_memory".into()
}
fn default_load_limit() -> usize {
    10
}
fn default_max_messages() -> usize {
    16
}
fn default_window_head() -> usize {
    2
}
fn default_generator_timeout_secs() -> u64 {
    18
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply env overrides and
    /// validate. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            toml::from_str(&raw)?
        } else {
            warn!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `SITEMENTOR_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("SITEMENTOR_STORE_TTL_SECS") {
            match raw.parse() {
                Ok(v) => self.store.ttl_seconds = v,
                Err(_) => warn!(value = %raw, "Ignoring invalid SITEMENTOR_STORE_TTL_SECS"),
            }
        }
        if let Ok(raw) = std::env::var("SITEMENTOR_GENERATOR_TIMEOUT_SECS") {
            match raw.parse() {
                Ok(v) => self.generator.timeout_secs = v,
                Err(_) => {
                    warn!(value = %raw, "Ignoring invalid SITEMENTOR_GENERATOR_TIMEOUT_SECS")
                }
            }
        }
    }

    /// Validate all settings. Called at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.ttl_seconds == 0 {
            return Err(ConfigError::Invalid("store.ttl_seconds must be > 0".into()));
        }
        if self.store.max_history_messages < 2 {
            return Err(ConfigError::Invalid(
                "store.max_history_messages must be at least 2 (one Q/A pair)".into(),
            ));
        }
        if self.store.backend != "in_memory" && self.store.backend != "file" {
            return Err(ConfigError::Invalid(format!(
                "store.backend must be 'in_memory' or 'file', got '{}'",
                self.store.backend
            )));
        }
        if self.store.backend == "file" && self.store.file_dir.is_none() {
            return Err(ConfigError::Invalid(
                "store.file_dir is required when store.backend = 'file'".into(),
            ));
        }
        if self.context.load_limit == 0 {
            return Err(ConfigError::Invalid("context.load_limit must be > 0".into()));
        }
        if self.context.window_head >= self.context.max_messages {
            return Err(ConfigError::Invalid(
                "context.window_head must be smaller than context.max_messages".into(),
            ));
        }
        if self.generator.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "generator.timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}
