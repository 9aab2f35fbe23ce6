//! Relay configuration
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Command-line arguments (highest, applied by the binary)
//! 2. Environment variables (CHAT_RELAY_*, then legacy OPENAI_*)
//! 3. Config file (`--config`, ./config.toml, or ~/.chat-relay/config.toml)
//! 4. Default values (lowest)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default OpenAI-compatible API base
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Configuration for the upstream completion provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Server-held API key, used when a request brings none of its own
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Whole-request timeout in seconds (covers the streamed body)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl ProviderConfig {
    /// OpenAI-compatible provider at `api_base` with a server-held key
    pub fn openai(api_base: String, api_key: String) -> Self {
        Self {
            api_base,
            api_key: Some(api_key),
            ..Self::default()
        }
    }

    /// Apply environment overrides on top of the file values.
    ///
    /// - `CHAT_RELAY_API_KEY`, falling back to `OPENAI_API_KEY`
    /// - `CHAT_RELAY_API_BASE`, falling back to `OPENAI_API_BASE`
    pub fn apply_env(&mut self) {
        if let Some(key) = env_first(&["CHAT_RELAY_API_KEY", "OPENAI_API_KEY"]) {
            self.api_key = Some(key);
        }
        if let Some(base) = env_first(&["CHAT_RELAY_API_BASE", "OPENAI_API_BASE"]) {
            self.api_base = base;
        }
    }

    /// Chat-completions endpoint under the configured base
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    /// Server-held key, ignoring blank values
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn env_first(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty())
}

/// Top-level configuration file layout
///
/// ```toml
/// [server]
/// host = "127.0.0.1"
/// port = 8848
///
/// [provider]
/// api_base = "https://api.openai.com/v1"
/// api_key = "sk-..."
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[cfg(feature = "gate")]
    #[serde(default)]
    pub server: crate::gate::GatewayConfig,

    #[serde(default)]
    pub provider: ProviderConfig,
}

impl AppConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        Self::from_toml(&content)
    }

    /// First existing config file: explicit path, ./config.toml, then
    /// ~/.chat-relay/config.toml
    pub fn locate(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }

        let local = PathBuf::from("./config.toml");
        if local.exists() {
            return Some(local);
        }

        dirs::home_dir()
            .map(|home| home.join(".chat-relay").join("config.toml"))
            .filter(|path| path.exists())
    }

    /// Load from the located file (or defaults) and apply env overrides
    pub fn load(explicit: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match Self::locate(explicit) {
            Some(path) => {
                tracing::info!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                tracing::info!("No config file found, using defaults");
                Self::default()
            }
        };
        config.provider.apply_env();
        Ok(config)
    }
}
