//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.murmur/config.json`) and environment.
//! Loaded once at startup and treated as read-only afterwards.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::llm::{GenerationParameters, PromptTemplate};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Completion backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Reply pacing and notice texts.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Channel settings (e.g. Telegram).
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// Completion backend (llama.cpp server style `/completion` endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Server root; `/completion` is appended. Overridden by MURMUR_BACKEND_URL env.
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Overall request timeout in seconds. 0 disables the timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Prompt template; `{message}` is replaced with the inbound text.
    #[serde(default)]
    pub prompt: PromptTemplate,

    /// Sampling parameters sent with every request.
    #[serde(default)]
    pub parameters: GenerationParameters,
}

fn default_backend_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            timeout_secs: default_timeout_secs(),
            prompt: PromptTemplate::default(),
            parameters: GenerationParameters::default(),
        }
    }
}

impl BackendConfig {
    /// Request timeout, or None when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Relay behaviour: pacing between corrections and the fixed notice texts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Minimum pause after each correction, in milliseconds. 0 sends corrections as fast as fragments arrive.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// When true, fragments that are already buffered after the pause are merged into one correction.
    #[serde(default)]
    pub coalesce: bool,

    /// Placeholder sent before the backend answers. `{message}` is replaced with the inbound text.
    #[serde(default = "default_waiting_notice")]
    pub waiting_notice: String,

    /// Final text when the backend produced no output.
    #[serde(default = "default_empty_notice")]
    pub empty_notice: String,

    /// Final text when the backend request failed.
    #[serde(default = "default_error_notice")]
    pub error_notice: String,
}

fn default_pacing_ms() -> u64 {
    1000
}

fn default_waiting_notice() -> String {
    "Thanks for sending\n{message}".to_string()
}

fn default_empty_notice() -> String {
    "(no output)".to_string()
}

fn default_error_notice() -> String {
    "(the backend failed to answer, please try again later)".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
            coalesce: false,
            waiting_notice: default_waiting_notice(),
            empty_notice: default_empty_notice(),
            error_notice: default_error_notice(),
        }
    }
}

impl RelayConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    /// Waiting notice with the inbound text interpolated.
    pub fn waiting_notice_for(&self, message: &str) -> String {
        self.waiting_notice.replace("{message}", message)
    }
}

/// Per-channel config (e.g. Telegram bot token).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    non_empty_env("TELEGRAM_BOT_TOKEN").or_else(|| {
        config
            .channels
            .telegram
            .bot_token
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the backend base URL: env MURMUR_BACKEND_URL overrides config.
pub fn resolve_backend_url(config: &Config) -> String {
    non_empty_env("MURMUR_BACKEND_URL")
        .unwrap_or_else(|| config.backend.base_url.clone())
        .trim_end_matches('/')
        .to_string()
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("MURMUR_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".murmur").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or the default path). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
