//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.solace/config.json`) and environment.
//! Covers the relay server, the upstream completion API, and the gesture bridge.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Completion relay server settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Upstream completion API (OpenAI-compatible) settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Gesture bridge settings (cooldown, frame cadence).
    #[serde(default)]
    pub gesture: GestureConfig,
}

/// Relay bind, port, and auth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Port for the relay HTTP endpoint (default 5000).
    #[serde(default = "default_relay_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_relay_bind")]
    pub bind: String,

    /// Optional bearer token required on POST /chat. Overridden by SOLACE_RELAY_TOKEN env.
    /// Required when bind is not loopback.
    pub token: Option<String>,
}

fn default_relay_port() -> u16 {
    5000
}

fn default_relay_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_relay_port(),
            bind: default_relay_bind(),
            token: None,
        }
    }
}

/// Upstream completion API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamConfig {
    /// Base URL of the OpenAI-compatible chat completions API.
    #[serde(default = "default_upstream_base_url")]
    pub base_url: String,

    /// Model id passed to the completions endpoint.
    #[serde(default = "default_upstream_model")]
    pub model: String,

    /// API key. Overridden by OPENAI_API_KEY env when set.
    pub api_key: Option<String>,
}

fn default_upstream_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_upstream_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_base_url(),
            model: default_upstream_model(),
            api_key: None,
        }
    }
}

/// Gesture bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureConfig {
    /// Cooldown after a submission completes, in milliseconds (default 1200).
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Classifier poll interval, in milliseconds (default 16, roughly one display frame).
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

fn default_cooldown_ms() -> u64 {
    1200
}

fn default_frame_interval_ms() -> u64 {
    16
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("SOLACE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".solace").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Resolve the relay token: env SOLACE_RELAY_TOKEN overrides config.
pub fn resolve_relay_token(config: &Config) -> Option<String> {
    std::env::var("SOLACE_RELAY_TOKEN")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .relay
                .token
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the upstream API key: env OPENAI_API_KEY overrides config.
pub fn resolve_api_key(config: &Config) -> Option<String> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .upstream
                .api_key
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Load config from the default path (or SOLACE_CONFIG_PATH). Missing file => default config.
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
