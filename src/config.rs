// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "RELAY_CONFIG_PATH";

fn default_poll_interval_secs() -> u64 {
    120
}
fn default_max_attempts() -> u8 {
    3
}
fn default_backoff_secs() -> u64 {
    5
}
fn default_watermark_path() -> PathBuf {
    PathBuf::from("state/watermark.json")
}
fn default_feed_timeout_secs() -> u64 {
    10
}
fn default_send_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub feed_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_watermark_path")]
    pub watermark_path: PathBuf,
    #[serde(default = "default_max_attempts")]
    pub delivery_max_attempts: u8,
    #[serde(default = "default_backoff_secs")]
    pub delivery_backoff_secs: u64,
    /// Per-request timeout for the feed fetch.
    #[serde(default = "default_feed_timeout_secs")]
    pub feed_timeout_secs: u64,
    /// Per-request timeout for each destination send.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    pub destinations: Vec<DestinationConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DestinationConfig {
    Discord {
        webhook_url: String,
        #[serde(default)]
        label: Option<String>,
    },
    Telegram {
        bot_token: String,
        chat_id: String,
    },
}

impl RelayConfig {
    fn validate(self) -> Result<Self> {
        if self.feed_url.trim().is_empty() {
            return Err(anyhow!("feed_url must not be empty"));
        }
        if self.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs must be positive"));
        }
        if self.delivery_max_attempts == 0 {
            return Err(anyhow!("delivery_max_attempts must be at least 1"));
        }
        if self.feed_timeout_secs == 0 || self.send_timeout_secs == 0 {
            return Err(anyhow!("request timeouts must be positive"));
        }
        if self.destinations.is_empty() {
            return Err(anyhow!("at least one destination is required"));
        }
        for d in &self.destinations {
            match d {
                DestinationConfig::Discord { webhook_url, .. } if webhook_url.trim().is_empty() => {
                    return Err(anyhow!("discord destination needs a webhook_url"));
                }
                DestinationConfig::Telegram {
                    bot_token, chat_id, ..
                } if bot_token.trim().is_empty() || chat_id.trim().is_empty() => {
                    return Err(anyhow!("telegram destination needs bot_token and chat_id"));
                }
                _ => {}
            }
        }
        Ok(self)
    }
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<RelayConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading relay config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
}

/// Load config using env var + fallbacks:
/// 1) $RELAY_CONFIG_PATH
/// 2) config/relay.toml
/// 3) config/relay.json
pub fn load_config_default() -> Result<RelayConfig> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        }
        return Err(anyhow!("RELAY_CONFIG_PATH points to non-existent path"));
    }
    let toml_p = PathBuf::from("config/relay.toml");
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    let json_p = PathBuf::from("config/relay.json");
    if json_p.exists() {
        return load_config_from(&json_p);
    }
    Err(anyhow!(
        "no relay config found (set {ENV_PATH} or add config/relay.toml)"
    ))
}

fn parse_config(s: &str, hint_ext: &str) -> Result<RelayConfig> {
    let cfg: RelayConfig = if hint_ext == "json" || s.trim_start().starts_with('{') {
        serde_json::from_str(s).context("parsing relay config as json")?
    } else {
        toml::from_str(s).context("parsing relay config as toml")?
    };
    cfg.validate()
}
