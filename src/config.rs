use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the crew-management API (phpVMS-style)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Host of the local simulator bridge
    #[serde(default = "default_bridge_host")]
    pub bridge_host: String,

    /// WebSocket port of the local simulator bridge
    #[serde(default = "default_bridge_port")]
    pub bridge_port: u16,

    /// Initial delay before a bridge reconnect attempt, in seconds
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Interval between live position updates to the crew API, in seconds
    #[serde(default = "default_acars_update_secs")]
    pub acars_update_secs: u64,

    /// Chat/broadcast polling interval, in seconds
    #[serde(default = "default_chat_poll_secs")]
    pub chat_poll_secs: u64,

    /// Below this ground speed a LANDED aircraft counts as stopped
    #[serde(default = "default_low_speed_threshold_kts")]
    pub low_speed_threshold_kts: f64,

    /// Optional clamp on a single distance segment, in nautical miles.
    /// Unset keeps every segment, including bridge-glitch jumps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_segment_nm: Option<f64>,
}

fn default_api_base_url() -> String {
    "https://demo.phpvms.net/api".to_string()
}

fn default_bridge_host() -> String {
    "127.0.0.1".to_string()
}

fn default_bridge_port() -> u16 {
    32123
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_acars_update_secs() -> u64 {
    30
}

fn default_chat_poll_secs() -> u64 {
    5
}

fn default_low_speed_threshold_kts() -> f64 {
    10.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            bridge_host: default_bridge_host(),
            bridge_port: default_bridge_port(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            acars_update_secs: default_acars_update_secs(),
            chat_poll_secs: default_chat_poll_secs(),
            low_speed_threshold_kts: default_low_speed_threshold_kts(),
            max_segment_nm: None,
        }
    }
}

impl AppConfig {
    /// Load config from a TOML file; missing keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config: AppConfig =
            toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(config)
    }

    /// Load from `path`, or fall back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a TOML file (atomic: write to .tmp then rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, &contents)
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", tmp_path, path))?;
        Ok(())
    }

    pub fn bridge_url(&self) -> String {
        format!("ws://{}:{}", self.bridge_host, self.bridge_port)
    }
}

/// Resolve the config file path.
///
/// Priority:
/// 1. `VACARS_CONFIG` env var
/// 2. `./vacars.toml`
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("VACARS_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("./vacars.toml")
}
