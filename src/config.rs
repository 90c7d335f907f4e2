//! Application configuration
//!
//! One YAML file with a section per subsystem. Every section falls back to
//! its defaults, so an empty or missing file is a valid configuration.
//! A few `HEALREPLAY_*` environment variables override the file.

use std::env;
use std::path::{Path, PathBuf};

use action_flow::ReplayOptions;
use action_locator::OpenAiHealerConfig;
use anyhow::{Context, Result};
use capture_tap::CaptureConfig;
use cdp_adapter::CdpConfig;
use serde::{Deserialize, Serialize};
use tokio::fs;

pub const ENV_CDP_PORT: &str = "HEALREPLAY_CDP_PORT";
pub const ENV_CDP_WS: &str = "HEALREPLAY_CDP_WS";
pub const ENV_HEALER_API_KEY: &str = "HEALREPLAY_HEALER_API_KEY";
pub const ENV_SECRET_KEY: &str = "HEALREPLAY_SECRET_KEY";
pub const ENV_LOG: &str = "HEALREPLAY_LOG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cdp: CdpConfig,
    pub replay: ReplayOptions,
    pub healer: HealerSettings,
    pub capture: CaptureConfig,
    pub logging: LoggingConfig,
    /// Base64 key for secret text inputs. Normally supplied through the
    /// environment rather than written to the file.
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealerSettings {
    pub enabled: bool,
    /// Variable the API key is read from when the file carries none.
    pub api_key_env: String,
    #[serde(flatten)]
    pub openai: OpenAiHealerConfig,
}

impl Default for HealerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key_env: "OPENAI_API_KEY".to_string(),
            openai: OpenAiHealerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    /// Daily rolling log files go here when set.
    pub file_dir: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_dir: None,
            file_prefix: "healreplay.log".to_string(),
        }
    }
}

pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: PathBuf,
    /// False when the file did not exist and defaults were used.
    pub found: bool,
}

pub fn default_config_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().context("Failed to get config directory")?;
    path.push("healreplay");
    path.push("config.yaml");
    Ok(path)
}

/// Reads the config file (explicit path or the per-user default) and applies
/// environment overrides. A missing file yields defaults.
pub async fn load_config(config_path: Option<&Path>) -> Result<LoadedConfig> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    let (mut config, found) = if fs::try_exists(&path).await.unwrap_or(false) {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = parse_config(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        (config, true)
    } else {
        (AppConfig::default(), false)
    };

    apply_env_overrides(&mut config);
    Ok(LoadedConfig {
        config,
        path,
        found,
    })
}

pub fn parse_config(content: &str) -> Result<AppConfig> {
    if content.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    Ok(serde_yaml::from_str(content)?)
}

pub fn apply_env_overrides(config: &mut AppConfig) {
    apply_overrides_from(config, |key| env::var(key).ok());
}

/// Applies overrides read through `lookup`. Malformed values are ignored and
/// left for the caller to notice through the effective config.
pub fn apply_overrides_from(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(port) = lookup(ENV_CDP_PORT).and_then(|raw| raw.trim().parse::<u16>().ok()) {
        config.cdp.port = port;
    }
    if let Some(ws) = lookup(ENV_CDP_WS) {
        config.cdp.websocket_url = Some(ws.trim().to_string());
    }
    if let Some(key) = lookup(ENV_HEALER_API_KEY) {
        config.healer.openai.api_key = Some(key);
    } else if config.healer.openai.api_key.is_none() {
        config.healer.openai.api_key = lookup(&config.healer.api_key_env);
    }
    if let Some(secret) = lookup(ENV_SECRET_KEY) {
        config.secret_key = Some(secret.trim().to_string());
    }
    if let Some(level) = lookup(ENV_LOG) {
        config.logging.level = level.trim().to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_gate::PopupPolicy;
    use std::collections::HashMap;

    #[test]
    fn sections_fall_back_to_defaults() {
        let config = parse_config(
            r#"
cdp:
  port: 9333
replay:
  popup_policy: dismiss
  step_timeout_ms: 15000
healer:
  enabled: true
  model: gpt-4o
capture:
  poll_interval_ms: 100
"#,
        )
        .unwrap();

        assert_eq!(config.cdp.port, 9333);
        assert_eq!(config.cdp.host, "127.0.0.1");
        assert_eq!(config.replay.popup_policy, PopupPolicy::Dismiss);
        assert_eq!(config.replay.step_timeout_ms, 15_000);
        assert_eq!(config.replay.healer_timeout_ms, 30_000);
        assert!(config.healer.enabled);
        assert_eq!(config.healer.openai.model, "gpt-4o");
        assert_eq!(config.healer.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.capture.poll_interval_ms, 100);
        assert_eq!(config.capture.max_body_chars, 4096);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn empty_file_is_default() {
        let config = parse_config("   \n").unwrap();
        assert_eq!(config.cdp.port, 9222);
    }

    #[test]
    fn overrides_win_over_file_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_CDP_PORT, "9444"),
            (ENV_CDP_WS, "ws://127.0.0.1:9444/devtools/page/1"),
            (ENV_HEALER_API_KEY, "sk-test"),
            (ENV_SECRET_KEY, " a2V5 "),
            (ENV_LOG, "debug"),
        ]);
        let mut config = AppConfig::default();
        apply_overrides_from(&mut config, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.cdp.port, 9444);
        assert_eq!(
            config.cdp.websocket_url.as_deref(),
            Some("ws://127.0.0.1:9444/devtools/page/1")
        );
        assert_eq!(config.healer.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.secret_key.as_deref(), Some("a2V5"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn malformed_port_is_ignored() {
        let mut config = AppConfig::default();
        apply_overrides_from(&mut config, |key| {
            (key == ENV_CDP_PORT).then(|| "not-a-port".to_string())
        });
        assert_eq!(config.cdp.port, 9222);
    }

    #[test]
    fn api_key_falls_back_to_named_variable() {
        let mut config = AppConfig::default();
        config.healer.api_key_env = "MY_LLM_KEY".into();
        apply_overrides_from(&mut config, |key| {
            (key == "MY_LLM_KEY").then(|| "sk-from-named".to_string())
        });
        assert_eq!(config.healer.openai.api_key.as_deref(), Some("sk-from-named"));
    }
}
