use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where the browser's debugging endpoint lives and how long commands may take.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CdpConfig {
    pub host: String,
    pub port: u16,
    /// Skips HTTP discovery when set.
    pub websocket_url: Option<String>,
    pub command_timeout_ms: u64,
    pub discovery_timeout_ms: u64,
    /// Upper bound for `navigate` waiting on `document.readyState`.
    pub navigation_timeout_ms: u64,
    pub command_buffer: usize,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9222,
            websocket_url: None,
            command_timeout_ms: 30_000,
            discovery_timeout_ms: 5_000,
            navigation_timeout_ms: 30_000,
            command_buffer: 128,
        }
    }
}

impl CdpConfig {
    pub fn http_endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}
