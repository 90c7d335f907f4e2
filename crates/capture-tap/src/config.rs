//! Configuration types for the capture layer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// How often the poller drains the in-page queue.
    pub poll_interval_ms: u64,
    /// Request/response bodies longer than this are cut inside the page.
    pub max_body_chars: usize,
    /// Take network traffic from protocol events instead of the shim's
    /// fetch/XHR hooks. Needs a live page connection.
    pub network_domain: bool,
    /// Capacity of the live capture broadcast.
    pub listener_buffer: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            max_body_chars: 4096,
            network_domain: false,
            listener_buffer: 256,
        }
    }
}

impl CaptureConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
