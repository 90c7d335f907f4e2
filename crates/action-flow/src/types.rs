//! Replay options

use action_gate::PopupPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Knobs for one replay run; also the `replay` section of the app config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayOptions {
    /// Upper bound for a single step, healing included.
    pub step_timeout_ms: u64,
    pub popup_policy: PopupPolicy,
    /// Evidence root; `None` disables evidence capture.
    pub evidence_dir: Option<PathBuf>,
    pub wait_poll_ms: u64,
    pub healer_timeout_ms: u64,
    /// How long an alert-action step waits for its dialog to appear.
    pub dialog_wait_ms: u64,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            step_timeout_ms: 60_000,
            popup_policy: PopupPolicy::Accept,
            evidence_dir: None,
            wait_poll_ms: 100,
            healer_timeout_ms: 30_000,
            dialog_wait_ms: 5_000,
        }
    }
}

impl ReplayOptions {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms.max(1))
    }

    pub fn wait_poll(&self) -> Duration {
        Duration::from_millis(self.wait_poll_ms.max(1))
    }

    pub fn healer_timeout(&self) -> Duration {
        Duration::from_millis(self.healer_timeout_ms.max(1))
    }

    pub fn dialog_wait(&self) -> Duration {
        Duration::from_millis(self.dialog_wait_ms)
    }
}
