//! HealReplay library
//!
//! Configuration and logging setup shared by the `healreplay` binary and its
//! integration tests. The replay machinery itself lives in the workspace
//! crates re-exported below.

pub mod config;
pub mod logging;

pub use action_flow::{ReplayEngine, ReplayOptions};
pub use capture_tap::{CaptureConfig, CaptureSession};
pub use config::{load_config, AppConfig, LoadedConfig};
pub use replay_core_types::{PlaybackResult, Session};
