//! Replay orchestration
//!
//! [`ReplayEngine`] walks a recorded session step by step: popup sentinel,
//! element resolution with healing, the action itself, checkpoints. The first
//! failing step stops the run, leaves evidence behind and is reported in the
//! returned `PlaybackResult`.

pub mod engine;
pub mod errors;
pub mod evidence;
pub mod types;

pub use engine::ReplayEngine;
pub use errors::FlowError;
pub use evidence::{EvidenceSink, FsEvidenceSink, NoopEvidenceSink, StepEvidence};
pub use types::ReplayOptions;
