//! Shared primitives for the record/replay stack.
//!
//! Every layer above this crate (transport, locator, gate, flow, capture) speaks
//! in these types: the recorded [`Session`] and its [`RecordedStep`]s, the
//! [`ElementDescriptor`] a step targets, and the value objects produced while
//! replaying ([`HealingResult`], [`PlaybackResult`], [`Capture`]).

pub mod capture;
pub mod descriptor;
pub mod repository;
pub mod results;
pub mod secret;
pub mod session;
pub mod step;

pub use capture::{Capture, CaptureType};
pub use descriptor::{BoundingBox, ElementDescriptor};
pub use repository::{InMemoryObjectRepository, JsonObjectRepository, ObjectRepository};
pub use results::{FailureKind, HealStrategy, HealingResult, PlaybackResult};
pub use secret::{SecretBox, SecretError};
pub use session::{Session, SessionError, SCHEMA_VERSION};
pub use step::{
    AlertAction, CheckpointSpec, CheckpointTarget, ElementTarget, MatchMode, RecordedStep,
    ScrollTarget, StepAction, StepKind, TextInput,
};

use std::fmt;
use uuid::Uuid;

#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
