//! Step failure types

use action_gate::GateError;
use action_locator::LocatorError;
use cdp_adapter::{AdapterError, AdapterErrorKind};
use replay_core_types::{FailureKind, SecretError};
use thiserror::Error;

/// Why a single replayed step failed
#[derive(Debug, Error, Clone)]
pub enum FlowError {
    #[error("{0}")]
    ElementNotFound(String),

    #[error("{0}")]
    HealingExhausted(String),

    #[error("{0}")]
    CheckpointMismatch(String),

    #[error("{0}")]
    Navigation(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Popup(String),

    #[error("{0}")]
    Connection(String),

    /// The browser refused or failed the action itself
    #[error("{0}")]
    Action(String),
}

impl FlowError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FlowError::ElementNotFound(_) => FailureKind::ElementNotFound,
            FlowError::HealingExhausted(_) => FailureKind::HealingExhausted,
            FlowError::CheckpointMismatch(_) => FailureKind::CheckpointMismatch,
            FlowError::Navigation(_) => FailureKind::Navigation,
            FlowError::Timeout(_) => FailureKind::Timeout,
            FlowError::Popup(_) => FailureKind::Popup,
            FlowError::Connection(_) => FailureKind::Connection,
            FlowError::Action(_) => FailureKind::Action,
        }
    }

    /// A dead connection makes evidence capture pointless.
    pub fn is_connection(&self) -> bool {
        matches!(self, FlowError::Connection(_))
    }
}

impl From<LocatorError> for FlowError {
    fn from(err: LocatorError) -> Self {
        let message = err.to_string();
        match err {
            LocatorError::InvalidDescriptor(_) | LocatorError::ElementNotFound { .. } => {
                FlowError::ElementNotFound(message)
            }
            LocatorError::HealingExhausted { .. }
            | LocatorError::HealedLocatorNotFound { .. }
            | LocatorError::HealerFailed(_) => FlowError::HealingExhausted(message),
            LocatorError::Timeout(_) => FlowError::Timeout(message),
            LocatorError::CdpError(_) => FlowError::Connection(message),
        }
    }
}

impl From<GateError> for FlowError {
    fn from(err: GateError) -> Self {
        let message = err.to_string();
        match err {
            GateError::CheckpointMismatch { .. } | GateError::InvalidPattern { .. } => {
                FlowError::CheckpointMismatch(message)
            }
            GateError::Timeout { .. } => FlowError::Timeout(message),
            GateError::PopupBlocked(_) => FlowError::Popup(message),
            GateError::Connection(_) => FlowError::Connection(message),
            GateError::CdpError(_) => FlowError::Action(message),
        }
    }
}

impl From<AdapterError> for FlowError {
    fn from(err: AdapterError) -> Self {
        let message = err.to_string();
        match err.kind {
            AdapterErrorKind::Connection => FlowError::Connection(message),
            AdapterErrorKind::CommandTimeout => FlowError::Timeout(message),
            AdapterErrorKind::Navigation => FlowError::Navigation(message),
            AdapterErrorKind::TargetNotFound => FlowError::ElementNotFound(message),
            _ => FlowError::Action(message),
        }
    }
}

impl From<SecretError> for FlowError {
    fn from(err: SecretError) -> Self {
        FlowError::Action(format!("secret input could not be decrypted: {err}"))
    }
}
