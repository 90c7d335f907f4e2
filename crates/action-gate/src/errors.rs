//! Error types for gate checks

use cdp_adapter::AdapterError;
use thiserror::Error;

/// Gate error enumeration
#[derive(Debug, Error, Clone)]
pub enum GateError {
    /// Condition never held within the allotted time
    #[error("Timed out after {waited_ms}ms waiting for {what}")]
    Timeout { what: String, waited_ms: u64 },

    /// Checkpoint read a value that does not match
    #[error("Checkpoint mismatch on {check}: expected {mode} '{expected}', got '{actual}'")]
    CheckpointMismatch {
        check: String,
        mode: String,
        expected: String,
        actual: String,
    },

    /// Regex checkpoint carries a pattern that does not compile
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A popup was present and the policy refuses to handle it
    #[error("Unexpected popup: {0}")]
    PopupBlocked(String),

    /// The browser connection is gone
    #[error("Connection lost: {0}")]
    Connection(String),

    /// CDP communication error
    #[error("CDP error: {0}")]
    CdpError(String),
}

impl GateError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GateError::Timeout { .. } | GateError::CdpError(_) | GateError::Connection(_)
        )
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            GateError::Connection(_) => 3,
            GateError::CdpError(_) | GateError::InvalidPattern { .. } => 2,
            GateError::Timeout { .. }
            | GateError::CheckpointMismatch { .. }
            | GateError::PopupBlocked(_) => 1,
        }
    }
}

impl From<AdapterError> for GateError {
    fn from(err: AdapterError) -> Self {
        if err.is_connection() {
            GateError::Connection(err.to_string())
        } else {
            GateError::CdpError(err.to_string())
        }
    }
}
