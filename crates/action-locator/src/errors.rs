//! Error types for locator resolution and healing

use cdp_adapter::AdapterError;
use thiserror::Error;

/// Locator error enumeration
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Descriptor carries no usable locator
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Every non-empty strategy was tried and none matched
    #[error("Element not found: {descriptor} (tried {})", tried.join(", "))]
    ElementNotFound {
        descriptor: String,
        tried: Vec<String>,
    },

    /// Healer answered but its locator matched nothing
    #[error("Healed locator {strategy}={locator} not found on page")]
    HealedLocatorNotFound { strategy: String, locator: String },

    /// Healer and DOM fallback both failed
    #[error("Healing exhausted for {descriptor}: healer: {healer_reason}; fallback: {fallback_reason}")]
    HealingExhausted {
        descriptor: String,
        healer_reason: String,
        fallback_reason: String,
    },

    /// Healer transport failure
    #[error("Healer error: {0}")]
    HealerFailed(String),

    /// Browser communication error
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Timeout during resolution
    #[error("Resolution timeout: {0}")]
    Timeout(String),
}

impl LocatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, LocatorError::Timeout(_) | LocatorError::CdpError(_))
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::CdpError(_) | LocatorError::Timeout(_) => 2,
            LocatorError::HealingExhausted { .. } | LocatorError::HealedLocatorNotFound { .. } => 2,
            LocatorError::ElementNotFound { .. } | LocatorError::HealerFailed(_) => 1,
            LocatorError::InvalidDescriptor(_) => 0,
        }
    }

    /// Healing ran (healer or fallback) and still failed.
    pub fn is_healing_failure(&self) -> bool {
        matches!(
            self,
            LocatorError::HealingExhausted { .. } | LocatorError::HealedLocatorNotFound { .. }
        )
    }
}

impl From<AdapterError> for LocatorError {
    fn from(err: AdapterError) -> Self {
        if err.is_timeout() {
            LocatorError::Timeout(err.to_string())
        } else {
            LocatorError::CdpError(err.to_string())
        }
    }
}
