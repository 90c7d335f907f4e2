use cdp_adapter::AdapterError;
use thiserror::Error;

/// Errors emitted by the capture surface.
#[derive(Clone, Debug, Error)]
pub enum CaptureError {
    #[error("capture shim could not be injected: {0}")]
    Injection(String),

    #[error("drain failed: {0}")]
    Drain(String),

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A capture assertion did not hold. `captured` lists what was seen
    /// among the relevant records.
    #[error("{assertion}: expected {expected}; captured {}", render_captured(.captured))]
    AssertionFailed {
        assertion: String,
        expected: String,
        captured: Vec<String>,
    },

    #[error("cdp error: {0}")]
    Cdp(String),
}

impl CaptureError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaptureError::Drain(_) | CaptureError::Cdp(_))
    }

    pub fn severity(&self) -> u8 {
        match self {
            CaptureError::Drain(_) => 0,
            CaptureError::AssertionFailed { .. } => 2,
            CaptureError::InvalidPattern { .. } => 1,
            CaptureError::Injection(_) | CaptureError::Cdp(_) => 2,
        }
    }
}

impl From<AdapterError> for CaptureError {
    fn from(err: AdapterError) -> Self {
        CaptureError::Cdp(err.to_string())
    }
}

fn render_captured(captured: &[String]) -> String {
    if captured.is_empty() {
        "nothing".to_string()
    } else {
        format!("{} record(s): [{}]", captured.len(), captured.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assertion_message_lists_captured_records() {
        let err = CaptureError::AssertionFailed {
            assertion: "assert_no_server_errors".into(),
            expected: "no 5xx responses".into(),
            captured: vec!["#3 network-response GET /api -> 500".into()],
        };
        let text = err.to_string();
        assert!(text.contains("1 record(s)"));
        assert!(text.contains("-> 500"));
    }

    #[test]
    fn empty_capture_list_reads_as_nothing() {
        let err = CaptureError::AssertionFailed {
            assertion: "assert_request".into(),
            expected: "POST /login".into(),
            captured: vec![],
        };
        assert!(err.to_string().ends_with("captured nothing"));
    }
}
