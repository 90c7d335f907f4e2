use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// High-level error categories surfaced by the connector and page driver.
#[derive(Clone, Debug, Eq, PartialEq, Error, Serialize, Deserialize)]
pub enum AdapterErrorKind {
    #[error("browser connection failed")]
    Connection,
    #[error("command timed out")]
    CommandTimeout,
    #[error("command rejected by browser")]
    Command,
    #[error("malformed protocol message")]
    Protocol,
    #[error("target element not found")]
    TargetNotFound,
    #[error("navigation failed")]
    Navigation,
    #[error("script evaluation failed")]
    Script,
    #[error("internal error")]
    Internal,
}

/// Enriched error metadata passed back to higher layers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub hint: Option<String>,
    pub retriable: bool,
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, ": {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for AdapterError {}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind) -> Self {
        Self {
            kind,
            hint: None,
            retriable: false,
            data: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn retriable(mut self, flag: bool) -> Self {
        self.retriable = flag;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn connection(hint: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Connection).with_hint(hint)
    }

    /// Error reply carried in a response's `error` field.
    pub fn command(method: &str, code: i64, message: &str) -> Self {
        Self::new(AdapterErrorKind::Command)
            .with_hint(format!("{method} failed with {code}: {message}"))
            .with_data(serde_json::json!({
                "method": method,
                "code": code,
                "message": message,
            }))
    }

    pub fn is_connection(&self) -> bool {
        self.kind == AdapterErrorKind::Connection
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == AdapterErrorKind::CommandTimeout
    }

    /// Remote `{code, message}` for [`AdapterErrorKind::Command`] errors.
    pub fn command_error(&self) -> Option<(i64, String)> {
        if self.kind != AdapterErrorKind::Command {
            return None;
        }
        let data = self.data.as_ref()?;
        let code = data.get("code")?.as_i64()?;
        let message = data.get("message")?.as_str()?.to_string();
        Some((code, message))
    }
}
