//! Recorded sessions and their on-disk JSON form.
//!
//! Loading is all-or-nothing: the schema version is checked, the document is
//! validated structurally, and only then deserialized. No partial session is
//! ever handed back.

use crate::step::RecordedStep;
use crate::SessionId;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Version written by the recorder and accepted by the loader.
pub const SCHEMA_VERSION: &str = "1.0";

const SESSION_SCHEMA: &str = include_str!("../schema/session-schema.json");

static VALIDATOR: Lazy<Result<jsonschema::Validator, String>> = Lazy::new(|| {
    let schema: Value = serde_json::from_str(SESSION_SCHEMA).map_err(|err| err.to_string())?;
    jsonschema::validator_for(&schema).map_err(|err| err.to_string())
});

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported session schema version: expected {expected}, found {found}")]
    SchemaVersion { expected: String, found: String },
    #[error("session failed structural validation: {}", .0.join("; "))]
    Structure(Vec<String>),
    #[error("session schema unavailable: {0}")]
    Schema(String),
}

impl SessionError {
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, SessionError::SchemaVersion { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub schema_version: String,
    pub session_id: SessionId,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    events: Vec<RecordedStep>,
}

impl Session {
    pub fn new(browser: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            session_id: SessionId::new(),
            start_time: Utc::now(),
            end_time: None,
            browser,
            events: Vec::new(),
        }
    }

    pub fn steps(&self) -> &[RecordedStep] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Steps are append only; recorded order is replay order.
    pub fn append(&mut self, step: RecordedStep) {
        self.events.push(step);
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let session = Self::from_json_str(&raw)?;
        debug!(
            target: "core-types",
            path = %path.display(),
            session = %session.session_id,
            steps = session.len(),
            "session loaded"
        );
        Ok(session)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, SessionError> {
        let document: Value = serde_json::from_str(raw)?;
        Self::from_value(document)
    }

    pub fn from_value(document: Value) -> Result<Self, SessionError> {
        match document.get("schemaVersion") {
            None | Some(Value::Null) => {}
            Some(Value::String(found)) if found == SCHEMA_VERSION => {}
            Some(other) => {
                let found = other
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| other.to_string());
                return Err(SessionError::SchemaVersion {
                    expected: SCHEMA_VERSION.to_string(),
                    found,
                });
            }
        }
        validate_structure(&document)?;
        Ok(serde_json::from_value(document)?)
    }

    pub fn to_json_string(&self) -> Result<String, SessionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs the bundled JSON schema over a raw session document.
pub fn validate_structure(document: &Value) -> Result<(), SessionError> {
    let validator = VALIDATOR
        .as_ref()
        .map_err(|err| SessionError::Schema(err.clone()))?;
    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|err| err.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(SessionError::Structure(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepAction;
    use serde_json::json;

    #[test]
    fn bundled_schema_compiles() {
        assert!(VALIDATOR.is_ok());
    }

    #[test]
    fn serialized_session_loads_back() {
        let mut session = Session::new(Some("chrome".into()));
        session.append(RecordedStep::new(StepAction::Navigate {
            url: "https://example.test".into(),
        }));
        session.finish();
        let raw = session.to_json_string().unwrap();
        let loaded = Session::from_json_str(&raw).unwrap();
        assert_eq!(loaded, session);
    }

    #[test]
    fn numeric_version_is_a_version_mismatch() {
        let document = json!({
            "schemaVersion": 2,
            "sessionId": "abc",
            "startTime": "2024-05-01T10:00:00Z",
            "events": []
        });
        let err = Session::from_value(document).unwrap_err();
        assert!(err.is_version_mismatch(), "{err}");
        assert!(err.to_string().contains('2'));
    }

    #[test]
    fn missing_version_is_a_structure_error() {
        let document = json!({
            "sessionId": "abc",
            "startTime": "2024-05-01T10:00:00Z",
            "events": []
        });
        let err = Session::from_value(document).unwrap_err();
        assert!(matches!(err, SessionError::Structure(_)), "{err}");
    }
}
