//! Records drained from the in-page observation shim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureType {
    NetworkRequest,
    NetworkResponse,
    StorageSet,
    StorageRemove,
    CookieChange,
    DomMutation,
    ConsoleLog,
    JsVariable,
    CustomEvent,
}

impl CaptureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureType::NetworkRequest => "network-request",
            CaptureType::NetworkResponse => "network-response",
            CaptureType::StorageSet => "storage-set",
            CaptureType::StorageRemove => "storage-remove",
            CaptureType::CookieChange => "cookie-change",
            CaptureType::DomMutation => "dom-mutation",
            CaptureType::ConsoleLog => "console-log",
            CaptureType::JsVariable => "js-variable",
            CaptureType::CustomEvent => "custom-event",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "network-request" => CaptureType::NetworkRequest,
            "network-response" => CaptureType::NetworkResponse,
            "storage-set" => CaptureType::StorageSet,
            "storage-remove" => CaptureType::StorageRemove,
            "cookie-change" => CaptureType::CookieChange,
            "dom-mutation" => CaptureType::DomMutation,
            "console-log" => CaptureType::ConsoleLog,
            "js-variable" => CaptureType::JsVariable,
            "custom-event" => CaptureType::CustomEvent,
            _ => return None,
        })
    }

    pub fn is_network(&self) -> bool {
        matches!(
            self,
            CaptureType::NetworkRequest | CaptureType::NetworkResponse
        )
    }
}

impl fmt::Display for CaptureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation appended to the capture log. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capture {
    #[serde(rename = "type")]
    pub capture_type: CaptureType,
    /// URL for network records, key for storage, level for console, selector for DOM.
    pub source: String,
    /// Payload text, already size capped by the shim.
    #[serde(default)]
    pub data: String,
    /// Type specific extras (method, headers, old value, node summary).
    #[serde(default)]
    pub extra: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub seq: u64,
}

impl Capture {
    /// HTTP method for network captures, read from `extra.method`.
    pub fn method(&self) -> Option<&str> {
        self.extra.get("method").and_then(Value::as_str)
    }

    /// Console level (`log`, `warn`, `error`, ...) for console captures.
    pub fn level(&self) -> Option<&str> {
        if self.capture_type != CaptureType::ConsoleLog {
            return None;
        }
        self.extra
            .get("level")
            .and_then(Value::as_str)
            .or(Some(self.source.as_str()))
    }

    pub fn is_server_error(&self) -> bool {
        self.capture_type == CaptureType::NetworkResponse
            && self.status.map(|code| code >= 500).unwrap_or(false)
    }

    /// One line summary used by reports and assertion messages.
    pub fn summary(&self) -> String {
        let mut line = format!("#{} {} {}", self.seq, self.capture_type, self.source);
        if let Some(method) = self.method() {
            line = format!("#{} {} {} {}", self.seq, self.capture_type, method, self.source);
        }
        if let Some(status) = self.status {
            line.push_str(&format!(" -> {status}"));
        }
        if let Some(duration) = self.duration_ms {
            line.push_str(&format!(" ({duration:.0} ms)"));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_tags_round_trip_through_parse() {
        for raw in [
            "network-request",
            "network-response",
            "storage-set",
            "storage-remove",
            "cookie-change",
            "dom-mutation",
            "console-log",
            "js-variable",
            "custom-event",
        ] {
            let parsed = CaptureType::parse(raw).unwrap();
            assert_eq!(parsed.as_str(), raw);
        }
        assert!(CaptureType::parse("screenshot").is_none());
    }

    #[test]
    fn summary_includes_method_and_status() {
        let capture = Capture {
            capture_type: CaptureType::NetworkResponse,
            source: "https://api.test/orders".into(),
            data: "{}".into(),
            extra: json!({ "method": "POST" }),
            status: Some(500),
            duration_ms: Some(42.0),
            timestamp: Utc::now(),
            seq: 7,
        };
        assert!(capture.is_server_error());
        assert_eq!(
            capture.summary(),
            "#7 network-response POST https://api.test/orders -> 500 (42 ms)"
        );
    }
}
