//! The page-context observation shim and the wire shape of its queue.

use chrono::{DateTime, TimeZone, Utc};
use replay_core_types::{Capture, CaptureType};
use serde::Deserialize;
use serde_json::Value;

use crate::errors::CaptureError;

const SHIM_SOURCE: &str = include_str!("shim.js");

/// Swaps the in-page queue for an empty one and returns the old contents as
/// a JSON string, or `null` when no shim is installed.
pub const DRAIN_SCRIPT: &str = "(function () { var c = window.__healreplayCapture; return c && c.active && c.drain ? c.drain() : null; })()";

/// Discards whatever the shim queued so far.
pub const RESET_SCRIPT: &str = "(function () { var c = window.__healreplayCapture; return c && c.reset ? c.reset() : false; })()";

/// Stops queueing and empties the queue. The hooks stay installed and the
/// next injection switches them back on.
pub const DEACTIVATE_SCRIPT: &str = "(function () { var c = window.__healreplayCapture; return c && c.deactivate ? c.deactivate() : false; })()";

/// Result string of an injection that found the shim already active.
pub const ALREADY_ACTIVE: &str = "already-active";

/// Injection script with the body cap baked in. Re-running it on a page that
/// already has the shim returns [`ALREADY_ACTIVE`] and changes nothing; on a
/// deactivated shim it turns queueing back on with an empty queue.
pub fn injection_script(max_body_chars: usize, track_network: bool) -> String {
    SHIM_SOURCE
        .replace("__MAX_BODY_CHARS__", &max_body_chars.max(1).to_string())
        .replace("__TRACK_NETWORK__", if track_network { "true" } else { "false" })
}

/// Registers a global variable path whose value changes become
/// `js-variable` captures.
pub fn watch_script(path: &str) -> String {
    let quoted = serde_json::to_string(path).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "(function () {{ var c = window.__healreplayCapture; return c && c.watch ? c.watch({quoted}) : false; }})()"
    )
}

/// One queue entry as pushed by the shim.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCapture {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub extra: Value,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub duration_ms: Option<f64>,
    /// Milliseconds since the epoch, page clock.
    #[serde(default)]
    pub timestamp: Option<f64>,
}

impl RawCapture {
    /// Stamps the entry with its sequence number. Entries of an unknown type
    /// yield `None`.
    pub fn into_capture(self, seq: u64) -> Option<Capture> {
        let capture_type = CaptureType::parse(&self.kind)?;
        Some(Capture {
            capture_type,
            source: self.source,
            data: self.data,
            extra: self.extra,
            status: self.status,
            duration_ms: self.duration_ms,
            timestamp: self.timestamp.and_then(page_time).unwrap_or_else(Utc::now),
            seq,
        })
    }
}

fn page_time(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(millis as i64).single()
}

/// Decodes what [`DRAIN_SCRIPT`] returned. `Ok(None)` means the shim is gone,
/// usually because the page navigated.
pub fn parse_drained(value: Value) -> Result<Option<Vec<RawCapture>>, CaptureError> {
    let items = match value {
        Value::Null => return Ok(None),
        Value::String(json) => serde_json::from_str(&json),
        Value::Array(_) => serde_json::from_value(value),
        other => {
            return Err(CaptureError::Drain(format!(
                "unexpected drain result: {other}"
            )))
        }
    };
    items
        .map(Some)
        .map_err(|err| CaptureError::Drain(format!("undecodable queue: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn injection_script_carries_guard_and_cap() {
        let script = injection_script(512, true);
        assert!(script.contains("var MAX_BODY_CHARS = 512;"));
        assert!(script.contains("var TRACK_NETWORK = true;"));
        assert!(script.contains(ALREADY_ACTIVE));
        assert!(!script.contains("__MAX_BODY_CHARS__"));
    }

    #[test]
    fn lifecycle_scripts_stay_apart_from_injection() {
        let script = injection_script(64, false);
        assert!(script.contains("reactivated"));
        assert!(script.contains("state.deactivate"));
        assert!(!RESET_SCRIPT.contains(ALREADY_ACTIVE));
        assert!(!DEACTIVATE_SCRIPT.contains(ALREADY_ACTIVE));
        assert_ne!(RESET_SCRIPT, DRAIN_SCRIPT);
    }

    #[test]
    fn drained_json_string_decodes() {
        let drained = Value::String(
            json!([
                {"type": "console-log", "source": "warn", "data": "low stock", "extra": {"level": "warn"}, "status": null, "durationMs": null, "timestamp": 1700000000000.0},
                {"type": "network-response", "source": "/api/cart", "data": "{}", "extra": {"method": "GET"}, "status": 200, "durationMs": 12.5, "timestamp": 1700000000100.0}
            ])
            .to_string(),
        );
        let items = parse_drained(drained).unwrap().unwrap();
        assert_eq!(items.len(), 2);

        let response = items[1].clone().into_capture(7).unwrap();
        assert_eq!(response.capture_type, CaptureType::NetworkResponse);
        assert_eq!(response.status, Some(200));
        assert_eq!(response.seq, 7);
        assert_eq!(response.timestamp.timestamp_millis(), 1_700_000_000_100);
    }

    #[test]
    fn missing_shim_is_not_an_error() {
        assert!(parse_drained(Value::Null).unwrap().is_none());
    }

    #[test]
    fn garbage_queue_is_a_drain_error() {
        let err = parse_drained(Value::String("not json".into())).unwrap_err();
        assert!(matches!(err, CaptureError::Drain(_)));
    }

    #[test]
    fn unknown_types_are_dropped() {
        let raw: RawCapture =
            serde_json::from_value(json!({"type": "screen-flash", "source": "x"})).unwrap();
        assert!(raw.into_capture(1).is_none());
    }

    #[test]
    fn watch_script_quotes_the_path() {
        let script = watch_script("app.state\"x");
        assert!(script.contains(r#"c.watch("app.state\"x")"#));
    }
}
