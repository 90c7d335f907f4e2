//! Network-domain events turned into capture entries.

use std::collections::HashMap;

use cdp_adapter::TransportEvent;
use serde_json::{json, Value};

use crate::shim::RawCapture;

#[derive(Debug, Clone)]
struct PendingRequest {
    url: String,
    method: String,
    /// Protocol monotonic clock, seconds.
    started: f64,
    /// Epoch milliseconds when the request was sent.
    wall_ms: Option<f64>,
}

/// Pairs requests with their responses so responses carry method and
/// duration.
#[derive(Debug)]
pub(crate) struct NetworkTracker {
    pending: HashMap<String, PendingRequest>,
    max_body_chars: usize,
}

impl NetworkTracker {
    pub(crate) fn new(max_body_chars: usize) -> Self {
        Self {
            pending: HashMap::new(),
            max_body_chars,
        }
    }

    pub(crate) fn is_network_event(event: &TransportEvent) -> bool {
        matches!(
            event.method.as_str(),
            "Network.requestWillBeSent" | "Network.responseReceived" | "Network.loadingFailed"
        )
    }

    pub(crate) fn observe(&mut self, event: &TransportEvent) -> Option<RawCapture> {
        let params = &event.params;
        let request_id = params["requestId"].as_str()?.to_string();
        match event.method.as_str() {
            "Network.requestWillBeSent" => {
                let url = params["request"]["url"].as_str().unwrap_or_default().to_string();
                let method = params["request"]["method"]
                    .as_str()
                    .unwrap_or("GET")
                    .to_string();
                let wall_ms = params["wallTime"].as_f64().map(|secs| secs * 1000.0);
                let body = params["request"]["postData"].as_str().unwrap_or_default();
                let (data, truncated_from) = clip(body, self.max_body_chars);
                let mut extra = json!({
                    "method": method,
                    "via": "network",
                    "requestId": request_id,
                    "resourceType": params["type"].clone(),
                });
                if let Some(len) = truncated_from {
                    extra["truncatedFrom"] = json!(len);
                }
                self.pending.insert(
                    request_id,
                    PendingRequest {
                        url: url.clone(),
                        method,
                        started: params["timestamp"].as_f64().unwrap_or_default(),
                        wall_ms,
                    },
                );
                Some(RawCapture {
                    kind: "network-request".into(),
                    source: url,
                    data,
                    extra,
                    status: None,
                    duration_ms: None,
                    timestamp: wall_ms,
                })
            }
            "Network.responseReceived" => {
                let response = &params["response"];
                let pending = self.pending.remove(&request_id);
                let (duration_ms, timestamp) = timing(pending.as_ref(), params);
                let url = response["url"]
                    .as_str()
                    .map(str::to_string)
                    .or_else(|| pending.as_ref().map(|p| p.url.clone()))
                    .unwrap_or_default();
                Some(RawCapture {
                    kind: "network-response".into(),
                    source: url,
                    data: String::new(),
                    extra: json!({
                        "method": pending.as_ref().map(|p| p.method.clone()),
                        "via": "network",
                        "requestId": request_id,
                        "contentType": response["mimeType"].clone(),
                    }),
                    status: response["status"].as_u64().map(|code| code as u16),
                    duration_ms,
                    timestamp,
                })
            }
            "Network.loadingFailed" => {
                // A response already arrived for this id; nothing left to report.
                let pending = self.pending.remove(&request_id)?;
                let (duration_ms, timestamp) = timing(Some(&pending), params);
                Some(RawCapture {
                    kind: "network-response".into(),
                    source: pending.url,
                    data: String::new(),
                    extra: json!({
                        "method": pending.method,
                        "via": "network",
                        "requestId": request_id,
                        "error": params["errorText"].clone(),
                        "canceled": params["canceled"].as_bool().unwrap_or(false),
                    }),
                    status: Some(0),
                    duration_ms,
                    timestamp,
                })
            }
            _ => None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.pending.clear();
    }
}

fn timing(pending: Option<&PendingRequest>, params: &Value) -> (Option<f64>, Option<f64>) {
    let Some(pending) = pending else {
        return (None, None);
    };
    let finished = params["timestamp"].as_f64().unwrap_or(pending.started);
    let duration = ((finished - pending.started) * 1000.0).max(0.0);
    (Some(duration), pending.wall_ms.map(|wall| wall + duration))
}

fn clip(body: &str, max_chars: usize) -> (String, Option<usize>) {
    let total = body.chars().count();
    if total <= max_chars {
        (body.to_string(), None)
    } else {
        (body.chars().take(max_chars).collect(), Some(total))
    }
}
