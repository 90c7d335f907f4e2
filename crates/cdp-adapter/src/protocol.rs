//! Wire shapes for the remote debugging protocol.
//!
//! Outbound: `{id, method, params, sessionId?}`. Inbound messages are told
//! apart by the presence of `id`: responses carry it, events never do.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AdapterError, AdapterErrorKind};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest<'a> {
    pub id: u64,
    pub method: &'a str,
    pub params: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RemoteError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Unsolicited message pushed by the browser.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

impl TransportEvent {
    /// Domain part of the method, e.g. `Network` for `Network.responseReceived`.
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Response {
        id: u64,
        outcome: Result<Value, RemoteError>,
    },
    Event(TransportEvent),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInbound {
    id: Option<u64>,
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    result: Option<Value>,
    error: Option<RemoteError>,
    session_id: Option<String>,
}

pub fn parse_inbound(text: &str) -> Result<Inbound, AdapterError> {
    let raw: RawInbound = serde_json::from_str(text).map_err(|err| {
        AdapterError::new(AdapterErrorKind::Protocol).with_hint(format!("undecodable message: {err}"))
    })?;

    if let Some(id) = raw.id {
        let outcome = match (raw.error, raw.result) {
            (Some(error), _) => Err(error),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(Value::Object(Default::default())),
        };
        return Ok(Inbound::Response { id, outcome });
    }

    match raw.method {
        Some(method) => Ok(Inbound::Event(TransportEvent {
            method,
            params: raw.params.unwrap_or(Value::Null),
            session_id: raw.session_id,
        })),
        None => Err(AdapterError::new(AdapterErrorKind::Protocol)
            .with_hint("message has neither id nor method")),
    }
}

/// Entry of `GET /json/list`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetListEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    pub web_socket_debugger_url: Option<String>,
}

/// Body of `GET /json/version`.
#[derive(Clone, Debug, Deserialize)]
pub struct BrowserVersion {
    #[serde(rename = "Browser", default)]
    pub browser: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: Option<String>,
}

/// Entry of `Target.getTargets`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub target_id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub attached: bool,
}
