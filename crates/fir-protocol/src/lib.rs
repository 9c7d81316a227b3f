// fir-protocol: wire types shared between the fir engine and out-of-process
// tooling (browser companion scripts, admin dashboards, integration tests).
//
// These are the JSON shapes that cross a process boundary; everything else
// (the compiler's internal AST, the fragment registry) stays in the `fir`
// crate because nothing outside it needs to agree on their shape.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sub-label on an event that the server uses to route into a different
/// fragment set. Serializes to its lowercase name on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventState {
    Ok,
    Error,
    Pending,
    Done,
}

impl EventState {
    pub fn as_str(self) -> &'static str {
        match self {
            EventState::Ok => "ok",
            EventState::Error => "error",
            EventState::Pending => "pending",
            EventState::Done => "done",
        }
    }
}

impl std::fmt::Display for EventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound event, decoded from a WebSocket text frame or an
/// `X-FIR-MODE: event` POST body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_key: Option<String>,
    /// JSON object (or, when `is_form` is set, a form-encoded key/value blob
    /// carried as a JSON string) -- interpretation is left to the handler
    /// binder (see `fir::handler`).
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub is_form: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Broadcast unit published on the pub/sub bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub id: String,
    pub state: EventState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Application data (success path) or field errors (error path),
    /// depending on `state`. Rendered into the fragment template.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Session-scoped state delivered to the client as-is, never rendered
    /// into HTML -- for events with no bound template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_payload: Option<serde_json::Value>,
    #[serde(default)]
    pub field_errors: HashMap<String, String>,
}

/// Outbound DOM patch event, carried in the JSON array sent over the socket
/// or returned directly from an event-mode HTTP POST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomEvent {
    pub id: String,
    pub state: EventState,
    /// `fir:<id>:<state>[::<fragment>]` -- the browser dispatch key.
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub target: String,
    pub detail: DomEventDetail,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomEventDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

/// Inbound heartbeat frame: `{"id": "heartbeat"}`.
pub const HEARTBEAT_ID: &str = "heartbeat";
/// Outbound heartbeat reply: `{"event_id": "heartbeat_ack"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatAck {
    pub event_id: String,
}

impl Default for HeartbeatAck {
    fn default() -> Self {
        Self {
            event_id: "heartbeat_ack".to_owned(),
        }
    }
}

/// JSON error envelope returned by the HTTP surface, matching the shape the
/// host application's own REST endpoints use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
