//! C6: event handler dispatch.
//!
//! An `EventHandler` turns one inbound `Event` into a `HandlerOutcome` --
//! new data to broadcast, a state transition, field errors, a redirect, or a
//! bare status. The handler never touches the socket or the pub/sub bus
//! directly; `Route` takes the outcome from here and feeds it into the
//! render pipeline.

use crate::error::FirResult;
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default window within which two identical events from the same session
/// are treated as one: a double-submit from a slow double-click, a retried
/// websocket frame, and so on.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(250);

/// What an event handler decided to do. A tagged union because exactly one
/// of these things happens per invocation, never a combination beyond what
/// `DataAndState` names explicitly.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    /// Nothing changed; no event is broadcast.
    Nothing,
    /// New application data to render on the success path.
    Data(HashMap<String, Value>),
    /// A session-scoped state transition with no new data to render.
    State(HashMap<String, Value>),
    /// Both at once -- the common case for a mutation that also updates
    /// per-session UI state (e.g. "last saved at").
    DataAndState(HashMap<String, Value>, HashMap<String, Value>),
    /// Validation failed: field name to error message.
    FieldErrors(HashMap<String, String>),
    /// Redirect the requesting page (HTTP only; ignored over a socket).
    Redirect(String, u16),
    /// Fail the request outright with a status code and message.
    Status(u16, String),
}

/// Binds an inbound event to application logic. One implementation per
/// `event_id` registered on a `Route`.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &crate::event::Event) -> FirResult<HandlerOutcome>;
}

/// Computes the duplicate-suppression key for an inbound event: a SHA-256
/// digest of its session id, element key, and params, so two structurally
/// identical events from the same session collide regardless of arrival
/// order.
pub fn dedup_key(event: &crate::event::Event) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event.id.as_bytes());
    hasher.update(event.session_id.as_deref().unwrap_or("").as_bytes());
    hasher.update(event.element_key.as_deref().unwrap_or("").as_bytes());
    hasher.update(event.params.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Tracks recently-seen dedup keys per session and answers whether a given
/// key is a duplicate still inside the suppression window. Expired entries
/// are swept lazily on `is_duplicate` rather than on a background timer --
/// the table only ever holds as many entries as there are in-flight
/// sockets, so an eager sweep would be wasted work.
#[derive(Default)]
pub struct DuplicateSuppressor {
    window: Duration,
    seen: std::sync::Mutex<HashMap<String, Instant>>,
}

impl DuplicateSuppressor {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` and records the key if this is the first time it's
    /// been seen within the window; returns `false` (suppressed) if it's a
    /// repeat.
    pub fn admit(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().expect("dedup table poisoned");
        seen.retain(|_, at| now.duration_since(*at) <= self.window);
        if seen.contains_key(key) {
            false
        } else {
            seen.insert(key.to_owned(), now);
            true
        }
    }
}
