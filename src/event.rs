//! Wire-level event types. Re-exported from `fir-protocol` so the engine and
//! any out-of-process tooling (browser companion script, admin dashboards)
//! agree on one definition.

pub use fir_protocol::{
    DomEvent, DomEventDetail, Event, EventState, HeartbeatAck, HttpErrorEnvelope, PublishedEvent,
    HEARTBEAT_ID,
};

/// Reserved event id a route's onLoad handler is registered under (via the
/// ordinary `RouteBuilder::handler` map), invoked once per plain GET to
/// seed the full page render with data before any real event has occurred.
pub const ON_LOAD_EVENT_ID: &str = "__fir_on_load__";

/// Composes the `(event-id, state)` lookup key used against the fragment
/// registry and the low-level compiled attribute, e.g. `"update:ok"`.
pub fn lookup_key(event_id: &str, state: EventState) -> String {
    format!("{}:{}", event_id.to_lowercase(), state)
}

/// Composes the wire-level `type` string for a `DomEvent`:
/// `fir:<id>:<state>` or `fir:<id>:<state>::<fragment>`.
pub fn event_type(event_id: &str, state: EventState, fragment: Option<&str>) -> String {
    match fragment {
        Some(frag) if frag != "-" => format!("fir:{}:{}::{}", event_id.to_lowercase(), state, frag),
        _ => format!("fir:{}:{}", event_id.to_lowercase(), state),
    }
}
