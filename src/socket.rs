//! C7: the per-connection socket session.
//!
//! One task owns a connection end to end: verify the session cookie, join
//! the route's channel, then loop reading inbound events and forwarding
//! outbound `DomEvent`s until the socket closes or a deadline lapses.
//! A single `tokio::select!` drives the read half, the subscription, and
//! the ping interval, rather than splitting reader/writer into separate
//! tasks.

use crate::cookie;
use crate::event::{DomEvent, Event, HeartbeatAck, HEARTBEAT_ID};
use crate::render::{render_published_event, RenderContext};
use crate::route::{admit_event, Route};
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Close code sent when the upgrade arrives without a valid session cookie.
/// `4000..=4999` is the reserved application range in RFC 6455.
pub const CLOSE_UNAUTHENTICATED: u16 = 4001;
/// Close code sent when an inbound event claims a session id other than
/// the one this connection authenticated as.
pub const CLOSE_SESSION_MISMATCH: u16 = 4002;

/// Verifies the cookie header against `route`, returning the session id on
/// success. The caller closes the upgrade with `CLOSE_UNAUTHENTICATED` on
/// `None` before ever subscribing the connection to a channel.
pub fn authenticate(cookie_header: Option<&str>, route: &Route) -> Option<String> {
    let raw = cookie_header?;
    let value = parse_cookie(raw, &route.config.cookie_name)?;
    cookie::verify(&value, &route.id, &route.signing_key)
}

fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_owned())
    })
}

/// Drives one connection for its whole lifetime. Assumes the caller has
/// already authenticated the upgrade and is only passing a valid
/// `session_id` through.
pub async fn handle_socket(
    mut socket: WebSocket,
    route: Arc<Route>,
    session_id: String,
    url_path: String,
    app_name: String,
) {
    let channel = route.channel_for(&session_id);
    let mut subscription = match route.pubsub.subscribe(&channel).await {
        Ok(sub) => sub,
        Err(err) => {
            warn!(session_id = %session_id, error = %err, "failed to subscribe socket to its channel");
            return;
        }
    };

    info!(session_id = %session_id, channel = %channel, "socket connected");
    log_activity(&route, format!("socket connected session={session_id}"));

    let mut ping_interval = tokio::time::interval(route.config.ping_period);
    ping_interval.tick().await;

    loop {
        tokio::select! {
            msg = tokio::time::timeout(route.config.pong_wait, socket.recv()) => {
                match msg {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        if !handle_inbound_text(&mut socket, &route, &session_id, &text).await {
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Pong(_)))) => {}
                    Ok(Some(Ok(Message::Ping(data)))) => {
                        if !send_with_deadline(&mut socket, &route, Message::Pong(data)).await {
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                        debug!(session_id = %session_id, "socket closed by client");
                        break;
                    }
                    Ok(Some(Ok(Message::Binary(_)))) => {
                        warn!(session_id = %session_id, "binary frames are not supported");
                    }
                    Ok(Some(Err(err))) => {
                        warn!(session_id = %session_id, error = %err, "socket read error");
                        break;
                    }
                    Err(_) => {
                        debug!(session_id = %session_id, "pong wait elapsed, closing idle socket");
                        break;
                    }
                }
            }
            published = subscription.recv() => {
                let Some(published) = published else { break };
                let ctx = RenderContext::for_route(&route, &session_id, &url_path, &app_name);
                match render_published_event(&ctx, &published).await {
                    Ok(dom_events) if !dom_events.is_empty() => {
                        if !send_dom_events(&mut socket, &route, &dom_events).await {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => warn!(session_id = %session_id, error = %err, "render failed"),
                }
            }
            _ = ping_interval.tick() => {
                if !send_with_deadline(&mut socket, &route, Message::Ping(Vec::new())).await {
                    break;
                }
            }
        }
    }

    subscription.close();
    route.error_cache.clear_session(&session_id);
    info!(session_id = %session_id, "socket disconnected");
    log_activity(&route, format!("socket disconnected session={session_id}"));
}

fn log_activity(route: &Route, msg: String) {
    if let Some(log) = &route.activity_log {
        log.log(msg);
    }
}

/// Sends `message`, bounded by the route's `write_deadline` -- a send that
/// hangs past the deadline is treated the same as a hard send error.
async fn send_with_deadline(socket: &mut WebSocket, route: &Route, message: Message) -> bool {
    match tokio::time::timeout(route.config.write_deadline, socket.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(_)) => false,
        Err(_) => {
            warn!("write deadline exceeded, closing socket");
            false
        }
    }
}

async fn send_dom_events(socket: &mut WebSocket, route: &Route, events: &[DomEvent]) -> bool {
    match serde_json::to_string(events) {
        Ok(json) => send_with_deadline(socket, route, Message::Text(json)).await,
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound DOM events");
            false
        }
    }
}

/// Handles one inbound text frame: heartbeat, or a real event dispatched
/// through the route's handler map. Returns `false` when the socket should
/// be closed.
async fn handle_inbound_text(socket: &mut WebSocket, route: &Route, session_id: &str, text: &str) -> bool {
    let event: Event = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            warn!(session_id = %session_id, error = %err, "dropping malformed event frame");
            return true;
        }
    };

    if event.id == HEARTBEAT_ID {
        let ack = HeartbeatAck::default();
        return match serde_json::to_string(&ack) {
            Ok(json) => send_with_deadline(socket, route, Message::Text(json)).await,
            Err(_) => true,
        };
    }

    if let Some(claimed) = &event.session_id {
        if claimed != session_id {
            warn!(session_id = %session_id, claimed = %claimed, "inbound event claimed a different session, closing");
            let frame = CloseFrame {
                code: CLOSE_SESSION_MISMATCH,
                reason: Cow::Borrowed("session mismatch"),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            return false;
        }
    }

    if !admit_event(route, &event) {
        debug!(session_id = %session_id, event_id = %event.id, "duplicate event suppressed");
        return true;
    }

    let Some(handler) = route.handlers.get(&event.id) else {
        warn!(session_id = %session_id, event_id = %event.id, "no handler registered for event");
        return true;
    };

    let outcome = match handler.handle(&event).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(session_id = %session_id, event_id = %event.id, error = %err, "handler failed");
            return true;
        }
    };

    let Some(published) = route.outcome_to_published(&event.id, Some(session_id), outcome) else {
        return true;
    };

    log_activity(route, format!("dispatch session={session_id} event={}", event.id));

    let channel = route.channel_for(session_id);
    if let Err(err) = route.pubsub.publish(&channel, published).await {
        warn!(session_id = %session_id, error = %err, "failed to publish handler outcome");
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{RouteBuilder, RouteConfig};
    use crate::template::{RenderHelpers, TemplateExecutor};

    struct NullTemplate;
    impl TemplateExecutor for NullTemplate {
        fn fragment_names(&self) -> Vec<String> {
            vec![]
        }
        fn render_fragment(
            &self,
            _fragment: &str,
            _data: Option<&serde_json::Value>,
            _helpers: &RenderHelpers,
        ) -> crate::error::FirResult<Vec<u8>> {
            Ok(Vec::new())
        }
        fn clone_template(&self) -> Box<dyn TemplateExecutor> {
            Box::new(NullTemplate)
        }
    }

    fn route() -> Route {
        RouteBuilder::new("todos", Box::new(NullTemplate))
            .signing_key(b"secret".to_vec())
            .config(RouteConfig::default())
            .build()
            .unwrap()
    }

    #[test]
    fn parse_cookie_finds_the_named_pair_among_others() {
        let header = "other=1; fir_session=abc.def; another=2";
        assert_eq!(parse_cookie(header, "fir_session").as_deref(), Some("abc.def"));
        assert_eq!(parse_cookie(header, "missing"), None);
    }

    #[test]
    fn authenticate_accepts_a_validly_signed_cookie() {
        let route = route();
        let session_id = cookie::new_session_id();
        let signed = cookie::sign(&session_id, &route.id, &route.signing_key);
        let header = format!("fir_session={signed}");
        assert_eq!(authenticate(Some(&header), &route), Some(session_id));
    }

    #[test]
    fn authenticate_rejects_a_missing_cookie_header() {
        let route = route();
        assert_eq!(authenticate(None, &route), None);
    }

    #[test]
    fn authenticate_rejects_a_cookie_signed_for_another_route() {
        let route = route();
        let session_id = cookie::new_session_id();
        let signed = cookie::sign(&session_id, "some-other-route", &route.signing_key);
        let header = format!("fir_session={signed}");
        assert_eq!(authenticate(Some(&header), &route), None);
    }
}
