//! C8: the HTTP surface.
//!
//! Deciding *what kind* of request this is -- websocket upgrade, JSON
//! event-mode POST, form POST, full page render, or neither -- and carrying
//! out the behavior that kind implies. Building the actual router, matching
//! paths to routes, and wiring in application middleware stays the host's
//! job; this module only owns what happens once a request has already been
//! routed to one.

use crate::cookie;
use crate::event::{Event, HttpErrorEnvelope, ON_LOAD_EVENT_ID};
use crate::handler::HandlerOutcome;
use crate::render::{render_published_event, RenderContext};
use crate::route::Route;
use crate::template::RenderHelpers;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use std::collections::HashMap;

const EVENT_MODE_HEADER: &str = "x-fir-mode";
const EVENT_MODE_VALUE: &str = "event";
const EVENT_QUERY_PARAM: &str = "event";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    WebSocketUpgrade,
    /// `X-FIR-MODE: event` POST with a JSON body naming `event_id`.
    JsonEvent,
    /// `?event=<id>` form POST.
    FormEvent { event_id: String },
    FullRender,
    MethodNotAllowed,
}

/// Classifies an inbound request in precedence order: websocket upgrade
/// first, then JSON event-mode, then form event-mode, then a plain
/// GET/HEAD render, then reject anything else.
pub fn classify(method: &Method, headers: &HeaderMap, query: &str) -> RequestKind {
    if is_websocket_upgrade(headers) {
        return RequestKind::WebSocketUpgrade;
    }
    if method == Method::POST {
        if is_event_mode(headers) {
            return RequestKind::JsonEvent;
        }
        if let Some(event_id) = query_event_id(query) {
            return RequestKind::FormEvent { event_id };
        }
        return RequestKind::MethodNotAllowed;
    }
    if method == Method::GET || method == Method::HEAD {
        return RequestKind::FullRender;
    }
    RequestKind::MethodNotAllowed
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let has_upgrade_header = headers
        .get(axum::http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    let has_connection_upgrade = headers
        .get(axum::http::header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("upgrade"))
        .unwrap_or(false);
    has_upgrade_header && has_connection_upgrade
}

fn is_event_mode(headers: &HeaderMap) -> bool {
    headers
        .get(EVENT_MODE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case(EVENT_MODE_VALUE))
        .unwrap_or(false)
}

fn query_event_id(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == EVENT_QUERY_PARAM && !value.is_empty()).then(|| value.to_owned())
    })
}

/// Decodes a handler outcome's `Data`/`DataAndState` half into a JSON
/// object, or `None` for outcomes that carry no renderable data at all.
fn outcome_data(outcome: &HandlerOutcome) -> Option<serde_json::Value> {
    match outcome {
        HandlerOutcome::Data(data) | HandlerOutcome::DataAndState(data, _) => Some(serde_json::json!(data)),
        _ => None,
    }
}

async fn dispatch(
    route: &Route,
    event: &Event,
) -> Result<HandlerOutcome, Response> {
    let Some(handler) = route.handlers.get(&event.id) else {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            "unknown_event",
            format!("no handler registered for event '{}'", event.id),
        ));
    };
    handler.handle(event).await.map_err(|err| {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "handler_failed", err.to_string())
    })
}

/// Publishes `published` onto the route's channel so any connected socket
/// sessions on it observe the same outcome this request renders directly.
async fn fan_out(route: &Route, session_id: &str, published: fir_protocol::PublishedEvent) {
    let channel = route.channel_for(session_id);
    if let Err(err) = route.pubsub.publish(&channel, published).await {
        tracing::warn!(session_id = %session_id, error = %err, "failed to publish handler outcome");
    }
}

/// Handles an `X-FIR-MODE: event` POST: decode a JSON `Event`, dispatch it
/// through the route's handler map, and return the `DomEvent`s it produces
/// directly in the response body, since the caller has no open socket to
/// receive them on.
pub async fn handle_json_event(
    route: &Route,
    session_id: &str,
    url_path: &str,
    app_name: &str,
    body: &[u8],
) -> Response {
    let mut event: Event = match serde_json::from_slice(body) {
        Ok(event) => event,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, "malformed_body", err.to_string()),
    };
    if event.id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "missing_event_id", "event id must not be empty");
    }
    event.session_id = Some(session_id.to_owned());

    let outcome = match dispatch(route, &event).await {
        Ok(outcome) => outcome,
        Err(response) => return response,
    };

    match outcome {
        HandlerOutcome::Redirect(url, code) => redirect_response(&url, code),
        HandlerOutcome::Status(code, message) => status_response(code, &message),
        outcome => {
            let Some(published) = route.outcome_to_published(&event.id, Some(session_id), outcome) else {
                return Json(Vec::<fir_protocol::DomEvent>::new()).into_response();
            };
            fan_out(route, session_id, published.clone()).await;
            let ctx = RenderContext::for_route(route, session_id, url_path, app_name);
            match render_published_event(&ctx, &published).await {
                Ok(dom_events) => Json(dom_events).into_response(),
                Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "render_failed", err.to_string()),
            }
        }
    }
}

/// Decodes a `application/x-www-form-urlencoded` body into a flat string
/// map -- the shape `HandlerOutcome`-producing form handlers expect their
/// event `params` in.
fn decode_form_body(body: &[u8]) -> Result<HashMap<String, String>, Response> {
    serde_urlencoded::from_bytes(body)
        .map_err(|err| error_response(StatusCode::BAD_REQUEST, "malformed_form_body", err.to_string()))
}

/// Handles a `?event=<id>` form POST: decode the body, dispatch it, and
/// either redirect back to the page (success), re-render the page shell
/// with field errors inlined (`FieldErrors`), or honor the handler's own
/// `Redirect`/`Status` outcome.
pub async fn handle_form_event(
    route: &Route,
    session_id: &str,
    url_path: &str,
    app_name: &str,
    event_id: &str,
    form_body: &[u8],
) -> Response {
    let fields = match decode_form_body(form_body) {
        Ok(fields) => fields,
        Err(response) => return response,
    };
    let event = Event {
        id: event_id.to_owned(),
        session_id: Some(session_id.to_owned()),
        element_key: None,
        params: serde_json::json!(fields),
        is_form: true,
        timestamp: None,
    };

    let outcome = match dispatch(route, &event).await {
        Ok(outcome) => outcome,
        Err(response) => return response,
    };

    match outcome {
        HandlerOutcome::Redirect(url, code) => redirect_response(&url, code),
        HandlerOutcome::Status(code, message) => status_response(code, &message),
        HandlerOutcome::FieldErrors(errors) => {
            render_full_page_with_errors(route, session_id, url_path, app_name, errors).await
        }
        outcome => {
            if let Some(published) = route.outcome_to_published(&event.id, Some(session_id), outcome) {
                fan_out(route, session_id, published).await;
            }
            redirect_response(url_path, 302)
        }
    }
}

async fn render_full_page_with_errors(
    route: &Route,
    session_id: &str,
    url_path: &str,
    app_name: &str,
    field_errors: HashMap<String, String>,
) -> Response {
    let helpers = RenderHelpers {
        url_path: url_path.to_owned(),
        app_name: app_name.to_owned(),
        field_errors,
    };
    let executor = route.template.clone_template();
    let bytes = tokio::task::spawn_blocking(move || executor.render_page(None, &helpers))
        .await
        .expect("page render task panicked");
    match bytes {
        Ok(bytes) => {
            let signed = cookie::sign(session_id, &route.id, &route.signing_key);
            let mut response = Html(bytes).into_response();
            *response.status_mut() = StatusCode::UNPROCESSABLE_ENTITY;
            set_session_cookie(&mut response, route, &signed);
            response
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "render_failed", err.to_string()),
    }
}

/// Handles a plain GET/HEAD: mint a session cookie if the request didn't
/// already carry one, run the route's onLoad handler (if registered) to
/// seed page data, and render the full page shell.
pub async fn handle_full_render(
    route: &Route,
    existing_session_id: Option<String>,
    url_path: &str,
    app_name: &str,
) -> Response {
    let session_id = existing_session_id.unwrap_or_else(cookie::new_session_id);

    let data = if let Some(handler) = route.handlers.get(ON_LOAD_EVENT_ID) {
        let event = Event {
            id: ON_LOAD_EVENT_ID.to_owned(),
            session_id: Some(session_id.clone()),
            element_key: None,
            params: serde_json::json!({}),
            is_form: false,
            timestamp: None,
        };
        match handler.handle(&event).await {
            Ok(outcome) => outcome_data(&outcome),
            Err(err) => {
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "on_load_failed", err.to_string())
            }
        }
    } else {
        None
    };

    let helpers = RenderHelpers {
        url_path: url_path.to_owned(),
        app_name: app_name.to_owned(),
        field_errors: HashMap::new(),
    };
    let executor = route.template.clone_template();
    let bytes = tokio::task::spawn_blocking(move || executor.render_page(data.as_ref(), &helpers))
        .await
        .expect("page render task panicked");
    match bytes {
        Ok(bytes) => {
            let signed = cookie::sign(&session_id, &route.id, &route.signing_key);
            let mut response = Html(bytes).into_response();
            set_session_cookie(&mut response, route, &signed);
            response
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "render_failed", err.to_string()),
    }
}

/// The response for any request `classify` marks `MethodNotAllowed`.
pub fn method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed", "unsupported request")
}

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    let envelope = HttpErrorEnvelope {
        code: code.to_owned(),
        message: message.into(),
        details: None,
    };
    (status, Json(envelope)).into_response()
}

fn redirect_response(url: &str, code: u16) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::FOUND);
    let mut response = status.into_response();
    if let Ok(value) = HeaderValue::from_str(url) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

fn status_response(code: u16, message: &str) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_response(status, "handler_status", message.to_owned())
}

fn set_session_cookie(response: &mut Response, route: &Route, signed_value: &str) {
    let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", route.config.cookie_name, signed_value);
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
}
