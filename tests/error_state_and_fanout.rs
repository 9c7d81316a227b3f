//! Covers the two end-to-end behaviors `render.rs`'s unit tests only exercise
//! in isolation: a field error recorded against one session clears itself
//! the moment that session's next submission succeeds, and two sockets
//! sharing a channel both see a published event (pub/sub fan-out, not just
//! the rendering that follows it).

use async_trait::async_trait;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use fir::error::FirResult;
use fir::handler::HandlerOutcome;
use fir::route::{RouteBuilder, RouteConfig};
use fir::template::{RenderHelpers, TemplateExecutor};
use fir::{cookie, socket, EventHandler};
use fir_test_support::MockWsClient;
use std::sync::Arc;

struct FormTemplate;

impl TemplateExecutor for FormTemplate {
    fn fragment_names(&self) -> Vec<String> {
        vec!["item".to_owned(), "errors".to_owned()]
    }

    fn render_fragment(
        &self,
        fragment: &str,
        data: Option<&serde_json::Value>,
        helpers: &RenderHelpers,
    ) -> FirResult<Vec<u8>> {
        match fragment {
            "errors" => {
                if helpers.field_errors.is_empty() {
                    Ok(Vec::new())
                } else {
                    Ok(format!("<span>{}</span>", helpers.field_errors.len()).into_bytes())
                }
            }
            "item" => {
                let text = data.and_then(|d| d.get("text")).and_then(|v| v.as_str()).unwrap_or("");
                Ok(format!("<li>{text}</li>").into_bytes())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn clone_template(&self) -> Box<dyn TemplateExecutor> {
        Box::new(FormTemplate)
    }
}

struct ValidatingHandler;

#[async_trait]
impl EventHandler for ValidatingHandler {
    async fn handle(&self, event: &fir::event::Event) -> FirResult<HandlerOutcome> {
        let text = event.params.get("text").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() {
            let mut errors = std::collections::HashMap::new();
            errors.insert("text".to_owned(), "required".to_owned());
            Ok(HandlerOutcome::FieldErrors(errors))
        } else {
            let mut data = std::collections::HashMap::new();
            data.insert("text".to_owned(), serde_json::json!(text));
            Ok(HandlerOutcome::Data(data))
        }
    }
}

fn build_form_route() -> Arc<fir::Route> {
    Arc::new(
        RouteBuilder::new("todos", Box::new(FormTemplate))
            .signing_key(b"integration-test-secret".to_vec())
            .config(RouteConfig::default())
            .element(vec![fir::compiler::RawAttribute {
                name: "x-fir-append:item".to_owned(),
                value: "save:ok".to_owned(),
            }])
            .element(vec![fir::compiler::RawAttribute {
                name: "x-fir-refresh:errors".to_owned(),
                value: "save:error".to_owned(),
            }])
            .handler("save", Box::new(ValidatingHandler))
            .build()
            .unwrap(),
    )
}

fn build_shared_channel_route() -> Arc<fir::Route> {
    Arc::new(
        RouteBuilder::new("board", Box::new(FormTemplate))
            .signing_key(b"integration-test-secret".to_vec())
            .config(RouteConfig::default())
            .channel_key(|_session_id| "board:shared".to_owned())
            .element(vec![fir::compiler::RawAttribute {
                name: "x-fir-append:item".to_owned(),
                value: "save:ok".to_owned(),
            }])
            .handler("save", Box::new(ValidatingHandler))
            .build()
            .unwrap(),
    )
}

async fn login_handler(State(route): State<Arc<fir::Route>>) -> impl IntoResponse {
    let session_id = cookie::new_session_id();
    let signed = cookie::sign(&session_id, &route.id, &route.signing_key);
    (
        [(
            axum::http::header::SET_COOKIE,
            format!("{}={}; Path=/", route.config.cookie_name, signed),
        )],
        "ok",
    )
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(route): State<Arc<fir::Route>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let cookie_header = headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    ws.max_message_size(route.config.max_message_size)
        .on_upgrade(move |socket| async move {
            if let Some(session_id) = cookie_header.as_deref().and_then(|h| socket::authenticate(Some(h), &route)) {
                socket::handle_socket(socket, route, session_id, "/todos".to_owned(), "todos".to_owned()).await;
            }
        })
}

async fn spawn_server(route: Arc<fir::Route>) -> std::net::SocketAddr {
    let app = Router::new()
        .route("/login", get(login_handler))
        .route("/ws", get(ws_handler))
        .with_state(route);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn fetch_session_cookie(addr: std::net::SocketAddr) -> String {
    let response = reqwest::get(format!("http://{addr}/login")).await.unwrap();
    response
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_owned()
}

fn event(text: &str) -> fir::event::Event {
    fir::event::Event {
        id: "save".to_owned(),
        session_id: None,
        element_key: None,
        params: serde_json::json!({"text": text}),
        is_form: false,
        timestamp: None,
    }
}

#[tokio::test]
async fn a_field_error_clears_once_the_same_session_later_succeeds() {
    let addr = spawn_server(build_form_route()).await;
    let cookie = fetch_session_cookie(addr).await;
    let mut client = MockWsClient::connect_with_cookie(&format!("ws://{addr}/ws"), &cookie)
        .await
        .unwrap();

    client.send_event(&event("")).await.unwrap();
    let error_dom = client.recv_dom_events().await.unwrap();
    assert_eq!(error_dom.len(), 1);
    assert_eq!(error_dom[0].event_type, "fir:save:error::errors");
    let error_target = error_dom[0].target.clone();

    client.send_event(&event("milk")).await.unwrap();
    let ok_dom = client.recv_dom_events().await.unwrap();

    let append = ok_dom
        .iter()
        .find(|e| e.event_type == "fir:save:ok::item")
        .expect("expected the append event");
    assert!(append.detail.html.as_deref().unwrap().contains("milk"));

    let clear = ok_dom
        .iter()
        .find(|e| e.detail.state == Some(serde_json::json!("clear")))
        .expect("expected a synthetic clear event for the earlier error target");
    assert_eq!(clear.target, error_target);
}

#[tokio::test]
async fn two_sessions_on_a_shared_channel_both_receive_a_published_event() {
    let addr = spawn_server(build_shared_channel_route()).await;

    let cookie_a = fetch_session_cookie(addr).await;
    let cookie_b = fetch_session_cookie(addr).await;
    let mut client_a = MockWsClient::connect_with_cookie(&format!("ws://{addr}/ws"), &cookie_a)
        .await
        .unwrap();
    let mut client_b = MockWsClient::connect_with_cookie(&format!("ws://{addr}/ws"), &cookie_b)
        .await
        .unwrap();

    client_a.send_event(&event("shared note")).await.unwrap();

    let dom_a = client_a.recv_dom_events().await.unwrap();
    let dom_b = client_b.recv_dom_events().await.unwrap();

    assert_eq!(dom_a[0].event_type, "fir:save:ok::item");
    assert_eq!(dom_b[0].event_type, "fir:save:ok::item");
    assert!(dom_a[0].detail.html.as_deref().unwrap().contains("shared note"));
    assert!(dom_b[0].detail.html.as_deref().unwrap().contains("shared note"));
}
