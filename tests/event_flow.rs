//! End-to-end coverage over a real axum server: unauthenticated upgrades are
//! rejected, an authenticated session round-trips an event into a rendered
//! DOM patch, and duplicate submissions within the suppression window only
//! run the handler once.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocketUpgrade};
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
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct ListTemplate;

impl TemplateExecutor for ListTemplate {
    fn fragment_names(&self) -> Vec<String> {
        vec!["item".to_owned()]
    }

    fn render_fragment(
        &self,
        fragment: &str,
        data: Option<&serde_json::Value>,
        _helpers: &RenderHelpers,
    ) -> FirResult<Vec<u8>> {
        let text = data.and_then(|d| d.get("text")).and_then(|v| v.as_str()).unwrap_or("");
        Ok(format!("<li data-fragment=\"{fragment}\">{text}</li>").into_bytes())
    }

    fn clone_template(&self) -> Box<dyn TemplateExecutor> {
        Box::new(ListTemplate)
    }
}

struct SaveHandler {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl EventHandler for SaveHandler {
    async fn handle(&self, event: &fir::event::Event) -> FirResult<HandlerOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut data = std::collections::HashMap::new();
        data.insert("text".to_owned(), event.params.get("text").cloned().unwrap_or_default());
        Ok(HandlerOutcome::Data(data))
    }
}

fn build_route(calls: Arc<AtomicUsize>) -> Arc<fir::Route> {
    Arc::new(
        RouteBuilder::new("todos", Box::new(ListTemplate))
            .signing_key(b"integration-test-secret".to_vec())
            .config(RouteConfig::default())
            .element(vec![fir::compiler::RawAttribute {
                name: "x-fir-append:item".to_owned(),
                value: "save:ok".to_owned(),
            }])
            .handler("save", Box::new(SaveHandler { calls }))
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
        .on_upgrade(move |mut socket| async move {
            match cookie_header
                .as_deref()
                .and_then(|h| socket::authenticate(Some(h), &route))
            {
                Some(session_id) => {
                    socket::handle_socket(socket, route, session_id, "/todos".to_owned(), "todos".to_owned())
                        .await;
                }
                None => {
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code: socket::CLOSE_UNAUTHENTICATED,
                            reason: "unauthenticated".into(),
                        })))
                        .await;
                }
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

#[tokio::test]
async fn unauthenticated_upgrade_closes_with_4001() {
    let addr = spawn_server(build_route(Arc::new(AtomicUsize::new(0)))).await;
    let mut client = MockWsClient::connect(&format!("ws://{addr}/ws")).await.unwrap();
    let reason = client.expect_close(socket::CLOSE_UNAUTHENTICATED).await.unwrap();
    assert_eq!(reason, "unauthenticated");
}

#[tokio::test]
async fn authenticated_session_round_trips_an_append_event() {
    let addr = spawn_server(build_route(Arc::new(AtomicUsize::new(0)))).await;
    let cookie = fetch_session_cookie(addr).await;
    let mut client = MockWsClient::connect_with_cookie(&format!("ws://{addr}/ws"), &cookie)
        .await
        .unwrap();

    client
        .send_event(&fir::event::Event {
            id: "save".to_owned(),
            session_id: None,
            element_key: None,
            params: serde_json::json!({"text": "milk"}),
            is_form: false,
            timestamp: None,
        })
        .await
        .unwrap();

    let dom_events = client.recv_dom_events().await.unwrap();
    assert_eq!(dom_events.len(), 1);
    assert_eq!(dom_events[0].event_type, "fir:save:ok::item");
    assert!(dom_events[0].detail.html.as_deref().unwrap().contains("milk"));
}

#[tokio::test]
async fn duplicate_submissions_within_the_window_only_invoke_the_handler_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let addr = spawn_server(build_route(calls.clone())).await;
    let cookie = fetch_session_cookie(addr).await;
    let mut client = MockWsClient::connect_with_cookie(&format!("ws://{addr}/ws"), &cookie)
        .await
        .unwrap();

    let event = fir::event::Event {
        id: "save".to_owned(),
        session_id: None,
        element_key: None,
        params: serde_json::json!({"text": "milk"}),
        is_form: false,
        timestamp: None,
    };
    client.send_event(&event).await.unwrap();
    client.send_event(&event).await.unwrap();

    let _first = client.recv_dom_events().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
