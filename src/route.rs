//! A `Route` binds everything a URL needs to serve the reactive-HTML
//! protocol: a compiled template, its fragment registry, the event handlers
//! that react to inbound events, the pub/sub channel this route's sessions
//! subscribe to, and the per-session error-state cache. It is built once at
//! startup and shared (via `Arc`) across every request.

use crate::compiler::{self, CompiledAttribute, RawAttribute};
use crate::error::{FirError, FirResult};
use crate::error_cache::{ErrorStateCache, DEFAULT_TTL as DEFAULT_ERROR_CACHE_TTL};
use crate::handler::{dedup_key, DuplicateSuppressor, EventHandler, HandlerOutcome, DEFAULT_DEDUP_WINDOW};
use crate::pubsub::{InMemoryPubSub, PubSub};
use crate::registry::FragmentRegistry;
use crate::template::TemplateExecutor;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Tunables with the defaults this crate ships. Every
/// field can be overridden per route; nothing here depends on a config file
/// format, which stays the host application's concern.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub cookie_name: String,
    pub dedup_window: Duration,
    pub error_cache_ttl: Duration,
    pub outbound_capacity: usize,
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub write_deadline: Duration,
    pub max_message_size: usize,
}

impl Default for RouteConfig {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(55);
        Self {
            cookie_name: "fir_session".to_owned(),
            dedup_window: DEFAULT_DEDUP_WINDOW,
            error_cache_ttl: DEFAULT_ERROR_CACHE_TTL,
            outbound_capacity: 256,
            ping_period: (pong_wait * 9) / 10,
            pong_wait,
            write_deadline: Duration::from_secs(20),
            max_message_size: 1024,
        }
    }
}

pub struct Route {
    pub id: String,
    pub config: RouteConfig,
    pub signing_key: Vec<u8>,
    pub template: Box<dyn TemplateExecutor>,
    pub registry: FragmentRegistry,
    pub handlers: HashMap<String, Box<dyn EventHandler>>,
    pub pubsub: Arc<dyn PubSub>,
    pub error_cache: ErrorStateCache,
    pub dedup: DuplicateSuppressor,
    /// The `runjs` action map compiled elements were built against, kept
    /// around so the render pipeline can recompile directives embedded in
    /// HTML a fragment renders at request time, not just in the page shell.
    pub action_map: HashMap<String, String>,
    /// Optional mirror of connect/disconnect/dispatch activity into the
    /// host application's own admin feed.
    pub activity_log: Option<fir_log::ActivityLog<String>>,
    channel_key_fn: Arc<dyn Fn(&str) -> String + Send + Sync>,
}

impl Route {
    /// The pub/sub channel a session with `session_id` subscribes to on
    /// this route. Defaults to `<route-id>:<session-id>`; overridden via
    /// `RouteBuilder::channel_key` for routes that fan events out to a
    /// shared channel (e.g. all viewers of one document).
    pub fn channel_for(&self, session_id: &str) -> String {
        (self.channel_key_fn)(session_id)
    }

    /// Applies a handler outcome to produce the `PublishedEvent` the render
    /// pipeline should turn into `DomEvent`s, or `None` when nothing should
    /// be broadcast.
    pub fn outcome_to_published(
        &self,
        event_id: &str,
        session_id: Option<&str>,
        outcome: HandlerOutcome,
    ) -> Option<fir_protocol::PublishedEvent> {
        use fir_protocol::{EventState, PublishedEvent};
        let base = |state, data, state_payload, field_errors| PublishedEvent {
            id: event_id.to_owned(),
            state,
            session_id: session_id.map(str::to_owned),
            element_key: None,
            target: None,
            data,
            state_payload,
            field_errors,
        };
        match outcome {
            HandlerOutcome::Nothing => None,
            HandlerOutcome::Data(data) => {
                Some(base(EventState::Ok, serde_json::json!(data), None, HashMap::new()))
            }
            HandlerOutcome::State(state) => Some(base(
                EventState::Ok,
                serde_json::json!({}),
                Some(serde_json::json!(state)),
                HashMap::new(),
            )),
            HandlerOutcome::DataAndState(data, state) => Some(base(
                EventState::Ok,
                serde_json::json!(data),
                Some(serde_json::json!(state)),
                HashMap::new(),
            )),
            HandlerOutcome::FieldErrors(errors) => {
                Some(base(EventState::Error, serde_json::json!({}), None, errors))
            }
            // Only a non-socket transport can act on these; the socket loop
            // never calls `outcome_to_published` for them (see `ingress`).
            HandlerOutcome::Redirect(..) | HandlerOutcome::Status(..) => None,
        }
    }
}

pub struct RouteBuilder {
    id: String,
    config: RouteConfig,
    signing_key: Vec<u8>,
    template: Box<dyn TemplateExecutor>,
    elements: Vec<Vec<RawAttribute>>,
    handlers: HashMap<String, Box<dyn EventHandler>>,
    pubsub: Option<Arc<dyn PubSub>>,
    action_map: HashMap<String, String>,
    activity_log: Option<fir_log::ActivityLog<String>>,
    channel_key_fn: Option<Arc<dyn Fn(&str) -> String + Send + Sync>>,
}

impl RouteBuilder {
    pub fn new(id: impl Into<String>, template: Box<dyn TemplateExecutor>) -> Self {
        Self {
            id: id.into(),
            config: RouteConfig::default(),
            signing_key: Vec::new(),
            template,
            elements: Vec::new(),
            handlers: HashMap::new(),
            pubsub: None,
            action_map: HashMap::new(),
            activity_log: None,
            channel_key_fn: None,
        }
    }

    /// Registers the authoring attribute list of one element the compiler
    /// should process. The host application scans its own template's
    /// markup; this crate only compiles the directives it finds, it never
    /// parses HTML itself.
    pub fn element(mut self, attrs: Vec<RawAttribute>) -> Self {
        self.elements.push(attrs);
        self
    }

    pub fn runjs_action(mut self, name: impl Into<String>, js: impl Into<String>) -> Self {
        self.action_map.insert(name.into(), js.into());
        self
    }

    pub fn handler(mut self, event_id: impl Into<String>, handler: Box<dyn EventHandler>) -> Self {
        self.handlers.insert(event_id.into(), handler);
        self
    }

    pub fn pubsub(mut self, pubsub: Arc<dyn PubSub>) -> Self {
        self.pubsub = Some(pubsub);
        self
    }

    pub fn channel_key(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.channel_key_fn = Some(Arc::new(f));
        self
    }

    pub fn signing_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.signing_key = key.into();
        self
    }

    pub fn config(mut self, config: RouteConfig) -> Self {
        self.config = config;
        self
    }

    /// Mirrors connect/disconnect/dispatch activity into a host-owned
    /// `fir-log` broadcaster, e.g. to feed an admin SSE dashboard.
    pub fn activity_log(mut self, log: fir_log::ActivityLog<String>) -> Self {
        self.activity_log = Some(log);
        self
    }

    /// Compiles every registered element's directives, checks for
    /// conflicts, and assembles the fragment registry. Fails route
    /// construction -- not a request -- on any authoring error.
    pub fn build(self) -> FirResult<Route> {
        if self.signing_key.is_empty() {
            return Err(FirError::Authoring(
                "route requires a non-empty cookie signing key".to_owned(),
            ));
        }
        let mut all_compiled: Vec<CompiledAttribute> = Vec::new();
        for attrs in &self.elements {
            let compiled = compiler::compile_element(attrs, &self.action_map)?;
            all_compiled.extend(compiled);
        }
        let registry = FragmentRegistry::build(&all_compiled);
        let route_id = self.id.clone();
        Ok(Route {
            id: self.id,
            error_cache: ErrorStateCache::new(self.config.error_cache_ttl),
            dedup: DuplicateSuppressor::new(self.config.dedup_window),
            config: self.config,
            signing_key: self.signing_key,
            template: self.template,
            registry,
            handlers: self.handlers,
            pubsub: self.pubsub.unwrap_or_else(|| Arc::new(InMemoryPubSub::new())),
            action_map: self.action_map,
            activity_log: self.activity_log,
            channel_key_fn: self
                .channel_key_fn
                .unwrap_or_else(|| Arc::new(move |session_id| format!("{route_id}:{session_id}"))),
        })
    }
}

/// Computes the duplicate-suppression decision for an inbound event against
/// this route's suppressor, independent of rendering -- kept free-standing
/// so `ingress`/`socket` can call it without borrowing the whole `Route`
/// mutably.
pub fn admit_event(route: &Route, event: &fir_protocol::Event) -> bool {
    route.dedup.admit(&dedup_key(event))
}
