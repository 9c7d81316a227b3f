//! C5: the render pipeline.
//!
//! Turns one `PublishedEvent` into the `DomEvent`s a socket session actually
//! sends to the browser: look up which fragments the event touches, render
//! each one, recompile any directives the template embeds in its own
//! fragment markup, resolve where it lands in the DOM, and reconcile against
//! the error-state cache so a later success clears an earlier error without
//! the application having to track that itself.

use crate::compiler::recompile_rendered_html;
use crate::error::FirResult;
use crate::error_cache::ErrorStateCache;
use crate::event::{event_type, DomEvent, DomEventDetail, EventState, PublishedEvent};
use crate::registry::{FragmentRegistry, NO_HTML};
use crate::route::Route;
use crate::template::{RenderHelpers, TemplateExecutor};
use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};

pub struct RenderContext<'a> {
    pub session_id: &'a str,
    pub registry: &'a FragmentRegistry,
    pub template: &'a dyn TemplateExecutor,
    pub error_cache: &'a ErrorStateCache,
    pub url_path: &'a str,
    pub app_name: &'a str,
    /// The `runjs` action map fragments are recompiled against, so an
    /// `x-fir-*` directive embedded in a fragment's own markup gets the same
    /// treatment as one compiled from the page shell at route construction.
    pub action_map: &'a HashMap<String, String>,
}

impl<'a> RenderContext<'a> {
    /// Builds the render context a given route uses for one session's
    /// requests, whether driven from the socket loop or an HTTP handler.
    pub fn for_route(
        route: &'a Route,
        session_id: &'a str,
        url_path: &'a str,
        app_name: &'a str,
    ) -> Self {
        Self {
            session_id,
            registry: &route.registry,
            template: route.template.as_ref(),
            error_cache: &route.error_cache,
            url_path,
            app_name,
            action_map: &route.action_map,
        }
    }
}

/// Renders one published event into zero or more outbound `DomEvent`s.
pub async fn render_published_event(
    ctx: &RenderContext<'_>,
    event: &PublishedEvent,
) -> FirResult<Vec<DomEvent>> {
    let fragments = ctx.registry.fragments_for(&event.id, event.state);

    let mut out = if fragments.is_empty() {
        if event.state == EventState::Ok {
            vec![empty_dom_event(event)]
        } else {
            Vec::new()
        }
    } else {
        render_fragments(ctx, event, &fragments).await?
    };

    if event.state != EventState::Error {
        out.extend(clear_events(ctx, event));
    }

    Ok(out)
}

async fn render_fragments(
    ctx: &RenderContext<'_>,
    event: &PublishedEvent,
    fragments: &[crate::registry::FragmentEntry],
) -> FirResult<Vec<DomEvent>> {
    let rendered = join_all(fragments.iter().map(|fragment| {
        let executor = ctx.template.clone_template();
        let fragment_name = fragment.name.clone();
        let class_token = fragment.class_token.clone();
        let helpers = RenderHelpers {
            url_path: ctx.url_path.to_owned(),
            app_name: ctx.app_name.to_owned(),
            field_errors: event.field_errors.clone(),
        };
        let data = (event.state != EventState::Error).then(|| event.data.clone());
        async move {
            if fragment_name == NO_HTML {
                return Ok((fragment_name, class_token, None));
            }
            let bytes = tokio::task::spawn_blocking(move || {
                executor.render_fragment(&fragment_name, data.as_ref(), &helpers)
                    .map(|bytes| (fragment_name, bytes))
            })
            .await
            .expect("render task panicked");
            let (fragment_name, bytes) = bytes?;
            let html = String::from_utf8_lossy(&bytes).into_owned();
            Ok((fragment_name, class_token, Some(html)))
        }
    }))
    .await
    .into_iter()
    .collect::<FirResult<Vec<_>>>()?;

    let mut out = Vec::new();
    for (fragment_name, class_token, html) in rendered {
        if event.state == EventState::Error && html.as_deref() == Some("") {
            continue;
        }
        let html = match html {
            Some(raw) => Some(recompile_rendered_html(&minify(&raw), ctx.action_map)?),
            None => None,
        };
        let target = event
            .target
            .clone()
            .unwrap_or_else(|| format!(".{class_token}"));
        let event_type_str = event_type(&event.id, event.state, Some(fragment_name.as_str()));
        let data = if event.state == EventState::Error {
            (!event.field_errors.is_empty()).then(|| serde_json::json!(event.field_errors))
        } else {
            Some(event.data.clone())
        };
        let detail = DomEventDetail {
            state: event.state_payload.clone(),
            data,
            html,
        };
        if is_vacuous(&detail) {
            continue;
        }
        if event.state == EventState::Error && detail.html.is_some() {
            ctx.error_cache.record(ctx.session_id, &event_type_str, &target);
        }
        out.push(DomEvent {
            id: event.id.clone(),
            state: event.state,
            event_type: event_type_str,
            key: event.element_key.clone(),
            target,
            detail,
        });
    }
    Ok(out)
}

/// Collapses runs of whitespace (including newlines) between tags down to a
/// single space, and trims the ends. Not markup-aware -- it never looks
/// inside tags or attribute values, it only tracks whether it is currently
/// inside one so it never mangles a quoted attribute.
fn minify(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut pending_space = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                pending_space = false;
                out.push(ch);
            }
            '>' => {
                in_tag = false;
                out.push(ch);
            }
            c if c.is_whitespace() && !in_tag => {
                pending_space = true;
            }
            c => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
            }
        }
    }
    out.trim().to_owned()
}

fn is_vacuous(detail: &DomEventDetail) -> bool {
    detail.html.is_none() && detail.data.is_none() && detail.state.is_none()
}

fn empty_dom_event(event: &PublishedEvent) -> DomEvent {
    DomEvent {
        id: event.id.clone(),
        state: event.state,
        event_type: event_type(&event.id, event.state, None),
        key: event.element_key.clone(),
        target: event.target.clone().unwrap_or_default(),
        detail: DomEventDetail {
            state: event.state_payload.clone(),
            data: Some(event.data.clone()),
            html: None,
        },
    }
}

/// Emits a synthetic `ok`-state clear `DomEvent` for every distinct target
/// that previously had an active error recorded for this event id, now that
/// it has published in a non-error state. Deduplicated by target: two
/// error fragments that happened to share a target only clear once.
fn clear_events(ctx: &RenderContext<'_>, event: &PublishedEvent) -> Vec<DomEvent> {
    let error_fragments = ctx.registry.fragments_for(&event.id, EventState::Error);
    let mut seen = HashSet::new();
    let mut clears = Vec::new();
    for fragment in error_fragments {
        let error_type = event_type(&event.id, EventState::Error, Some(fragment.name.as_str()));
        if let Some(target) = ctx.error_cache.take(ctx.session_id, &error_type) {
            if seen.insert(target.clone()) {
                clears.push(DomEvent {
                    id: event.id.clone(),
                    state: EventState::Ok,
                    event_type: event_type(&event.id, EventState::Ok, None),
                    key: event.element_key.clone(),
                    target,
                    detail: DomEventDetail {
                        state: Some(serde_json::json!("clear")),
                        data: None,
                        html: None,
                    },
                });
            }
        }
    }
    clears
}
