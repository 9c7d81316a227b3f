//! C3: the render-attribute compiler.
//!
//! Authoring-time `x-fir-<action>[:<param>]="<event-expression>"` directives
//! are rewritten, once at route construction, into the low-level
//! `@fir:<event-id>:<state>[::<fragment>]` attributes the browser script
//! actually reads. Markup parsing is out of scope -- `html`
//! provides only the narrow attribute scanner this needs, not a DOM.

mod actions;
mod html;
mod tokenizer;

pub use actions::DirectiveAction;
pub use html::{is_directive_attribute, RawAttribute, RawDirective};
pub use tokenizer::EventClause;

use crate::error::{FirError, FirResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// One compiled attribute ready to splice into the element's opening tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledAttribute {
    pub attr_name: String,
    pub attr_value: String,
    /// Stable class token stamped onto the element alongside the attribute,
    /// used by the browser script to address the element without relying on
    /// authoring-supplied `id`/`class` values.
    pub class_token: String,
    pub events: Vec<EventClause>,
    pub is_mutating: bool,
    pub fragment: Option<String>,
}

/// Compiles every `x-fir-*` directive found on one element's attribute list
/// into the attributes that replace them, after checking for conflicts.
/// Returns an error -- failing route construction, never a request -- when
/// two directives would attach incompatible effects to the same element.
pub fn compile_element(
    attrs: &[RawAttribute],
    action_map: &HashMap<String, String>,
) -> FirResult<Vec<CompiledAttribute>> {
    let directives = html::parse_directives(attrs);
    let mut compiled = Vec::with_capacity(directives.len());
    for directive in &directives {
        let action = actions::parse_action(&directive.action_name, directive.param.as_deref(), action_map)?;
        let groups = tokenizer::parse_event_expression(&directive.expr)?;
        for events in groups {
            compiled.push(compile_group(&action, events));
        }
    }
    detect_conflicts(&compiled)?;
    Ok(compiled)
}

fn compile_group(action: &DirectiveAction, events: Vec<EventClause>) -> CompiledAttribute {
    let key_part = if events.len() == 1 {
        format!("{}:{}", events[0].event_id, events[0].state)
    } else {
        format!(
            "[{}]",
            events
                .iter()
                .map(|e| format!("{}:{}", e.event_id, e.state))
                .collect::<Vec<_>>()
                .join(",")
        )
    };
    let fragment_suffix = action
        .fragment()
        .map(|f| format!("::{f}"))
        .unwrap_or_default();
    let nohtml_suffix = if action.is_nohtml() { ".nohtml" } else { "" };
    let attr_name = format!("@fir:{key_part}{fragment_suffix}{nohtml_suffix}");
    let class_token = class_token(&attr_name);
    CompiledAttribute {
        attr_value: action.js_call(),
        class_token,
        is_mutating: action.is_mutating(),
        fragment: action.fragment().map(str::to_owned),
        events,
        attr_name,
    }
}

/// Recompiles `x-fir-*` directives found in HTML a fragment rendered at
/// request time -- the same transform `compile_element` applies to the page
/// shell at route construction, run again over markup the template only
/// produces once it has real data to render. Tags that carry no directive
/// attribute pass through byte-for-byte.
pub fn recompile_rendered_html(html: &str, action_map: &HashMap<String, String>) -> FirResult<String> {
    let tags = html::scan_opening_tags(html);
    if tags.is_empty() {
        return Ok(html.to_owned());
    }

    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    for tag in &tags {
        let directive_attrs: Vec<RawAttribute> = tag
            .attrs
            .iter()
            .filter(|a| is_directive_attribute(&a.name))
            .map(|a| RawAttribute { name: a.name.clone(), value: a.value.clone() })
            .collect();
        if directive_attrs.is_empty() {
            continue;
        }
        let compiled = compile_element(&directive_attrs, action_map)?;
        out.push_str(&html[cursor..tag.start]);
        out.push_str(&rebuild_tag(html, tag, &compiled));
        cursor = tag.end;
    }
    out.push_str(&html[cursor..]);
    Ok(out)
}

/// Reconstructs one opening tag's source text, dropping its `x-fir-*`
/// attributes, merging compiled class tokens into any existing `class`
/// attribute, and appending the compiled `@fir:...` attributes.
fn rebuild_tag(html: &str, tag: &html::ScannedTag, compiled: &[CompiledAttribute]) -> String {
    let tag_name = &html[tag.start + 1..tag.tag_name_end];
    let mut out = format!("<{tag_name}");

    let extra_class = compiled
        .iter()
        .map(|c| c.class_token.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let mut wrote_class = false;
    for attr in &tag.attrs {
        if is_directive_attribute(&attr.name) {
            continue;
        }
        if attr.name.eq_ignore_ascii_case("class") {
            wrote_class = true;
            let merged = if attr.value.is_empty() {
                extra_class.clone()
            } else {
                format!("{} {extra_class}", attr.value)
            };
            out.push_str(&format!(" class=\"{merged}\""));
            continue;
        }
        out.push(' ');
        out.push_str(&attr.name);
        match attr.quote {
            '\0' if attr.value.is_empty() => {}
            '\0' => {
                out.push('=');
                out.push_str(&attr.value);
            }
            quote => {
                out.push('=');
                out.push(quote);
                out.push_str(&attr.value);
                out.push(quote);
            }
        }
    }
    if !wrote_class && !extra_class.is_empty() {
        out.push_str(&format!(" class=\"{extra_class}\""));
    }
    for c in compiled {
        out.push_str(&format!(" {}=\"{}\"", c.attr_name, c.attr_value));
    }
    if tag.self_closing {
        out.push_str(" />");
    } else {
        out.push('>');
    }
    out
}

fn class_token(attr_name: &str) -> String {
    let digest = Sha256::digest(attr_name.as_bytes());
    format!("fir-{}", hex::encode(&digest[..4]))
}

fn event_keys(attr: &CompiledAttribute) -> Vec<(String, String)> {
    attr.events
        .iter()
        .map(|e| (e.event_id.clone(), e.state.to_string()))
        .collect()
}

fn event_sets_overlap(a: &CompiledAttribute, b: &CompiledAttribute) -> bool {
    let a_keys = event_keys(a);
    b_overlaps(&a_keys, &event_keys(b))
}

fn b_overlaps(a_keys: &[(String, String)], b_keys: &[(String, String)]) -> bool {
    a_keys.iter().any(|k| b_keys.contains(k))
}

/// DOM-mutating directives on one element conflict with each other
/// unconditionally -- an element can have at most one mutating effect
/// attached regardless of which events trigger it, since only one can ever
/// run. Non-mutating directives only conflict when their event sets
/// overlap, since distinct non-mutating effects on disjoint events are
/// unambiguous.
fn detect_conflicts(attrs: &[CompiledAttribute]) -> FirResult<()> {
    for i in 0..attrs.len() {
        for j in (i + 1)..attrs.len() {
            let a = &attrs[i];
            let b = &attrs[j];
            let conflict = match (a.is_mutating, b.is_mutating) {
                (true, true) => true,
                (false, false) => event_sets_overlap(a, b),
                _ => false,
            };
            if conflict {
                return Err(FirError::Authoring(format!(
                    "conflicting directives on one element: '{}' and '{}'",
                    a.attr_name, b.attr_name
                )));
            }
        }
    }
    Ok(())
}
