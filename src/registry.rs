//! C2: the fragment registry.
//!
//! Built once at route construction from the compiler's output, it answers
//! "which fragments need re-rendering for this (event-id, state)?" and
//! "what selector addresses the element if the publisher didn't supply its
//! own target?" in O(1) during the render pipeline, without re-walking the
//! compiled template on every request.

use crate::event::{lookup_key, EventState};

/// Sentinel fragment name meaning "no HTML body" -- the directive only
/// carries a non-rendering effect (`reset`, `toggleClass`, `dispatch`, ...).
pub const NO_HTML: &str = "-";

/// A fragment name paired with the stable class token the compiler stamped
/// on its element, used as the default render target when the publisher
/// didn't supply an explicit one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentEntry {
    pub name: String,
    pub class_token: String,
}

/// `(event-id, state) -> fragment entries`, insertion-ordered and
/// deduplicated by fragment name. A `Vec` of pairs is sufficient: the
/// registry is built once from a handful of compiled attributes and looked
/// up by exact key, never iterated for pattern matching.
#[derive(Debug, Clone, Default)]
pub struct FragmentRegistry {
    entries: Vec<(String, Vec<FragmentEntry>)>,
}

impl FragmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `event_id`/`state` requires `fragment` (or the `"-"`
    /// sentinel when `fragment` is `None`) to be rendered, addressable by
    /// `class_token` when no explicit target is given.
    pub fn insert(&mut self, event_id: &str, state: EventState, fragment: Option<&str>, class_token: &str) {
        let key = lookup_key(event_id, state);
        let name = fragment.unwrap_or(NO_HTML).to_owned();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, fragments)) => {
                if !fragments.iter().any(|f| f.name == name) {
                    fragments.push(FragmentEntry {
                        name,
                        class_token: class_token.to_owned(),
                    });
                }
            }
            None => self.entries.push((
                key,
                vec![FragmentEntry {
                    name,
                    class_token: class_token.to_owned(),
                }],
            )),
        }
    }

    /// Fragment entries registered for `event_id`/`state`, in insertion
    /// order. Empty when the event/state pair has no compiled directive at
    /// all.
    pub fn fragments_for(&self, event_id: &str, state: EventState) -> &[FragmentEntry] {
        let key = lookup_key(event_id, state);
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, fragments)| fragments.as_slice())
            .unwrap_or(&[])
    }

    /// Builds a registry from every compiled attribute found across a
    /// template's elements.
    pub fn build<'a>(compiled: impl IntoIterator<Item = &'a crate::compiler::CompiledAttribute>) -> Self {
        let mut registry = Self::new();
        for attr in compiled {
            for event in &attr.events {
                registry.insert(
                    &event.event_id,
                    event.state,
                    attr.fragment.as_deref(),
                    &attr.class_token,
                );
            }
        }
        registry
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(entries: &[FragmentEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn insert_without_fragment_uses_sentinel() {
        let mut registry = FragmentRegistry::new();
        registry.insert("save", EventState::Ok, None, "fir-aaaa");
        assert_eq!(names(registry.fragments_for("save", EventState::Ok)), vec!["-"]);
    }

    #[test]
    fn insert_deduplicates_repeated_fragment_names() {
        let mut registry = FragmentRegistry::new();
        registry.insert("save", EventState::Ok, Some("item"), "fir-aaaa");
        registry.insert("save", EventState::Ok, Some("item"), "fir-aaaa");
        registry.insert("save", EventState::Ok, Some("list"), "fir-bbbb");
        assert_eq!(names(registry.fragments_for("save", EventState::Ok)), vec!["item", "list"]);
    }

    #[test]
    fn unknown_key_returns_empty_slice() {
        let registry = FragmentRegistry::new();
        assert!(registry.fragments_for("missing", EventState::Ok).is_empty());
    }

    #[test]
    fn event_id_lookup_is_case_insensitive() {
        let mut registry = FragmentRegistry::new();
        registry.insert("Save", EventState::Ok, Some("item"), "fir-aaaa");
        assert_eq!(names(registry.fragments_for("save", EventState::Ok)), vec!["item"]);
    }

    #[test]
    fn build_from_compiled_attributes_merges_every_event_clause() {
        let compiled = crate::compiler::compile_element(
            &[crate::compiler::RawAttribute {
                name: "x-fir-append:item".to_owned(),
                value: "create:ok,update:ok".to_owned(),
            }],
            &std::collections::HashMap::new(),
        )
        .unwrap();
        let registry = FragmentRegistry::build(&compiled);
        assert_eq!(names(registry.fragments_for("create", EventState::Ok)), vec!["item"]);
        assert_eq!(names(registry.fragments_for("update", EventState::Ok)), vec!["item"]);
        assert_eq!(
            registry.fragments_for("create", EventState::Ok)[0].class_token,
            registry.fragments_for("update", EventState::Ok)[0].class_token
        );
    }
}
