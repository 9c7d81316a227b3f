//! The template executor is an external collaborator: the engine only
//! needs to (a) render a named fragment against a data value into bytes and
//! (b) enumerate the fragment names a compiled template contains. Both are
//! captured here as a trait; the concrete template language and its
//! compiler live outside this crate.

use crate::error::{FirError, FirResult};
use std::collections::HashMap;

/// Per-request helpers injected at render time: the executor must support cloning itself with a fresh
/// function map so the same compiled template serves concurrent requests
/// without the helpers from one request leaking into another.
#[derive(Clone, Default)]
pub struct RenderHelpers {
    pub url_path: String,
    pub app_name: String,
    /// Populated only when rendering an `error`-state event: field name to
    /// message, looked up by the template via an injected helper function.
    pub field_errors: HashMap<String, String>,
}

/// A compiled template that can render named fragments.
pub trait TemplateExecutor: Send + Sync {
    /// Names of every fragment this template defines, in source order. The
    /// sentinel `"-"` is never a real fragment name.
    fn fragment_names(&self) -> Vec<String>;

    /// Render `fragment` against `data` with `helpers` injected, returning
    /// the raw (unminified, uncompiled) bytes. `data` is `None` exactly when
    /// rendering an error-state event: the field-error map
    /// carried in `helpers` is the data source instead.
    fn render_fragment(
        &self,
        fragment: &str,
        data: Option<&serde_json::Value>,
        helpers: &RenderHelpers,
    ) -> FirResult<Vec<u8>>;

    /// Clone this template with a fresh, empty helper map -- the executor
    /// itself is immutable and shared; only the helpers are request-scoped.
    fn clone_template(&self) -> Box<dyn TemplateExecutor>;

    /// Renders the full page shell for a plain GET, seeded with `data` (the
    /// outcome of the route's onLoad handler, if one is registered).
    /// Fragment-only template executors don't need a page shell at all, so
    /// this defaults to an error rather than forcing every implementor to
    /// provide one.
    fn render_page(&self, _data: Option<&serde_json::Value>, _helpers: &RenderHelpers) -> FirResult<Vec<u8>> {
        Err(FirError::Render(
            "this template executor does not implement full-page rendering".to_owned(),
        ))
    }
}
