//! Template bodies referenced by location.

use serde_yaml::{Mapping, Value};
use tracing::debug;

use cumulus_templates::TemplateEngine;

use crate::error::StackResult;
use crate::session::Session;

/// A template fetched and rendered for a stack.
pub(crate) struct RenderedTemplate {
    pub body: Value,
    /// Templated engines consume the stack parameters themselves.
    pub consumed_parameters: bool,
}

/// Fetch the template at `location` and render it with the engine its
/// extension implies.
///
/// Templated engines see `parameters` plus `build_id`.
pub(crate) fn render_location(
    session: &Session,
    stack_name: &str,
    location: &str,
    parameters: Option<&Mapping>,
    build_id: &str,
) -> StackResult<RenderedTemplate> {
    let engine = TemplateEngine::from_path(&session.fetcher.locate(location))?;
    let (location, text) = session.fetcher.fetch(location)?;
    debug!("Rendering {} for {} with {}", location, stack_name, engine);

    let mut params = parameters.cloned().unwrap_or_default();
    if engine.is_templated() {
        params.insert(Value::from("build_id"), Value::from(build_id));
    }
    let body = session.renderer.render(stack_name, &text, &params, engine)?;

    Ok(RenderedTemplate {
        body,
        consumed_parameters: engine.is_templated(),
    })
}
