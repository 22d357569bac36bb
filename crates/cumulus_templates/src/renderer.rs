//! Template renderer: expand, load, post-process.

use std::sync::Arc;

use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use crate::engine::TemplateEngine;
use crate::error::{TemplateError, TemplateResult};
use crate::outputs::synthesize_outputs;
use crate::resolver::ReferenceResolver;
use crate::script::render_script;
use crate::tags::TagRegistry;
use crate::tera_engine::render_tera;

/// Turns template text into a resolved document.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    resolver: Arc<ReferenceResolver>,
    tags: TagRegistry,
}

impl TemplateRenderer {
    pub fn new(resolver: Arc<ReferenceResolver>) -> Self {
        Self {
            resolver,
            tags: TagRegistry::standard(),
        }
    }

    pub fn with_tags(mut self, tags: TagRegistry) -> Self {
        self.tags = tags;
        self
    }

    pub fn resolver(&self) -> &Arc<ReferenceResolver> {
        &self.resolver
    }

    /// Expand `text` with the given engine. Literal documents come back unchanged.
    pub fn expand(
        &self,
        text: &str,
        engine: TemplateEngine,
        params: &Mapping,
    ) -> TemplateResult<String> {
        debug!("Expanding template with the {} engine", engine);
        match engine {
            TemplateEngine::Script => render_script(text, params, &self.resolver),
            TemplateEngine::Tera => render_tera(text, params, &self.resolver),
            TemplateEngine::Yaml => Ok(text.to_string()),
        }
    }

    /// Parse expanded text and resolve registered reference tags.
    pub fn load(&self, text: &str) -> TemplateResult<Value> {
        let document: Value = serde_yaml::from_str(text)?;
        self.tags.resolve(document, &self.resolver)
    }

    /// Expand and load a stack description. No outputs are synthesized.
    pub fn render_document(
        &self,
        text: &str,
        engine: TemplateEngine,
        params: &Mapping,
    ) -> TemplateResult<Mapping> {
        match self.load(&self.expand(text, engine, params)?)? {
            Value::Mapping(mapping) => Ok(mapping),
            Value::Null => Ok(Mapping::new()),
            other => Err(TemplateError::InvalidDocument(format!(
                "expected a mapping at the top level, found {}",
                kind(&other)
            ))),
        }
    }

    /// Render a template body for `stack_name`, adding default outputs.
    pub fn render(
        &self,
        stack_name: &str,
        text: &str,
        params: &Mapping,
        engine: TemplateEngine,
    ) -> TemplateResult<Value> {
        info!("Rendering template for {} ({})", stack_name, engine);
        let mut document = self.load(&self.expand(text, engine, params)?)?;
        synthesize_outputs(stack_name, &mut document);
        Ok(document)
    }

    /// Render a template body whose engine is implied by `location`'s extension.
    pub fn render_path(
        &self,
        stack_name: &str,
        location: &str,
        text: &str,
        params: &Mapping,
    ) -> TemplateResult<Value> {
        let engine = TemplateEngine::from_path(location)?;
        self.render(stack_name, text, params, engine)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
