//! Templating engine selection.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TemplateError, TemplateResult};

/// Supported templating engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateEngine {
    /// Scripted templates (`.mako`): expressions, control lines and code blocks.
    Script,
    /// Tera templates (`.jinja`, `.j2`).
    Tera,
    /// Plain YAML or JSON, no templating.
    Yaml,
}

impl TemplateEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Script => "mako",
            Self::Tera => "jinja",
            Self::Yaml => "yaml",
        }
    }

    /// Engine selected by name, as given on the command line.
    pub fn from_name(name: &str) -> TemplateResult<Self> {
        match name {
            "mako" => Ok(Self::Script),
            "jinja" => Ok(Self::Tera),
            "yaml" => Ok(Self::Yaml),
            other => Err(TemplateError::UnknownEngine(other.to_string())),
        }
    }

    /// Engine implied by a file extension.
    pub fn from_extension(extension: &str) -> TemplateResult<Self> {
        match extension {
            "mako" => Ok(Self::Script),
            "jinja" | "j2" => Ok(Self::Tera),
            "yaml" | "yml" | "json" => Ok(Self::Yaml),
            other => Err(TemplateError::UnsupportedExtension(format!(".{}", other))),
        }
    }

    /// Engine implied by the extension of a path or URL path.
    ///
    /// Query strings and fragments are ignored.
    pub fn from_path(path: &str) -> TemplateResult<Self> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some(ext) => Self::from_extension(ext),
            None => Err(TemplateError::UnsupportedExtension(format!(
                "{} has no file extension",
                path
            ))),
        }
    }

    /// Whether the engine expands parameters itself.
    pub fn is_templated(&self) -> bool {
        !matches!(self, Self::Yaml)
    }
}

impl std::fmt::Display for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
