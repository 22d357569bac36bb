//! Error types for templates.

use thiserror::Error;

/// Result type alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur while fetching, rendering or loading templates.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template file extension not supported: {0}")]
    UnsupportedExtension(String),

    #[error("Templating engine not supported: {0}. Must be one of: mako, jinja, yaml")]
    UnknownEngine(String),

    #[error("URL scheme not supported: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid template location {location}: {message}")]
    InvalidLocation { location: String, message: String },

    #[error("S3 bucket doesn't exist: {0}")]
    BucketNotFound(String),

    #[error("S3 object doesn't exist: {0}")]
    ObjectNotFound(String),

    /// Engine failure, already reduced to the message and template excerpt.
    #[error("{0}")]
    Rendering(String),

    #[error("Malformed !{tag} reference: {message}")]
    MalformedReference { tag: String, message: String },

    #[error("Invalid template document: {0}")]
    InvalidDocument(String),

    #[error("Failed to fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Provider(#[from] cumulus_providers::ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TemplateError {
    pub fn malformed(tag: &str, message: impl Into<String>) -> Self {
        Self::MalformedReference {
            tag: tag.to_string(),
            message: message.into(),
        }
    }
}
