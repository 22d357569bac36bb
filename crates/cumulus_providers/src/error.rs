//! Error types for provider clients.

use thiserror::Error;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur while talking to a cloud provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider rejected the request. Only the provider's own message is
    /// displayed; `code` is the provider's error code when it sent one.
    #[error("{message}")]
    Api {
        service: String,
        code: Option<String>,
        message: String,
    },

    /// The request never got a provider answer (connection, timeout, signing).
    #[error("{service} request failed: {message}")]
    Dispatch { service: String, message: String },

    #[error("Invalid {service} request: {message}")]
    InvalidRequest { service: String, message: String },

    #[error("Unsupported {service} operation: {action}")]
    UnsupportedOperation { service: String, action: String },

    #[error("Waiter {waiter} failed: {message}")]
    Waiter { waiter: String, message: String },

    #[error("Failed to obtain {service} credentials: {message}")]
    Credentials { service: String, message: String },

    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected response from {service}: {message}")]
    InvalidResponse { service: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    /// A provider error without an error code.
    pub fn api(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            service: service.into(),
            code: None,
            message: message.into(),
        }
    }

    /// A provider error carrying the provider's error code.
    pub fn coded(
        service: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Api {
            service: service.into(),
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn invalid_request(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            service: service.into(),
            message: message.into(),
        }
    }

    /// The provider's error code, e.g. `ValidationError` or `NoSuchKey`.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Whether CloudFormation reported that the target stack does not exist.
    ///
    /// CloudFormation uses the generic `ValidationError` code for this, so the
    /// message tells it apart from other validation failures.
    pub fn is_missing_stack(&self) -> bool {
        matches!(
            self,
            Self::Api { code: Some(code), message, .. }
                if code == "ValidationError" && message.ends_with("does not exist")
        )
    }
}
