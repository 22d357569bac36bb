//! Error types for stacks.

use thiserror::Error;

use crate::stack_type::StackType;

/// Result type alias for stack operations.
pub type StackResult<T> = Result<T, StackError>;

/// Errors that can occur while building or operating a stack.
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Stack type not supported: {0}")]
    UnknownType(String),

    #[error("The build ID is required. Use -b option or set BUILD_ID")]
    MissingBuildId,

    #[error("{stack_type} stack requires field '{field}'")]
    MissingField { stack_type: StackType, field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Please specify either {first} or {second}, not both")]
    ConflictingFields { first: String, second: String },

    #[error("Deployment already exists: {0}")]
    AlreadyExists(String),

    #[error("Deployment doesn't exist: {0}")]
    DoesNotExist(String),

    #[error("Operation {operation} is not supported for {stack_type} stacks")]
    UnsupportedOperation {
        stack_type: StackType,
        operation: String,
    },

    #[error("Action not available: {0}")]
    MissingAction(String),

    #[error("At least one command must be specified in a shell stack (action {0})")]
    EmptyCommands(String),

    #[error("Command {command} exited with return code {code}")]
    CommandFailed { command: String, code: i32 },

    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read import {path}: {source}")]
    Import {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Template or deployment rejected by the provider's validation.
    #[error("{0}")]
    ValidationFailed(String),

    #[error(transparent)]
    Template(#[from] cumulus_templates::TemplateError),

    #[error(transparent)]
    Provider(#[from] cumulus_providers::ProviderError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StackError {
    pub fn missing(stack_type: StackType, field: &str) -> Self {
        Self::MissingField {
            stack_type,
            field: field.to_string(),
        }
    }

    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Whether this is the provider's "does not exist" error for the target stack.
    pub fn is_missing_stack(&self) -> bool {
        matches!(self, Self::Provider(err) if err.is_missing_stack())
    }
}
