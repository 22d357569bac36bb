//! The lifecycle every stack type implements.

use crate::error::{StackError, StackResult};
use crate::session::Session;
use crate::stack_type::StackType;

/// Flags for a lifecycle call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleOptions {
    /// Block until the provider reports completion.
    pub wait: bool,
    /// Review changes before applying an update.
    pub review: bool,
}

impl LifecycleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn review(mut self, review: bool) -> Self {
        self.review = review;
        self
    }
}

/// Lifecycle operations. Each call is independent of the previous ones.
pub trait Lifecycle {
    fn stack_type(&self) -> StackType;

    fn validate(&self, session: &Session) -> StackResult<()>;

    fn create(&self, session: &Session, options: LifecycleOptions) -> StackResult<()>;

    fn update(&self, session: &Session, options: LifecycleOptions) -> StackResult<()>;

    fn delete(&self, session: &Session, options: LifecycleOptions) -> StackResult<()>;

    fn upsert(&self, _session: &Session, _options: LifecycleOptions) -> StackResult<()> {
        Err(self.unsupported("upsert"))
    }

    /// The assembled provider payload, for inspection. No API calls.
    fn render(&self) -> StackResult<String>;

    fn unsupported(&self, operation: &str) -> StackError {
        StackError::UnsupportedOperation {
            stack_type: self.stack_type(),
            operation: operation.to_string(),
        }
    }
}
