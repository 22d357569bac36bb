//! Stack factory and dispatch.

use serde_yaml::Mapping;
use tracing::debug;

use crate::aws::AwsStack;
use crate::azure::AzureStack;
use crate::document::StackDocument;
use crate::error::StackResult;
use crate::gcp::GcpStack;
use crate::lifecycle::{Lifecycle, LifecycleOptions};
use crate::session::Session;
use crate::shell::ShellStack;
use crate::stack_type::StackType;

/// A normalized stack of any supported type.
#[derive(Debug, Clone)]
pub enum Stack {
    Aws(AwsStack),
    Azure(AzureStack),
    Gcp(GcpStack),
    Shell(ShellStack),
}

impl Stack {
    /// Build the stack variant named by the document's type.
    pub fn from_document(session: &Session, doc: StackDocument) -> StackResult<Self> {
        debug!("Building {} stack {:?}", doc.stack_type, doc.name);
        Ok(match doc.stack_type {
            StackType::Aws => Stack::Aws(AwsStack::from_document(session, doc)?),
            StackType::Azure => Stack::Azure(AzureStack::from_document(session, doc)?),
            StackType::Gcp => Stack::Gcp(GcpStack::from_document(session, doc)?),
            StackType::Shell => Stack::Shell(ShellStack::from_document(session, doc)?),
        })
    }

    /// Name of the stack, when it has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Stack::Aws(stack) => Some(stack.name()),
            Stack::Azure(stack) => Some(stack.name()),
            Stack::Gcp(stack) => Some(stack.name()),
            Stack::Shell(stack) => stack.name(),
        }
    }

    fn lifecycle(&self) -> &dyn Lifecycle {
        match self {
            Stack::Aws(stack) => stack,
            Stack::Azure(stack) => stack,
            Stack::Gcp(stack) => stack,
            Stack::Shell(stack) => stack,
        }
    }

    pub fn stack_type(&self) -> StackType {
        self.lifecycle().stack_type()
    }

    pub fn validate(&self, session: &Session) -> StackResult<()> {
        self.lifecycle().validate(session)
    }

    pub fn create(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        self.lifecycle().create(session, options)
    }

    pub fn update(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        self.lifecycle().update(session, options)
    }

    pub fn delete(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        self.lifecycle().delete(session, options)
    }

    pub fn upsert(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        self.lifecycle().upsert(session, options)
    }

    pub fn render(&self) -> StackResult<String> {
        self.lifecycle().render()
    }
}

/// Build a stack straight from a rendered stack mapping.
pub fn factory(session: &Session, fields: Mapping) -> StackResult<Stack> {
    Stack::from_document(session, StackDocument::from_mapping(fields)?)
}
