//! # cumulus_stacks
//!
//! Stack model and provider lifecycles for cumulus.
//!
//! A rendered stack file becomes a [`StackDocument`], which the [`factory`]
//! turns into one [`Stack`] variant. Every variant offers the same
//! lifecycle: validate, create, update, delete, upsert and render.
//!
//! ## Stack types
//!
//! - **AWS**: CloudFormation stacks, with change set review on update
//! - **Azure**: ARM deployments inside a managed resource group
//! - **GCP**: Deployment Manager deployments with manual polling
//! - **Shell**: Local commands per action
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cumulus_providers::{ProviderContext, ProviderOptions};
//! use cumulus_stacks::{factory, ChangeSetDecision, LifecycleOptions, Session};
//!
//! let providers = ProviderContext::from_options(ProviderOptions::default())?;
//! let session = Session::new(providers, Arc::new(ChangeSetDecision::Keep));
//!
//! let fields = serde_yaml::from_str(
//!     "StackName: web\nBuildId: '42'\nTemplateBody: templates/web.mako\n",
//! )
//! .unwrap();
//! let stack = factory(&session, fields).unwrap();
//! stack.upsert(&session, LifecycleOptions::new().wait(true)).unwrap();
//! # Ok::<(), cumulus_providers::ProviderError>(())
//! ```

pub mod aws;
pub mod azure;
pub mod change_set;
pub mod document;
pub mod error;
pub mod gcp;
pub mod lifecycle;
pub mod session;
pub mod shell;
pub mod stack;
pub mod stack_type;
mod template;

pub use aws::AwsStack;
pub use azure::{AzureStack, ResourceGroup};
pub use change_set::{ChangeSetDecider, ChangeSetDecision};
pub use document::StackDocument;
pub use error::{StackError, StackResult};
pub use gcp::GcpStack;
pub use lifecycle::{Lifecycle, LifecycleOptions};
pub use session::{PollConfig, Session};
pub use shell::{Commands, ShellAction, ShellStack};
pub use stack::{factory, Stack};
pub use stack_type::StackType;
