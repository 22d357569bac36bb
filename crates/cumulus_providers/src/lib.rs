//! # cumulus_providers
//!
//! Cloud provider clients for cumulus.
//!
//! Stacks and the reference resolver never talk to a cloud SDK directly.
//! They go through the traits in [`api`], collected per run in a
//! [`ProviderContext`].
//!
//! # Features
//!
//! - **AWS**: CloudFormation lifecycle, waiters, change sets, SSM parameters and
//!   S3 objects on the AWS SDK
//! - **Azure**: Resource groups and ARM deployments over the Resource Manager
//!   REST API with `azure_identity` tokens
//! - **GCP**: Deployment Manager v2 over REST
//! - **Mock Cloud**: Recording in-memory implementation for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use cumulus_providers::{ProviderContext, ProviderOptions};
//!
//! let providers = ProviderContext::from_options(ProviderOptions::default())?;
//! let stack = providers.cloudformation.describe_stack("network")?;
//! println!("{}", stack["StackStatus"]);
//! # Ok::<(), cumulus_providers::ProviderError>(())
//! ```

pub mod api;
pub mod aws;
pub mod azure;
pub mod context;
pub mod error;
pub mod gcp;
pub mod mock;

pub use api::{AwsApi, CfnWaiter, CloudFormationApi, DeploymentManagerApi, ResourceManagerApi};
pub use aws::{AwsClient, AwsOptions};
pub use azure::{ResourceManagerOptions, ResourceManagerRest};
pub use context::{ProviderContext, ProviderOptions};
pub use error::{ProviderError, ProviderResult};
pub use gcp::{DeploymentManagerOptions, DeploymentManagerRest};
pub use mock::{CapturedCall, MockCloud};
