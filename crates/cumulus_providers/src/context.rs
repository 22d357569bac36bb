//! Per-run provider handles.

use std::sync::Arc;

use crate::api::{AwsApi, CloudFormationApi, DeploymentManagerApi, ResourceManagerApi};
use crate::aws::{AwsClient, AwsOptions};
use crate::azure::{ResourceManagerOptions, ResourceManagerRest};
use crate::error::ProviderResult;
use crate::gcp::{DeploymentManagerOptions, DeploymentManagerRest};

/// Options for building the production provider clients.
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    pub aws: AwsOptions,
    pub azure: ResourceManagerOptions,
    pub gcp: DeploymentManagerOptions,
}

/// Provider clients shared by the resolver and stacks for one run.
#[derive(Clone)]
pub struct ProviderContext {
    pub cloudformation: Arc<dyn CloudFormationApi>,
    pub aws: Arc<dyn AwsApi>,
    pub resource_manager: Arc<dyn ResourceManagerApi>,
    pub deployment_manager: Arc<dyn DeploymentManagerApi>,
}

impl ProviderContext {
    /// Build the SDK and REST backed clients. Nothing is contacted until a
    /// client is first used.
    pub fn from_options(options: ProviderOptions) -> ProviderResult<Self> {
        let aws = Arc::new(AwsClient::new(options.aws)?);
        Ok(Self {
            cloudformation: aws.clone(),
            aws,
            resource_manager: Arc::new(ResourceManagerRest::new(options.azure)),
            deployment_manager: Arc::new(DeploymentManagerRest::new(options.gcp)),
        })
    }
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext").finish_non_exhaustive()
    }
}
