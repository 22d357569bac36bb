//! Provider API traits.
//!
//! Each trait is the narrow slice of a cloud SDK that stacks and the
//! reference resolver depend on. Payloads are passed through as JSON values
//! using the provider's own field names.

use serde_json::Value;

use crate::error::ProviderResult;

/// Blocking CloudFormation waiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfnWaiter {
    StackCreateComplete,
    StackUpdateComplete,
    StackDeleteComplete,
    ChangeSetCreateComplete,
}

impl CfnWaiter {
    /// Waiter name, as used in log lines and waiter errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StackCreateComplete => "stack-create-complete",
            Self::StackUpdateComplete => "stack-update-complete",
            Self::StackDeleteComplete => "stack-delete-complete",
            Self::ChangeSetCreateComplete => "change-set-create-complete",
        }
    }
}

impl std::fmt::Display for CfnWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// AWS CloudFormation operations.
pub trait CloudFormationApi: Send + Sync {
    /// Validate a template body.
    fn validate_template(&self, template_body: &str) -> ProviderResult<()>;

    /// Create a stack from a full CreateStack payload.
    fn create_stack(&self, payload: &Value) -> ProviderResult<()>;

    /// Update a stack from a full UpdateStack payload.
    fn update_stack(&self, payload: &Value) -> ProviderResult<()>;

    fn delete_stack(&self, stack_name: &str) -> ProviderResult<()>;

    /// Block until the waiter condition is reached or the provider reports failure.
    fn wait(
        &self,
        waiter: CfnWaiter,
        stack_name: &str,
        change_set_name: Option<&str>,
    ) -> ProviderResult<()>;

    /// Describe a single stack (one element of DescribeStacks).
    fn describe_stack(&self, stack_name: &str) -> ProviderResult<Value>;

    /// Physical identifier of a logical resource.
    fn describe_stack_resource(&self, stack_name: &str, logical_id: &str)
        -> ProviderResult<String>;

    /// Create a change set from a CreateChangeSet payload.
    fn create_change_set(&self, payload: &Value) -> ProviderResult<()>;

    fn describe_change_set(&self, stack_name: &str, change_set_name: &str)
        -> ProviderResult<Value>;

    fn execute_change_set(&self, stack_name: &str, change_set_name: &str) -> ProviderResult<()>;

    fn delete_change_set(&self, stack_name: &str, change_set_name: &str) -> ProviderResult<()>;
}

/// Generic AWS API access.
pub trait AwsApi: Send + Sync {
    /// Invoke `service.action` with keyword arguments.
    ///
    /// `action` uses the snake_case operation name (`get_parameter`).
    /// When `result_filter` is set it is applied as a JMESPath expression to
    /// the raw response.
    fn call(
        &self,
        service: &str,
        action: &str,
        arguments: &Value,
        result_filter: Option<&str>,
    ) -> ProviderResult<Value>;

    /// Read an S3 object body. `extra_args` are GetObject arguments such as
    /// `VersionId`.
    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        extra_args: &[(String, String)],
    ) -> ProviderResult<String>;
}

/// Azure Resource Manager operations.
pub trait ResourceManagerApi: Send + Sync {
    /// Create or update a resource group. `parameters` carries `location` and `tags`.
    fn create_or_update_resource_group(&self, name: &str, parameters: &Value)
        -> ProviderResult<()>;

    /// Delete a resource group, blocking until it is gone.
    fn delete_resource_group(&self, name: &str) -> ProviderResult<()>;

    /// Create or update a deployment with the given properties.
    fn create_or_update_deployment(
        &self,
        resource_group: &str,
        deployment: &str,
        properties: &Value,
        wait: bool,
    ) -> ProviderResult<()>;

    /// Validate a deployment. Returns the provider-reported error message, if any.
    fn validate_deployment(
        &self,
        resource_group: &str,
        deployment: &str,
        properties: &Value,
    ) -> ProviderResult<Option<String>>;

    fn delete_deployment(&self, resource_group: &str, deployment: &str, wait: bool)
        -> ProviderResult<()>;

    fn get_deployment(&self, resource_group: &str, deployment: &str) -> ProviderResult<Value>;
}

/// GCP Deployment Manager operations.
pub trait DeploymentManagerApi: Send + Sync {
    /// Fetch a deployment, `None` when it does not exist.
    fn get_deployment(&self, project: &str, deployment: &str) -> ProviderResult<Option<Value>>;

    fn get_manifest(&self, project: &str, deployment: &str, manifest: &str)
        -> ProviderResult<Value>;

    /// Insert a deployment from a full deployment body.
    fn insert_deployment(&self, project: &str, body: &Value) -> ProviderResult<()>;

    fn delete_deployment(&self, project: &str, deployment: &str) -> ProviderResult<()>;
}
