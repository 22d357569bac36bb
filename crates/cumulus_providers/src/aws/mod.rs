//! AWS clients on the official SDK.
//!
//! The SDK is async. `AwsClient` owns a small tokio runtime and blocks on each
//! request so it can sit behind the blocking provider traits. The SDK
//! configuration is loaded on first use, so runs that never touch AWS never
//! resolve credentials or a region.

mod request;
mod response;
mod waiter;

use std::future::Future;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_cloudformation::config::Credentials;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::api::{AwsApi, CfnWaiter, CloudFormationApi};
use crate::error::{ProviderError, ProviderResult};

use request::{
    decode, DescribeStacksArgs, GetParameterArgs, GetParametersArgs, ListExportsArgs,
    StackRequest, StackResourceArgs,
};
use waiter::{wait_state, WaitState};

const SERVICE: &str = "cloudformation";

/// CreateStack arguments that UpdateStack does not take.
const CREATE_ONLY: [&str; 3] = ["OnFailure", "TimeoutInMinutes", "EnableTerminationProtection"];

/// AWS client options.
#[derive(Debug, Clone)]
pub struct AwsOptions {
    /// Named profile from the shared config files.
    pub profile: Option<String>,
    /// Region override.
    pub region: Option<String>,
    /// Endpoint override for every service.
    pub endpoint_url: Option<String>,
    /// Fixed access key and secret instead of the default credential chain.
    pub static_credentials: Option<(String, String)>,
    /// Delay between waiter polls.
    pub poll_interval: Duration,
    /// Waiter polls before giving up.
    pub max_attempts: u32,
}

impl Default for AwsOptions {
    fn default() -> Self {
        Self {
            profile: None,
            region: None,
            endpoint_url: None,
            static_credentials: None,
            poll_interval: Duration::from_secs(30),
            max_attempts: 120,
        }
    }
}

impl AwsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn static_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.static_credentials = Some((access_key_id.into(), secret_access_key.into()));
        self
    }

    pub fn poll(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_attempts = max_attempts;
        self
    }
}

struct Clients {
    cloudformation: aws_sdk_cloudformation::Client,
    s3: aws_sdk_s3::Client,
    ssm: aws_sdk_ssm::Client,
}

/// AWS client for CloudFormation, S3 and SSM.
pub struct AwsClient {
    options: AwsOptions,
    runtime: Runtime,
    clients: OnceLock<Clients>,
}

/// Map an SDK failure to a provider error, keeping the service's error code.
fn sdk_error<E, R>(service: &str, err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match (err.code(), err.message()) {
        (Some(code), message) => ProviderError::coded(service, code, message.unwrap_or(code)),
        (None, Some(message)) => ProviderError::api(service, message),
        (None, None) => ProviderError::Dispatch {
            service: service.to_string(),
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

/// Apply a JMESPath expression to a response.
fn apply_filter(response: Value, result_filter: Option<&str>) -> ProviderResult<Value> {
    let Some(filter) = result_filter else {
        return Ok(response);
    };
    let invalid = |e: jmespath::JmespathError| ProviderError::invalid_request("jmespath", e.to_string());
    let expression = jmespath::compile(filter).map_err(invalid)?;
    let result = expression.search(&response).map_err(invalid)?;
    Ok(serde_json::to_value(&*result)?)
}

impl AwsClient {
    pub fn new(options: AwsOptions) -> ProviderResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            options,
            runtime,
            clients: OnceLock::new(),
        })
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn load_config(&self) -> SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = &self.options.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &self.options.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(url) = &self.options.endpoint_url {
            loader = loader.endpoint_url(url);
        }
        if let Some((key, secret)) = &self.options.static_credentials {
            loader = loader.credentials_provider(Credentials::new(
                key.clone(),
                secret.clone(),
                None,
                None,
                "cumulus",
            ));
        }
        self.block_on(loader.load())
    }

    fn clients(&self) -> &Clients {
        self.clients.get_or_init(|| {
            let config = self.load_config();
            debug!("Loaded AWS configuration for region {:?}", config.region());
            let s3 = aws_sdk_s3::config::Builder::from(&config)
                .force_path_style(self.options.endpoint_url.is_some())
                .build();
            Clients {
                cloudformation: aws_sdk_cloudformation::Client::new(&config),
                s3: aws_sdk_s3::Client::from_conf(s3),
                ssm: aws_sdk_ssm::Client::new(&config),
            }
        })
    }

    fn find_stack(&self, stack_name: &str) -> ProviderResult<aws_sdk_cloudformation::types::Stack> {
        let output = self
            .block_on(
                self.clients()
                    .cloudformation
                    .describe_stacks()
                    .stack_name(stack_name)
                    .send(),
            )
            .map_err(|e| sdk_error(SERVICE, e))?;
        output
            .stacks()
            .first()
            .cloned()
            .ok_or_else(|| ProviderError::InvalidResponse {
                service: SERVICE.to_string(),
                message: format!("no stack returned for {}", stack_name),
            })
    }

    fn find_change_set(
        &self,
        stack_name: &str,
        change_set_name: &str,
    ) -> ProviderResult<aws_sdk_cloudformation::operation::describe_change_set::DescribeChangeSetOutput>
    {
        self.block_on(
            self.clients()
                .cloudformation
                .describe_change_set()
                .stack_name(stack_name)
                .change_set_name(change_set_name)
                .send(),
        )
        .map_err(|e| sdk_error(SERVICE, e))
    }

    /// Current status and reason of what `waiter` watches.
    fn waiter_status(
        &self,
        waiter: CfnWaiter,
        stack_name: &str,
        change_set_name: Option<&str>,
    ) -> ProviderResult<(String, Option<String>)> {
        if waiter == CfnWaiter::ChangeSetCreateComplete {
            let change_set = change_set_name.ok_or_else(|| {
                ProviderError::invalid_request(SERVICE, format!("{} needs a change set name", waiter))
            })?;
            let output = self.find_change_set(stack_name, change_set)?;
            let status = output.status().map(|s| s.as_str().to_string()).unwrap_or_default();
            return Ok((status, output.status_reason().map(String::from)));
        }
        let stack = self.find_stack(stack_name)?;
        let status = response::stack_json(&stack);
        Ok((
            status["StackStatus"].as_str().unwrap_or_default().to_string(),
            status["StackStatusReason"].as_str().map(String::from),
        ))
    }

    fn list_exports(&self) -> ProviderResult<Value> {
        let client = &self.clients().cloudformation;
        let mut exports = Vec::new();
        let mut next_token = None;
        loop {
            let page = self
                .block_on(client.list_exports().set_next_token(next_token.take()).send())
                .map_err(|e| sdk_error(SERVICE, e))?;
            exports.extend(page.exports().iter().map(response::export_json));
            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(json!({ "Exports": exports }))
    }

    fn get_parameter(&self, args: GetParameterArgs) -> ProviderResult<Value> {
        let output = self
            .block_on(
                self.clients()
                    .ssm
                    .get_parameter()
                    .name(args.name)
                    .with_decryption(args.with_decryption)
                    .send(),
            )
            .map_err(|e| sdk_error("ssm", e))?;
        Ok(json!({ "Parameter": output.parameter().map(response::ssm_parameter_json) }))
    }

    fn get_parameters(&self, args: GetParametersArgs) -> ProviderResult<Value> {
        let output = self
            .block_on(
                self.clients()
                    .ssm
                    .get_parameters()
                    .set_names(Some(args.names))
                    .with_decryption(args.with_decryption)
                    .send(),
            )
            .map_err(|e| sdk_error("ssm", e))?;
        Ok(json!({
            "Parameters": output.parameters().iter().map(response::ssm_parameter_json).collect::<Vec<_>>(),
            "InvalidParameters": output.invalid_parameters(),
        }))
    }
}

impl CloudFormationApi for AwsClient {
    fn validate_template(&self, template_body: &str) -> ProviderResult<()> {
        debug!("Validating CloudFormation template");
        self.block_on(
            self.clients()
                .cloudformation
                .validate_template()
                .template_body(template_body)
                .send(),
        )
        .map_err(|e| sdk_error(SERVICE, e))?;
        Ok(())
    }

    fn create_stack(&self, payload: &Value) -> ProviderResult<()> {
        let request = StackRequest::decode("CreateStack", payload)?;
        request.reject("CreateStack", &["ChangeSetName", "ChangeSetType", "Description"])?;
        let output = self
            .block_on(
                self.clients()
                    .cloudformation
                    .create_stack()
                    .stack_name(&request.stack_name)
                    .set_template_body(request.template_body.clone())
                    .set_template_url(request.template_url.clone())
                    .set_parameters(request.parameters())
                    .set_tags(request.tags()?)
                    .set_capabilities(request.capabilities())
                    .set_resource_types(request.resource_types())
                    .set_notification_arns(request.notification_arns())
                    .set_role_arn(request.role_arn.clone())
                    .set_stack_policy_body(request.stack_policy_body.clone())
                    .set_stack_policy_url(request.stack_policy_url.clone())
                    .set_on_failure(request.on_failure())
                    .set_timeout_in_minutes(request.timeout_in_minutes)
                    .set_disable_rollback(request.disable_rollback)
                    .set_enable_termination_protection(request.enable_termination_protection)
                    .set_client_request_token(request.client_request_token.clone())
                    .send(),
            )
            .map_err(|e| sdk_error(SERVICE, e))?;
        info!("Stack creation started: {}", output.stack_id().unwrap_or_default());
        Ok(())
    }

    fn update_stack(&self, payload: &Value) -> ProviderResult<()> {
        let request = StackRequest::decode("UpdateStack", payload)?;
        request.reject("UpdateStack", &CREATE_ONLY)?;
        request.reject("UpdateStack", &["ChangeSetName", "ChangeSetType", "Description"])?;
        let output = self
            .block_on(
                self.clients()
                    .cloudformation
                    .update_stack()
                    .stack_name(&request.stack_name)
                    .set_template_body(request.template_body.clone())
                    .set_template_url(request.template_url.clone())
                    .set_parameters(request.parameters())
                    .set_tags(request.tags()?)
                    .set_capabilities(request.capabilities())
                    .set_resource_types(request.resource_types())
                    .set_notification_arns(request.notification_arns())
                    .set_role_arn(request.role_arn.clone())
                    .set_stack_policy_body(request.stack_policy_body.clone())
                    .set_stack_policy_url(request.stack_policy_url.clone())
                    .set_disable_rollback(request.disable_rollback)
                    .set_client_request_token(request.client_request_token.clone())
                    .send(),
            )
            .map_err(|e| sdk_error(SERVICE, e))?;
        info!("Stack update started: {}", output.stack_id().unwrap_or_default());
        Ok(())
    }

    fn delete_stack(&self, stack_name: &str) -> ProviderResult<()> {
        info!("Deleting stack: {}", stack_name);
        self.block_on(
            self.clients()
                .cloudformation
                .delete_stack()
                .stack_name(stack_name)
                .send(),
        )
        .map_err(|e| sdk_error(SERVICE, e))?;
        Ok(())
    }

    fn wait(
        &self,
        waiter: CfnWaiter,
        stack_name: &str,
        change_set_name: Option<&str>,
    ) -> ProviderResult<()> {
        info!("Waiting for {} on {}", waiter, stack_name);
        for attempt in 1..=self.options.max_attempts {
            let (status, reason) = match self.waiter_status(waiter, stack_name, change_set_name) {
                Ok(found) => found,
                Err(err) if waiter == CfnWaiter::StackDeleteComplete && err.is_missing_stack() => {
                    return Ok(())
                }
                Err(err) => return Err(err),
            };
            match wait_state(waiter, &status) {
                WaitState::Done => return Ok(()),
                WaitState::Failed => {
                    let mut message = format!("{} reached terminal status {}", stack_name, status);
                    if let Some(reason) = reason {
                        message = format!("{}: {}", message, reason);
                    }
                    return Err(ProviderError::Waiter {
                        waiter: waiter.to_string(),
                        message,
                    });
                }
                WaitState::Pending => {
                    debug!("{} is {} (attempt {})", stack_name, status, attempt);
                    if attempt < self.options.max_attempts {
                        thread::sleep(self.options.poll_interval);
                    }
                }
            }
        }
        Err(ProviderError::Waiter {
            waiter: waiter.to_string(),
            message: "Max attempts exceeded".to_string(),
        })
    }

    fn describe_stack(&self, stack_name: &str) -> ProviderResult<Value> {
        Ok(response::stack_json(&self.find_stack(stack_name)?))
    }

    fn describe_stack_resource(
        &self,
        stack_name: &str,
        logical_id: &str,
    ) -> ProviderResult<String> {
        let output = self
            .block_on(
                self.clients()
                    .cloudformation
                    .describe_stack_resource()
                    .stack_name(stack_name)
                    .logical_resource_id(logical_id)
                    .send(),
            )
            .map_err(|e| sdk_error(SERVICE, e))?;
        Ok(output
            .stack_resource_detail()
            .and_then(|detail| detail.physical_resource_id())
            .unwrap_or_default()
            .to_string())
    }

    fn create_change_set(&self, payload: &Value) -> ProviderResult<()> {
        let request = StackRequest::decode("CreateChangeSet", payload)?;
        request.reject("CreateChangeSet", &CREATE_ONLY)?;
        request.reject(
            "CreateChangeSet",
            &["StackPolicyBody", "StackPolicyURL", "DisableRollback", "ClientRequestToken"],
        )?;
        let change_set_name = request.change_set_name.clone().ok_or_else(|| {
            ProviderError::invalid_request(SERVICE, "CreateChangeSet needs ChangeSetName")
        })?;
        self.block_on(
            self.clients()
                .cloudformation
                .create_change_set()
                .stack_name(&request.stack_name)
                .change_set_name(change_set_name)
                .set_change_set_type(request.change_set_type())
                .set_description(request.description.clone())
                .set_template_body(request.template_body.clone())
                .set_template_url(request.template_url.clone())
                .set_parameters(request.parameters())
                .set_tags(request.tags()?)
                .set_capabilities(request.capabilities())
                .set_resource_types(request.resource_types())
                .set_notification_arns(request.notification_arns())
                .set_role_arn(request.role_arn.clone())
                .send(),
        )
        .map_err(|e| sdk_error(SERVICE, e))?;
        Ok(())
    }

    fn describe_change_set(
        &self,
        stack_name: &str,
        change_set_name: &str,
    ) -> ProviderResult<Value> {
        let output = self.find_change_set(stack_name, change_set_name)?;
        Ok(response::change_set_json(&output))
    }

    fn execute_change_set(&self, stack_name: &str, change_set_name: &str) -> ProviderResult<()> {
        self.block_on(
            self.clients()
                .cloudformation
                .execute_change_set()
                .stack_name(stack_name)
                .change_set_name(change_set_name)
                .send(),
        )
        .map_err(|e| sdk_error(SERVICE, e))?;
        Ok(())
    }

    fn delete_change_set(&self, stack_name: &str, change_set_name: &str) -> ProviderResult<()> {
        self.block_on(
            self.clients()
                .cloudformation
                .delete_change_set()
                .stack_name(stack_name)
                .change_set_name(change_set_name)
                .send(),
        )
        .map_err(|e| sdk_error(SERVICE, e))?;
        Ok(())
    }
}

impl AwsApi for AwsClient {
    /// Supported operations: CloudFormation `describe_stacks`,
    /// `describe_stack_resource` and `list_exports`; SSM `get_parameter` and
    /// `get_parameters`.
    fn call(
        &self,
        service: &str,
        action: &str,
        arguments: &Value,
        result_filter: Option<&str>,
    ) -> ProviderResult<Value> {
        debug!("Calling {}.{}", service, action);
        let response = match (service, action) {
            ("cloudformation", "describe_stacks") => {
                let args: DescribeStacksArgs = decode(service, action, arguments)?;
                let output = self
                    .block_on(
                        self.clients()
                            .cloudformation
                            .describe_stacks()
                            .set_stack_name(args.stack_name)
                            .send(),
                    )
                    .map_err(|e| sdk_error(SERVICE, e))?;
                json!({
                    "Stacks": output.stacks().iter().map(response::stack_json).collect::<Vec<_>>()
                })
            }
            ("cloudformation", "describe_stack_resource") => {
                let args: StackResourceArgs = decode(service, action, arguments)?;
                let output = self
                    .block_on(
                        self.clients()
                            .cloudformation
                            .describe_stack_resource()
                            .stack_name(args.stack_name)
                            .logical_resource_id(args.logical_resource_id)
                            .send(),
                    )
                    .map_err(|e| sdk_error(SERVICE, e))?;
                json!({
                    "StackResourceDetail": output.stack_resource_detail().map(response::stack_resource_json)
                })
            }
            ("cloudformation", "list_exports") => {
                let _: ListExportsArgs = decode(service, action, arguments)?;
                self.list_exports()?
            }
            ("ssm", "get_parameter") => self.get_parameter(decode(service, action, arguments)?)?,
            ("ssm", "get_parameters") => self.get_parameters(decode(service, action, arguments)?)?,
            _ => {
                return Err(ProviderError::UnsupportedOperation {
                    service: service.to_string(),
                    action: action.to_string(),
                })
            }
        };
        apply_filter(response, result_filter)
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        extra_args: &[(String, String)],
    ) -> ProviderResult<String> {
        let mut request = self.clients().s3.get_object().bucket(bucket).key(key);
        for (name, value) in extra_args {
            request = match name.as_str() {
                "VersionId" => request.version_id(value),
                "Range" => request.range(value),
                "IfMatch" => request.if_match(value),
                "IfNoneMatch" => request.if_none_match(value),
                "ExpectedBucketOwner" => request.expected_bucket_owner(value),
                other => {
                    return Err(ProviderError::invalid_request(
                        "s3",
                        format!("GetObject does not accept {}", other),
                    ))
                }
            };
        }

        debug!("Fetching s3://{}/{}", bucket, key);
        let body = self.block_on(async {
            let output = request.send().await.map_err(|e| sdk_error("s3", e))?;
            output
                .body
                .collect()
                .await
                .map_err(|e| ProviderError::Dispatch {
                    service: "s3".to_string(),
                    message: e.to_string(),
                })
        })?;
        String::from_utf8(body.into_bytes().to_vec()).map_err(|e| ProviderError::InvalidResponse {
            service: "s3".to_string(),
            message: format!("s3://{}/{} is not UTF-8: {}", bucket, key, e),
        })
    }
}
