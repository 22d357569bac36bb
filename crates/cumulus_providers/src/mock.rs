//! In-memory cloud for testing.
//!
//! `MockCloud` implements every provider trait, records each call and answers
//! from canned data configured through builder methods. Clones share state,
//! so a test can hand a context to the code under test and inspect the
//! captured calls afterwards.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::api::{AwsApi, CfnWaiter, CloudFormationApi, DeploymentManagerApi, ResourceManagerApi};
use crate::context::ProviderContext;
use crate::error::{ProviderError, ProviderResult};

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    /// Trait method name, e.g. `create_stack`.
    pub method: String,
    /// Main identifier the call targeted (stack, deployment, `service.action`, ...).
    pub target: String,
    /// Request payload, when the call carried one.
    pub payload: Option<Value>,
}

#[derive(Default)]
struct MockState {
    calls: Vec<CapturedCall>,
    failures: HashMap<String, VecDeque<(Option<String>, String)>>,
    stacks: HashMap<String, Value>,
    resources: HashMap<(String, String), String>,
    call_results: HashMap<String, Value>,
    objects: HashMap<String, String>,
    change_set: Option<Value>,
    azure_deployments: HashMap<String, Value>,
    azure_validation_error: Option<String>,
    gcp_deployments: HashMap<String, VecDeque<Value>>,
    gcp_manifests: HashMap<String, Value>,
}

/// Mock cloud for testing.
#[derive(Clone, Default)]
pub struct MockCloud {
    state: Arc<RwLock<MockState>>,
}

impl MockCloud {
    /// Create an empty mock cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider context whose clients all point at this mock.
    pub fn context(&self) -> ProviderContext {
        let shared = Arc::new(self.clone());
        ProviderContext {
            cloudformation: shared.clone(),
            aws: shared.clone(),
            resource_manager: shared.clone(),
            deployment_manager: shared,
        }
    }

    /// Register a CloudFormation stack with the given outputs.
    pub fn with_stack_outputs(self, stack: &str, outputs: &[(&str, &str)]) -> Self {
        let outputs: Vec<Value> = outputs
            .iter()
            .map(|(k, v)| json!({"OutputKey": k, "OutputValue": v}))
            .collect();
        self.state.write().stacks.insert(
            stack.to_string(),
            json!({"StackName": stack, "StackStatus": "CREATE_COMPLETE", "Outputs": outputs}),
        );
        self
    }

    /// Register the physical id of a logical resource.
    pub fn with_stack_resource(self, stack: &str, logical_id: &str, physical_id: &str) -> Self {
        self.state.write().resources.insert(
            (stack.to_string(), logical_id.to_string()),
            physical_id.to_string(),
        );
        self
    }

    /// Canned response for a generic `service.action` call.
    pub fn with_call_result(self, service: &str, action: &str, result: Value) -> Self {
        self.state
            .write()
            .call_results
            .insert(format!("{}.{}", service, action), result);
        self
    }

    /// Register an S3 object body.
    pub fn with_object(self, bucket: &str, key: &str, body: &str) -> Self {
        self.state
            .write()
            .objects
            .insert(format!("{}/{}", bucket, key), body.to_string());
        self
    }

    /// Description returned by `describe_change_set`.
    pub fn with_change_set(self, description: Value) -> Self {
        self.state.write().change_set = Some(description);
        self
    }

    /// Register an Azure deployment as returned by `get_deployment`.
    pub fn with_azure_deployment(self, resource_group: &str, name: &str, deployment: Value) -> Self {
        self.state
            .write()
            .azure_deployments
            .insert(format!("{}/{}", resource_group, name), deployment);
        self
    }

    /// Error message reported by every Azure validation.
    pub fn with_azure_validation_error(self, message: &str) -> Self {
        self.state.write().azure_validation_error = Some(message.to_string());
        self
    }

    /// Register a GCP deployment. Successive `get_deployment` calls walk
    /// through `snapshots` and keep returning the last one.
    pub fn with_gcp_deployment(self, project: &str, name: &str, snapshots: Vec<Value>) -> Self {
        self.state
            .write()
            .gcp_deployments
            .insert(format!("{}/{}", project, name), snapshots.into());
        self
    }

    pub fn with_gcp_manifest(
        self,
        project: &str,
        deployment: &str,
        manifest: &str,
        body: Value,
    ) -> Self {
        self.state
            .write()
            .gcp_manifests
            .insert(format!("{}/{}/{}", project, deployment, manifest), body);
        self
    }

    /// Make the next call to `method` fail with a provider error.
    pub fn fail_next(self, method: &str, message: &str) -> Self {
        self.queue_failure(method, None, message)
    }

    /// Like [`fail_next`](Self::fail_next), with a provider error code such
    /// as `ValidationError` or `NoSuchBucket`.
    pub fn fail_next_with(self, method: &str, code: &str, message: &str) -> Self {
        self.queue_failure(method, Some(code.to_string()), message)
    }

    fn queue_failure(self, method: &str, code: Option<String>, message: &str) -> Self {
        self.state
            .write()
            .failures
            .entry(method.to_string())
            .or_default()
            .push_back((code, message.to_string()));
        self
    }

    /// Clear all captured calls.
    pub fn clear_calls(&self) {
        self.state.write().calls.clear();
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.state.read().calls.clone()
    }

    /// Get calls to a specific method.
    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.state
            .read()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Number of calls to a specific method.
    pub fn call_count(&self, method: &str) -> usize {
        self.get_method_calls(method).len()
    }

    /// Check if a specific method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    /// Names of the called methods, in call order.
    pub fn method_names(&self) -> Vec<String> {
        self.state.read().calls.iter().map(|c| c.method.clone()).collect()
    }

    /// Record a call and pop a queued failure for it, if any.
    fn record(&self, method: &str, target: impl Into<String>, payload: Option<Value>) -> ProviderResult<()> {
        let mut state = self.state.write();
        state.calls.push(CapturedCall {
            method: method.to_string(),
            target: target.into(),
            payload,
        });
        match state.failures.get_mut(method).and_then(|q| q.pop_front()) {
            Some((code, message)) => Err(ProviderError::Api {
                service: "mock".to_string(),
                code,
                message,
            }),
            None => Ok(()),
        }
    }
}

impl CloudFormationApi for MockCloud {
    fn validate_template(&self, template_body: &str) -> ProviderResult<()> {
        self.record("validate_template", "", Some(Value::String(template_body.to_string())))
    }

    fn create_stack(&self, payload: &Value) -> ProviderResult<()> {
        let name = payload["StackName"].as_str().unwrap_or_default().to_string();
        self.record("create_stack", name, Some(payload.clone()))
    }

    fn update_stack(&self, payload: &Value) -> ProviderResult<()> {
        let name = payload["StackName"].as_str().unwrap_or_default().to_string();
        self.record("update_stack", name, Some(payload.clone()))
    }

    fn delete_stack(&self, stack_name: &str) -> ProviderResult<()> {
        self.record("delete_stack", stack_name, None)
    }

    fn wait(
        &self,
        waiter: CfnWaiter,
        stack_name: &str,
        change_set_name: Option<&str>,
    ) -> ProviderResult<()> {
        let payload = json!({"waiter": waiter.as_str(), "change_set": change_set_name});
        self.record("wait", stack_name, Some(payload))
    }

    fn describe_stack(&self, stack_name: &str) -> ProviderResult<Value> {
        self.record("describe_stack", stack_name, None)?;
        self.state
            .read()
            .stacks
            .get(stack_name)
            .cloned()
            .ok_or_else(|| {
                ProviderError::coded(
                    "cloudformation",
                    "ValidationError",
                    format!("Stack with id {} does not exist", stack_name),
                )
            })
    }

    fn describe_stack_resource(
        &self,
        stack_name: &str,
        logical_id: &str,
    ) -> ProviderResult<String> {
        self.record(
            "describe_stack_resource",
            stack_name,
            Some(Value::String(logical_id.to_string())),
        )?;
        Ok(self
            .state
            .read()
            .resources
            .get(&(stack_name.to_string(), logical_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn create_change_set(&self, payload: &Value) -> ProviderResult<()> {
        let name = payload["ChangeSetName"].as_str().unwrap_or_default().to_string();
        self.record("create_change_set", name, Some(payload.clone()))
    }

    fn describe_change_set(
        &self,
        stack_name: &str,
        change_set_name: &str,
    ) -> ProviderResult<Value> {
        self.record("describe_change_set", change_set_name, None)?;
        Ok(self.state.read().change_set.clone().unwrap_or_else(|| {
            json!({
                "ChangeSetName": change_set_name,
                "StackName": stack_name,
                "Status": "CREATE_COMPLETE",
                "Changes": [],
                "ResponseMetadata": {"HTTPStatusCode": 200}
            })
        }))
    }

    fn execute_change_set(&self, _stack_name: &str, change_set_name: &str) -> ProviderResult<()> {
        self.record("execute_change_set", change_set_name, None)
    }

    fn delete_change_set(&self, _stack_name: &str, change_set_name: &str) -> ProviderResult<()> {
        self.record("delete_change_set", change_set_name, None)
    }
}

impl AwsApi for MockCloud {
    fn call(
        &self,
        service: &str,
        action: &str,
        arguments: &Value,
        result_filter: Option<&str>,
    ) -> ProviderResult<Value> {
        let target = format!("{}.{}", service, action);
        let payload = json!({"arguments": arguments, "result_filter": result_filter});
        self.record("call", target.clone(), Some(payload))?;
        Ok(self
            .state
            .read()
            .call_results
            .get(&target)
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        extra_args: &[(String, String)],
    ) -> ProviderResult<String> {
        let target = format!("{}/{}", bucket, key);
        let extra: serde_json::Map<String, Value> = extra_args
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.record("get_object", target.clone(), Some(Value::Object(extra)))?;
        self.state
            .read()
            .objects
            .get(&target)
            .cloned()
            .ok_or_else(|| {
                ProviderError::coded("s3", "NoSuchKey", "The specified key does not exist.")
            })
    }
}

impl ResourceManagerApi for MockCloud {
    fn create_or_update_resource_group(
        &self,
        name: &str,
        parameters: &Value,
    ) -> ProviderResult<()> {
        self.record("create_or_update_resource_group", name, Some(parameters.clone()))
    }

    fn delete_resource_group(&self, name: &str) -> ProviderResult<()> {
        self.record("delete_resource_group", name, None)
    }

    fn create_or_update_deployment(
        &self,
        resource_group: &str,
        deployment: &str,
        properties: &Value,
        wait: bool,
    ) -> ProviderResult<()> {
        self.record(
            "create_or_update_deployment",
            format!("{}/{}", resource_group, deployment),
            Some(json!({"properties": properties, "wait": wait})),
        )
    }

    fn validate_deployment(
        &self,
        resource_group: &str,
        deployment: &str,
        properties: &Value,
    ) -> ProviderResult<Option<String>> {
        self.record(
            "validate_deployment",
            format!("{}/{}", resource_group, deployment),
            Some(properties.clone()),
        )?;
        Ok(self.state.read().azure_validation_error.clone())
    }

    fn delete_deployment(
        &self,
        resource_group: &str,
        deployment: &str,
        wait: bool,
    ) -> ProviderResult<()> {
        self.record(
            "delete_deployment",
            format!("{}/{}", resource_group, deployment),
            Some(json!({"wait": wait})),
        )
    }

    fn get_deployment(&self, resource_group: &str, deployment: &str) -> ProviderResult<Value> {
        let target = format!("{}/{}", resource_group, deployment);
        self.record("get_azure_deployment", target.clone(), None)?;
        self.state
            .read()
            .azure_deployments
            .get(&target)
            .cloned()
            .ok_or_else(|| {
                ProviderError::api(
                    "mock",
                    format!("Deployment '{}' could not be found.", deployment),
                )
            })
    }
}

impl DeploymentManagerApi for MockCloud {
    fn get_deployment(&self, project: &str, deployment: &str) -> ProviderResult<Option<Value>> {
        let target = format!("{}/{}", project, deployment);
        self.record("get_gcp_deployment", target.clone(), None)?;
        let mut state = self.state.write();
        let snapshot = state.gcp_deployments.get_mut(&target).and_then(|snapshots| {
            if snapshots.len() > 1 {
                snapshots.pop_front()
            } else {
                snapshots.front().cloned()
            }
        });
        Ok(snapshot)
    }

    fn get_manifest(
        &self,
        project: &str,
        deployment: &str,
        manifest: &str,
    ) -> ProviderResult<Value> {
        let target = format!("{}/{}/{}", project, deployment, manifest);
        self.record("get_manifest", target.clone(), None)?;
        Ok(self
            .state
            .read()
            .gcp_manifests
            .get(&target)
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn insert_deployment(&self, project: &str, body: &Value) -> ProviderResult<()> {
        self.record("insert_deployment", project, Some(body.clone()))
    }

    fn delete_deployment(&self, project: &str, deployment: &str) -> ProviderResult<()> {
        self.record(
            "delete_gcp_deployment",
            format!("{}/{}", project, deployment),
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_calls() {
        let cloud = MockCloud::new();
        let ctx = cloud.context();

        ctx.cloudformation.delete_stack("web").unwrap();
        ctx.cloudformation
            .wait(CfnWaiter::StackDeleteComplete, "web", None)
            .unwrap();

        assert_eq!(cloud.method_names(), ["delete_stack", "wait"]);
        let wait = &cloud.get_method_calls("wait")[0];
        assert_eq!(wait.target, "web");
        assert_eq!(
            wait.payload.as_ref().unwrap()["waiter"],
            "stack-delete-complete"
        );
    }

    #[test]
    fn test_mock_failure_queue() {
        let cloud = MockCloud::new().fail_next_with(
            "update_stack",
            "ValidationError",
            "Stack with id web does not exist",
        );
        let ctx = cloud.context();
        let payload = json!({"StackName": "web"});

        let err = ctx.cloudformation.update_stack(&payload).unwrap_err();
        assert!(err.is_missing_stack());
        assert!(ctx.cloudformation.update_stack(&payload).is_ok());
        assert_eq!(cloud.call_count("update_stack"), 2);
    }

    #[test]
    fn test_mock_describe_missing_stack() {
        let cloud = MockCloud::new().with_stack_outputs("net", &[("VpcId", "vpc-1")]);
        let ctx = cloud.context();

        let stack = ctx.cloudformation.describe_stack("net").unwrap();
        assert_eq!(stack["Outputs"][0]["OutputValue"], "vpc-1");

        let err = ctx.cloudformation.describe_stack("other").unwrap_err();
        assert!(err.is_missing_stack());
    }

    #[test]
    fn test_mock_gcp_snapshots() {
        let cloud = MockCloud::new().with_gcp_deployment(
            "proj",
            "dep",
            vec![
                json!({"operation": {"status": "RUNNING"}}),
                json!({"operation": {"status": "DONE"}}),
            ],
        );
        let ctx = cloud.context();

        let first = ctx.deployment_manager.get_deployment("proj", "dep").unwrap().unwrap();
        let second = ctx.deployment_manager.get_deployment("proj", "dep").unwrap().unwrap();
        let third = ctx.deployment_manager.get_deployment("proj", "dep").unwrap().unwrap();
        assert_eq!(first["operation"]["status"], "RUNNING");
        assert_eq!(second["operation"]["status"], "DONE");
        assert_eq!(third["operation"]["status"], "DONE");
        assert!(ctx.deployment_manager.get_deployment("proj", "none").unwrap().is_none());
    }
}
