//! Cross-stack reference resolution.
//!
//! A [`ReferenceResolver`] answers lookups against the provider APIs and
//! caches describe responses for the lifetime of one run. Lookups that find
//! nothing resolve to an empty string.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use cumulus_providers::ProviderContext;

use crate::error::TemplateResult;

/// A resolvable reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// CloudFormation stack output.
    StackOutput { stack: String, output: String },
    /// Physical id of a CloudFormation logical resource.
    StackResource { stack: String, logical_id: String },
    /// SSM parameter store value.
    Parameter { name: String, with_decryption: bool },
    /// Arbitrary AWS API call, optionally filtered with a JMESPath expression.
    ApiCall {
        service: String,
        action: String,
        arguments: Value,
        result_filter: Option<String>,
    },
    /// ARM deployment output.
    AzureOutput {
        resource_group: String,
        deployment: String,
        output: String,
    },
    /// Deployment Manager output.
    GcpOutput {
        project: String,
        deployment: String,
        output: String,
    },
}

/// Provider namespace of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CacheScope {
    Aws,
    Azure,
    Gcp,
}

/// Resolves references with per-run caching.
pub struct ReferenceResolver {
    providers: ProviderContext,
    deployments: Mutex<HashMap<(CacheScope, String), Value>>,
    resources: Mutex<HashMap<(String, String), String>>,
}

impl ReferenceResolver {
    /// Create a resolver with empty caches.
    pub fn new(providers: ProviderContext) -> Self {
        Self {
            providers,
            deployments: Mutex::new(HashMap::new()),
            resources: Mutex::new(HashMap::new()),
        }
    }

    pub fn providers(&self) -> &ProviderContext {
        &self.providers
    }

    /// Resolve a reference. Output and parameter lookups yield strings,
    /// API calls yield the (filtered) response as is.
    pub fn resolve(&self, reference: &Reference) -> TemplateResult<Value> {
        match reference {
            Reference::StackOutput { stack, output } => {
                self.stack_output(stack, output).map(Value::String)
            }
            Reference::StackResource { stack, logical_id } => {
                self.stack_resource(stack, logical_id).map(Value::String)
            }
            Reference::Parameter {
                name,
                with_decryption,
            } => self.parameter(name, *with_decryption).map(Value::String),
            Reference::ApiCall {
                service,
                action,
                arguments,
                result_filter,
            } => self.call(service, action, arguments, result_filter.as_deref()),
            Reference::AzureOutput {
                resource_group,
                deployment,
                output,
            } => self
                .azure_output(resource_group, deployment, output)
                .map(Value::String),
            Reference::GcpOutput {
                project,
                deployment,
                output,
            } => self.gcp_output(project, deployment, output).map(Value::String),
        }
    }

    /// Look up a cache entry, filling it with `fetch` on a miss.
    fn cached<F>(&self, scope: CacheScope, name: &str, fetch: F) -> TemplateResult<Value>
    where
        F: FnOnce() -> TemplateResult<Value>,
    {
        let key = (scope, name.to_string());
        if let Some(hit) = self.deployments.lock().get(&key) {
            return Ok(hit.clone());
        }
        debug!("Reference cache miss for {:?} {}", scope, name);
        let value = fetch()?;
        self.deployments.lock().insert(key, value.clone());
        Ok(value)
    }

    /// Value of a CloudFormation stack output.
    pub fn stack_output(&self, stack: &str, output: &str) -> TemplateResult<String> {
        let description = self.cached(CacheScope::Aws, stack, || {
            Ok(self.providers.cloudformation.describe_stack(stack)?)
        })?;

        let found = description["Outputs"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|o| o["OutputKey"].as_str() == Some(output))
            .map(|o| scalar_to_string(&o["OutputValue"]));
        Ok(found.unwrap_or_default())
    }

    /// Physical id of a CloudFormation logical resource.
    pub fn stack_resource(&self, stack: &str, logical_id: &str) -> TemplateResult<String> {
        let key = (stack.to_string(), logical_id.to_string());
        if let Some(hit) = self.resources.lock().get(&key) {
            return Ok(hit.clone());
        }
        let physical_id = self
            .providers
            .cloudformation
            .describe_stack_resource(stack, logical_id)?;
        self.resources.lock().insert(key, physical_id.clone());
        Ok(physical_id)
    }

    /// Value of an SSM parameter. Never cached.
    pub fn parameter(&self, name: &str, with_decryption: bool) -> TemplateResult<String> {
        let arguments = serde_json::json!({ "Name": name, "WithDecryption": with_decryption });
        let response = self
            .providers
            .aws
            .call("ssm", "get_parameter", &arguments, None)?;
        Ok(scalar_to_string(&response["Parameter"]["Value"]))
    }

    /// Generic AWS API call. Never cached.
    pub fn call(
        &self,
        service: &str,
        action: &str,
        arguments: &Value,
        result_filter: Option<&str>,
    ) -> TemplateResult<Value> {
        debug!("Calling {}.{}", service, action);
        Ok(self
            .providers
            .aws
            .call(service, action, arguments, result_filter)?)
    }

    /// Value of an ARM deployment output.
    pub fn azure_output(
        &self,
        resource_group: &str,
        deployment: &str,
        output: &str,
    ) -> TemplateResult<String> {
        let name = format!("{}/{}", resource_group, deployment);
        let description = self.cached(CacheScope::Azure, &name, || {
            Ok(self
                .providers
                .resource_manager
                .get_deployment(resource_group, deployment)?)
        })?;

        Ok(description["properties"]["outputs"]
            .get(output)
            .map(|o| scalar_to_string(&o["value"]))
            .unwrap_or_default())
    }

    /// Value of a Deployment Manager output, read from the deployment's
    /// manifest layout.
    pub fn gcp_output(&self, project: &str, deployment: &str, output: &str) -> TemplateResult<String> {
        let name = format!("{}/{}", project, deployment);
        let cached = self.cached(CacheScope::Gcp, &name, || {
            let dm = &self.providers.deployment_manager;
            let Some(current) = dm.get_deployment(project, deployment)? else {
                return Ok(Value::Null);
            };
            let manifest = match current["manifest"].as_str() {
                Some(url) => {
                    let manifest_name = url.rsplit('/').next().unwrap_or(url);
                    dm.get_manifest(project, deployment, manifest_name)?
                }
                None => Value::Null,
            };
            Ok(serde_json::json!({ "deployment": current, "manifest": manifest }))
        })?;

        let Some(layout) = cached["manifest"]["layout"].as_str() else {
            return Ok(String::new());
        };
        let layout: Value = serde_yaml::from_str(layout)?;
        let found = layout["outputs"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|o| o["name"].as_str() == Some(output))
            .map(|o| scalar_to_string(&o["finalValue"]));
        Ok(found.unwrap_or_default())
    }
}

impl std::fmt::Debug for ReferenceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceResolver")
            .field("cached_deployments", &self.deployments.lock().len())
            .field("cached_resources", &self.resources.lock().len())
            .finish()
    }
}

/// Render a JSON scalar the way it should appear in a document.
pub(crate) fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
