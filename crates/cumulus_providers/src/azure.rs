//! Azure Resource Manager client over the REST API.
//!
//! Tokens come from the `azure_identity` developer tool credential (Azure
//! CLI or Azure Developer CLI login) and are fetched once per client.
//! Long-running deletes are followed through their `Location` header;
//! deployments are polled until they reach a terminal provisioning state.

use std::thread;
use std::time::Duration;

use azure_core::credentials::TokenCredential;
use azure_identity::DeveloperToolsCredential;
use parking_lot::Mutex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::LOCATION;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::api::ResourceManagerApi;
use crate::error::{ProviderError, ProviderResult};

const SERVICE: &str = "resourcemanager";
const DEFAULT_ENDPOINT: &str = "https://management.azure.com";
const API_VERSION: &str = "2021-04-01";
const SCOPE: &str = "https://management.azure.com/.default";

/// Error codes the validate endpoint answers with when the template itself
/// failed validation.
const VALIDATION_CODES: [&str; 3] = ["InvalidTemplate", "InvalidTemplateDeployment", "DeploymentFailed"];

/// Resource Manager client options.
#[derive(Debug, Clone)]
pub struct ResourceManagerOptions {
    /// Base URL of the Resource Manager API.
    pub endpoint: String,
    /// Subscription all resource groups live in.
    pub subscription: Option<String>,
    /// Fixed access token. When unset a token is requested from the
    /// developer tool credential.
    pub access_token: Option<String>,
    /// Delay between polls of a long-running operation.
    pub poll_interval: Duration,
    /// Polls before a long-running operation is given up on.
    pub max_polls: u32,
}

impl Default for ResourceManagerOptions {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("CUMULUS_ARM_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            subscription: std::env::var("AZURE_SUBSCRIPTION_ID").ok(),
            access_token: None,
            poll_interval: Duration::from_secs(10),
            max_polls: 360,
        }
    }
}

impl ResourceManagerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription = Some(subscription.into());
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn poll(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }
}

/// Resource Manager REST client.
pub struct ResourceManagerRest {
    options: ResourceManagerOptions,
    http: Client,
    token: Mutex<Option<String>>,
}

/// The `error` object of an ARM response.
fn arm_error(body: &Value) -> Option<(String, String)> {
    let error = body.get("error")?;
    let code = error["code"].as_str().unwrap_or_default().to_string();
    let mut message = error["message"].as_str().unwrap_or_default().to_string();
    if let Some(details) = error["details"].as_array() {
        for detail in details {
            if let Some(text) = detail["message"].as_str() {
                message.push('\n');
                message.push_str(text);
            }
        }
    }
    Some((code, message))
}

/// Message of a template that failed validation, `None` for any other error.
fn validation_failure(status: StatusCode, body: &Value) -> Option<String> {
    let (code, message) = arm_error(body)?;
    let is_validation = status.is_success()
        || (status == StatusCode::BAD_REQUEST && VALIDATION_CODES.contains(&code.as_str()));
    is_validation.then_some(message)
}

fn credentials_error(err: azure_core::Error) -> ProviderError {
    ProviderError::Credentials {
        service: SERVICE.to_string(),
        message: err.to_string(),
    }
}

/// Ask the developer tool credential for a management token.
fn developer_token() -> ProviderResult<String> {
    let credential = DeveloperToolsCredential::new(None).map_err(credentials_error)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let token = runtime
        .block_on(credential.get_token(&[SCOPE], None))
        .map_err(credentials_error)?;
    Ok(token.token.secret().to_string())
}

impl ResourceManagerRest {
    pub fn new(options: ResourceManagerOptions) -> Self {
        let token = Mutex::new(options.access_token.clone());
        Self {
            options,
            http: Client::new(),
            token,
        }
    }

    fn group_url(&self, resource_group: &str) -> ProviderResult<String> {
        let subscription = self.options.subscription.as_deref().ok_or_else(|| {
            ProviderError::MissingConfig("AZURE_SUBSCRIPTION_ID is not set".to_string())
        })?;
        Ok(format!(
            "{}/subscriptions/{}/resourcegroups/{}",
            self.options.endpoint.trim_end_matches('/'),
            subscription,
            resource_group
        ))
    }

    fn deployment_url(&self, resource_group: &str, deployment: &str) -> ProviderResult<String> {
        Ok(format!(
            "{}/providers/Microsoft.Resources/deployments/{}",
            self.group_url(resource_group)?,
            deployment
        ))
    }

    fn access_token(&self) -> ProviderResult<String> {
        let mut token = self.token.lock();
        if let Some(token) = token.as_ref() {
            return Ok(token.clone());
        }
        let fresh = developer_token()?;
        *token = Some(fresh.clone());
        Ok(fresh)
    }

    fn send(&self, request: RequestBuilder) -> ProviderResult<Response> {
        let response = request.bearer_auth(self.access_token()?).send()?;
        debug!("Resource Manager responded {}", response.status());
        Ok(response)
    }

    fn api(&self, request: RequestBuilder) -> ProviderResult<Response> {
        self.send(request.query(&[("api-version", API_VERSION)]))
    }

    /// Status and JSON body of a response. An empty body reads as null.
    fn read(response: Response) -> ProviderResult<(StatusCode, Value)> {
        let status = response.status();
        let text = response.text()?;
        if text.trim().is_empty() {
            return Ok((status, Value::Null));
        }
        let body = serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text));
        Ok((status, body))
    }

    /// Turn a non-success response into the provider error it carries.
    fn error_from(status: StatusCode, body: &Value) -> ProviderError {
        match arm_error(body) {
            Some((code, message)) => ProviderError::coded(SERVICE, code, message),
            None => {
                let text = match body {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                ProviderError::api(SERVICE, format!("HTTP error {}: {}", status.as_u16(), text))
            }
        }
    }

    fn json_or_error(response: Response) -> ProviderResult<Value> {
        let (status, body) = Self::read(response)?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(Self::error_from(status, &body))
        }
    }

    /// Follow a long-running operation until its `Location` stops answering 202.
    fn wait_for_operation(&self, response: Response) -> ProviderResult<()> {
        let mut response = response;
        for _ in 0..self.options.max_polls {
            if !response.status().is_success() {
                let (status, body) = Self::read(response)?;
                return Err(Self::error_from(status, &body));
            }
            if response.status() != StatusCode::ACCEPTED {
                return Ok(());
            }
            let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(String::from)
            else {
                debug!("Accepted operation has no Location header, not following it");
                return Ok(());
            };
            thread::sleep(self.options.poll_interval);
            response = self.send(self.http.get(location))?;
        }
        Err(ProviderError::Waiter {
            waiter: "resource-manager-operation".to_string(),
            message: format!("still running after {} polls", self.options.max_polls),
        })
    }

    /// Poll a deployment until it succeeds, fails or is canceled.
    fn wait_for_deployment(
        &self,
        resource_group: &str,
        deployment: &str,
        mut current: Value,
    ) -> ProviderResult<()> {
        for _ in 0..self.options.max_polls {
            let state = current["properties"]["provisioningState"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            match state.as_str() {
                "Succeeded" => return Ok(()),
                "Failed" | "Canceled" => {
                    let message = arm_error(&current["properties"])
                        .map(|(_, message)| message)
                        .unwrap_or_else(|| format!("Deployment {} is {}", deployment, state));
                    return Err(ProviderError::coded(SERVICE, "DeploymentFailed", message));
                }
                _ => {
                    debug!("Deployment {} is {}", deployment, state);
                    thread::sleep(self.options.poll_interval);
                    current = self.get_deployment(resource_group, deployment)?;
                }
            }
        }
        Err(ProviderError::Waiter {
            waiter: "deployment-succeeded".to_string(),
            message: format!("{} still running after {} polls", deployment, self.options.max_polls),
        })
    }
}

impl ResourceManagerApi for ResourceManagerRest {
    fn create_or_update_resource_group(
        &self,
        name: &str,
        parameters: &Value,
    ) -> ProviderResult<()> {
        let location = parameters["location"].as_str().unwrap_or_default();
        let tags: Map<String, Value> = parameters["tags"]
            .as_object()
            .map(|tags| {
                tags.iter()
                    .map(|(key, value)| {
                        let value = match value {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (key.clone(), Value::String(value))
                    })
                    .collect()
            })
            .unwrap_or_default();

        debug!("Ensuring resource group {} in {}", name, location);
        let body = json!({ "location": location, "tags": tags });
        Self::json_or_error(self.api(self.http.put(self.group_url(name)?).json(&body))?)?;
        Ok(())
    }

    fn delete_resource_group(&self, name: &str) -> ProviderResult<()> {
        info!("Deleting resource group: {}", name);
        let response = self.api(self.http.delete(self.group_url(name)?))?;
        self.wait_for_operation(response)
    }

    fn create_or_update_deployment(
        &self,
        resource_group: &str,
        deployment: &str,
        properties: &Value,
        wait: bool,
    ) -> ProviderResult<()> {
        info!("Deploying {} into {}", deployment, resource_group);
        let url = self.deployment_url(resource_group, deployment)?;
        let body = json!({ "properties": properties });
        let current = Self::json_or_error(self.api(self.http.put(url).json(&body))?)?;
        if wait {
            self.wait_for_deployment(resource_group, deployment, current)?;
        }
        Ok(())
    }

    fn validate_deployment(
        &self,
        resource_group: &str,
        deployment: &str,
        properties: &Value,
    ) -> ProviderResult<Option<String>> {
        let url = format!("{}/validate", self.deployment_url(resource_group, deployment)?);
        let body = json!({ "properties": properties });
        let (status, body) = Self::read(self.api(self.http.post(url).json(&body))?)?;

        if let Some(message) = validation_failure(status, &body) {
            return Ok(Some(message));
        }
        if status.is_success() {
            Ok(None)
        } else {
            Err(Self::error_from(status, &body))
        }
    }

    fn delete_deployment(
        &self,
        resource_group: &str,
        deployment: &str,
        wait: bool,
    ) -> ProviderResult<()> {
        info!("Deleting deployment {} from {}", deployment, resource_group);
        let url = self.deployment_url(resource_group, deployment)?;
        let response = self.api(self.http.delete(url))?;
        if wait {
            self.wait_for_operation(response)
        } else {
            Self::json_or_error(response).map(|_| ())
        }
    }

    fn get_deployment(&self, resource_group: &str, deployment: &str) -> ProviderResult<Value> {
        let url = self.deployment_url(resource_group, deployment)?;
        Self::json_or_error(self.api(self.http.get(url))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_url() {
        let client = ResourceManagerRest::new(
            ResourceManagerOptions::new()
                .endpoint("https://arm.example.com/")
                .subscription("sub-1")
                .access_token("token"),
        );
        assert_eq!(
            client.deployment_url("rg", "web").unwrap(),
            "https://arm.example.com/subscriptions/sub-1/resourcegroups/rg/providers/Microsoft.Resources/deployments/web"
        );
    }

    #[test]
    fn test_missing_subscription() {
        let mut options = ResourceManagerOptions::new().access_token("token");
        options.subscription = None;
        let err = ResourceManagerRest::new(options).group_url("rg").unwrap_err();
        assert!(matches!(err, ProviderError::MissingConfig(_)));
    }

    #[test]
    fn test_validation_failure_classification() {
        let invalid = json!({"error": {
            "code": "InvalidTemplate",
            "message": "Deployment template validation failed",
            "details": [{"code": "x", "message": "Resource 'vm' is not defined"}]
        }});
        assert_eq!(
            validation_failure(StatusCode::BAD_REQUEST, &invalid).as_deref(),
            Some("Deployment template validation failed\nResource 'vm' is not defined")
        );

        let auth = json!({"error": {"code": "AuthenticationFailed", "message": "expired"}});
        assert!(validation_failure(StatusCode::UNAUTHORIZED, &auth).is_none());
        assert!(validation_failure(StatusCode::BAD_REQUEST, &auth).is_none());

        let legacy = json!({"error": {"code": "InvalidTemplateDeployment", "message": "bad"}});
        assert_eq!(validation_failure(StatusCode::OK, &legacy).as_deref(), Some("bad"));
        assert!(validation_failure(StatusCode::OK, &json!({"properties": {}})).is_none());
    }
}
