//! GCP Deployment Manager client over the v2 REST API.
//!
//! Access tokens come from `GOOGLE_OAUTH_ACCESS_TOKEN` when set, otherwise
//! from `gcloud auth print-access-token`, and are fetched once per client.

use std::process::Command;

use parking_lot::Mutex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info};

use crate::api::DeploymentManagerApi;
use crate::error::{ProviderError, ProviderResult};

const SERVICE: &str = "deploymentmanager";
const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/deploymentmanager/v2";

/// Deployment Manager client options.
#[derive(Debug, Clone)]
pub struct DeploymentManagerOptions {
    /// Base URL of the Deployment Manager API.
    pub endpoint: String,
    /// Path or name of the `gcloud` binary used to mint tokens.
    pub gcloud_program: String,
    /// Fixed access token. When unset a token is requested from gcloud.
    pub access_token: Option<String>,
}

impl Default for DeploymentManagerOptions {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("CUMULUS_DM_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            gcloud_program: std::env::var("CUMULUS_GCLOUD_CLI")
                .unwrap_or_else(|_| "gcloud".to_string()),
            access_token: std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN").ok(),
        }
    }
}

impl DeploymentManagerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn gcloud_program(mut self, program: impl Into<String>) -> Self {
        self.gcloud_program = program.into();
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

/// Mint a token with the gcloud login of the current user.
fn print_access_token(program: &str) -> ProviderResult<String> {
    debug!("Requesting an access token from {}", program);
    let output = Command::new(program)
        .args(["auth", "print-access-token"])
        .output()
        .map_err(|source| ProviderError::Launch {
            program: program.to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(ProviderError::Credentials {
            service: SERVICE.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Deployment Manager REST client.
pub struct DeploymentManagerRest {
    options: DeploymentManagerOptions,
    http: Client,
    token: Mutex<Option<String>>,
}

impl DeploymentManagerRest {
    pub fn new(options: DeploymentManagerOptions) -> Self {
        let token = Mutex::new(options.access_token.clone());
        Self {
            options,
            http: Client::new(),
            token,
        }
    }

    fn deployments_url(&self, project: &str) -> String {
        format!(
            "{}/projects/{}/global/deployments",
            self.options.endpoint.trim_end_matches('/'),
            project
        )
    }

    fn access_token(&self) -> ProviderResult<String> {
        let mut token = self.token.lock();
        if let Some(token) = token.as_ref() {
            return Ok(token.clone());
        }
        let fresh = print_access_token(&self.options.gcloud_program)?;
        *token = Some(fresh.clone());
        Ok(fresh)
    }

    fn send(&self, request: RequestBuilder) -> ProviderResult<Response> {
        let response = request.bearer_auth(self.access_token()?).send()?;
        debug!("Deployment Manager responded {}", response.status());
        Ok(response)
    }

    /// Turn a non-success response into the provider error it carries.
    fn error_from(response: Response) -> ProviderError {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        let error = serde_json::from_str::<Value>(&body)
            .ok()
            .map(|v| v["error"].clone())
            .unwrap_or_default();
        let message = error["message"].as_str().map(String::from).unwrap_or(body);
        let message = format!("HTTP error {}: {}", status.as_u16(), message);
        match error["status"].as_str() {
            Some(code) => ProviderError::coded(SERVICE, code, message),
            None => ProviderError::api(SERVICE, message),
        }
    }

    fn json_or_error(response: Response) -> ProviderResult<Value> {
        if response.status().is_success() {
            Ok(response.json()?)
        } else {
            Err(Self::error_from(response))
        }
    }
}

impl DeploymentManagerApi for DeploymentManagerRest {
    fn get_deployment(&self, project: &str, deployment: &str) -> ProviderResult<Option<Value>> {
        let url = format!("{}/{}", self.deployments_url(project), deployment);
        let response = self.send(self.http.get(url))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::json_or_error(response).map(Some)
    }

    fn get_manifest(
        &self,
        project: &str,
        deployment: &str,
        manifest: &str,
    ) -> ProviderResult<Value> {
        let url = format!(
            "{}/{}/manifests/{}",
            self.deployments_url(project),
            deployment,
            manifest
        );
        Self::json_or_error(self.send(self.http.get(url))?)
    }

    fn insert_deployment(&self, project: &str, body: &Value) -> ProviderResult<()> {
        info!(
            "Inserting deployment {} into project {}",
            body["name"].as_str().unwrap_or_default(),
            project
        );
        let response = self.send(self.http.post(self.deployments_url(project)).json(body))?;
        Self::json_or_error(response)?;
        Ok(())
    }

    fn delete_deployment(&self, project: &str, deployment: &str) -> ProviderResult<()> {
        info!("Deleting deployment {} from project {}", deployment, project);
        let url = format!("{}/{}", self.deployments_url(project), deployment);
        Self::json_or_error(self.send(self.http.delete(url))?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployments_url() {
        let client = DeploymentManagerRest::new(
            DeploymentManagerOptions::new()
                .endpoint("https://dm.example.com/v2/")
                .access_token("token"),
        );
        assert_eq!(
            client.deployments_url("my-project"),
            "https://dm.example.com/v2/projects/my-project/global/deployments"
        );
    }

    #[test]
    fn test_missing_gcloud_is_a_launch_error() {
        let err = print_access_token("cumulus-missing-gcloud").unwrap_err();
        assert!(matches!(err, ProviderError::Launch { ref program, .. } if program == "cumulus-missing-gcloud"));
    }

    #[test]
    fn test_preset_token_skips_gcloud() {
        let client = DeploymentManagerRest::new(
            DeploymentManagerOptions::new()
                .gcloud_program("cumulus-missing-gcloud")
                .access_token("abc"),
        );
        assert_eq!(client.access_token().unwrap(), "abc");
    }
}
