//! CloudFormation request payloads.
//!
//! Stacks hand over JSON payloads with CloudFormation field names. They are
//! decoded here once and applied to the SDK builders, so an unknown field is
//! rejected instead of being dropped.

use aws_sdk_cloudformation::types::{Capability, ChangeSetType, OnFailure, Parameter, Tag};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ProviderError, ProviderResult};

use super::SERVICE;

/// Decode the arguments of `operation`. A null payload reads as `{}`.
pub(crate) fn decode<T: DeserializeOwned>(
    service: &str,
    operation: &str,
    payload: &Value,
) -> ProviderResult<T> {
    let payload = match payload {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(payload)
        .map_err(|e| ProviderError::invalid_request(service, format!("{}: {}", operation, e)))
}

/// Scalar payload value as the string the API expects.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub(crate) struct ParameterEntry {
    parameter_key: String,
    #[serde(default)]
    parameter_value: Value,
    use_previous_value: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub(crate) struct TagEntry {
    key: String,
    value: Value,
}

/// Union of the CreateStack, UpdateStack and CreateChangeSet arguments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub(crate) struct StackRequest {
    pub stack_name: String,
    pub template_body: Option<String>,
    #[serde(rename = "TemplateURL")]
    pub template_url: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterEntry>,
    #[serde(default)]
    pub tags: Vec<TagEntry>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub resource_types: Vec<String>,
    #[serde(rename = "NotificationARNs", default)]
    pub notification_arns: Vec<String>,
    #[serde(rename = "RoleARN")]
    pub role_arn: Option<String>,
    pub stack_policy_body: Option<String>,
    #[serde(rename = "StackPolicyURL")]
    pub stack_policy_url: Option<String>,
    pub on_failure: Option<String>,
    pub timeout_in_minutes: Option<i32>,
    pub disable_rollback: Option<bool>,
    pub enable_termination_protection: Option<bool>,
    pub client_request_token: Option<String>,
    pub change_set_name: Option<String>,
    pub change_set_type: Option<String>,
    pub description: Option<String>,
}

impl StackRequest {
    pub fn decode(operation: &str, payload: &Value) -> ProviderResult<Self> {
        decode(SERVICE, operation, payload)
    }

    fn is_set(&self, field: &str) -> bool {
        match field {
            "StackPolicyBody" => self.stack_policy_body.is_some(),
            "StackPolicyURL" => self.stack_policy_url.is_some(),
            "OnFailure" => self.on_failure.is_some(),
            "TimeoutInMinutes" => self.timeout_in_minutes.is_some(),
            "DisableRollback" => self.disable_rollback.is_some(),
            "EnableTerminationProtection" => self.enable_termination_protection.is_some(),
            "ClientRequestToken" => self.client_request_token.is_some(),
            "ChangeSetName" => self.change_set_name.is_some(),
            "ChangeSetType" => self.change_set_type.is_some(),
            "Description" => self.description.is_some(),
            _ => false,
        }
    }

    /// Fail when a field `operation` does not take is set.
    pub fn reject(&self, operation: &str, fields: &[&str]) -> ProviderResult<()> {
        match fields.iter().find(|field| self.is_set(field)) {
            Some(field) => Err(ProviderError::invalid_request(
                SERVICE,
                format!("{} does not accept {}", operation, field),
            )),
            None => Ok(()),
        }
    }

    pub fn parameters(&self) -> Option<Vec<Parameter>> {
        let parameters = self
            .parameters
            .iter()
            .map(|entry| {
                Parameter::builder()
                    .parameter_key(&entry.parameter_key)
                    .set_parameter_value(scalar(&entry.parameter_value))
                    .set_use_previous_value(entry.use_previous_value)
                    .build()
            })
            .collect();
        non_empty(parameters)
    }

    pub fn tags(&self) -> ProviderResult<Option<Vec<Tag>>> {
        let tags = self
            .tags
            .iter()
            .map(|entry| {
                // `Tag::build()` is infallible in the resolved SDK version.
                Ok(Tag::builder()
                    .key(&entry.key)
                    .value(scalar(&entry.value).unwrap_or_default())
                    .build())
            })
            .collect::<ProviderResult<Vec<_>>>()?;
        Ok(non_empty(tags))
    }

    pub fn capabilities(&self) -> Option<Vec<Capability>> {
        non_empty(
            self.capabilities
                .iter()
                .map(|c| Capability::from(c.as_str()))
                .collect(),
        )
    }

    pub fn resource_types(&self) -> Option<Vec<String>> {
        non_empty(self.resource_types.clone())
    }

    pub fn notification_arns(&self) -> Option<Vec<String>> {
        non_empty(self.notification_arns.clone())
    }

    pub fn on_failure(&self) -> Option<OnFailure> {
        self.on_failure.as_deref().map(OnFailure::from)
    }

    pub fn change_set_type(&self) -> Option<ChangeSetType> {
        self.change_set_type.as_deref().map(ChangeSetType::from)
    }
}

/// `StackName` plus an optional name filter, as taken by DescribeStacks.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub(crate) struct DescribeStacksArgs {
    pub stack_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub(crate) struct StackResourceArgs {
    pub stack_name: String,
    pub logical_resource_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub(crate) struct ListExportsArgs {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub(crate) struct GetParameterArgs {
    pub name: String,
    #[serde(default)]
    pub with_decryption: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub(crate) struct GetParametersArgs {
    pub names: Vec<String>,
    #[serde(default)]
    pub with_decryption: bool,
}
