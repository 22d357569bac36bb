//! SDK responses as JSON with the API's own field names.

use aws_sdk_cloudformation::operation::describe_change_set::DescribeChangeSetOutput;
use aws_sdk_cloudformation::primitives::{DateTime, DateTimeFormat};
use aws_sdk_cloudformation::types::{Change, Export, Output, Parameter, Stack, StackResourceDetail, Tag};
use serde_json::{json, Value};

/// SDK enum values, required or optional, as their wire names.
trait WireName {
    fn wire_name(&self) -> Option<String>;
}

impl<T: AsRef<str>> WireName for &T {
    fn wire_name(&self) -> Option<String> {
        Some(AsRef::<str>::as_ref(*self).to_string())
    }
}

impl<T: AsRef<str>> WireName for Option<&T> {
    fn wire_name(&self) -> Option<String> {
        self.map(|value| AsRef::<str>::as_ref(value).to_string())
    }
}

/// SDK timestamps as ISO 8601.
trait Timestamp {
    fn iso8601(&self) -> Option<String>;
}

impl Timestamp for &DateTime {
    fn iso8601(&self) -> Option<String> {
        DateTime::fmt(self, DateTimeFormat::DateTime).ok()
    }
}

impl Timestamp for Option<&DateTime> {
    fn iso8601(&self) -> Option<String> {
        self.and_then(|time| DateTime::fmt(time, DateTimeFormat::DateTime).ok())
    }
}

/// Drop null members so absent fields stay absent.
fn compact(mut value: Value) -> Value {
    if let Some(fields) = value.as_object_mut() {
        fields.retain(|_, v| !v.is_null());
    }
    value
}

fn parameters_json(parameters: &[Parameter]) -> Value {
    parameters
        .iter()
        .map(|p| {
            compact(json!({
                "ParameterKey": p.parameter_key(),
                "ParameterValue": p.parameter_value(),
            }))
        })
        .collect()
}

fn outputs_json(outputs: &[Output]) -> Value {
    outputs
        .iter()
        .map(|o| {
            compact(json!({
                "OutputKey": o.output_key(),
                "OutputValue": o.output_value(),
                "Description": o.description(),
                "ExportName": o.export_name(),
            }))
        })
        .collect()
}

fn tags_json(tags: &[Tag]) -> Value {
    tags.iter()
        .map(|t| json!({"Key": t.key(), "Value": t.value()}))
        .collect()
}

/// One element of DescribeStacks.
pub(crate) fn stack_json(stack: &Stack) -> Value {
    compact(json!({
        "StackId": stack.stack_id(),
        "StackName": stack.stack_name(),
        "Description": stack.description(),
        "StackStatus": stack.stack_status().wire_name(),
        "StackStatusReason": stack.stack_status_reason(),
        "CreationTime": stack.creation_time().iso8601(),
        "LastUpdatedTime": stack.last_updated_time().iso8601(),
        "Parameters": parameters_json(stack.parameters()),
        "Outputs": outputs_json(stack.outputs()),
        "Tags": tags_json(stack.tags()),
        "Capabilities": stack.capabilities().iter().map(|c| c.as_str()).collect::<Vec<_>>(),
    }))
}

pub(crate) fn stack_resource_json(detail: &StackResourceDetail) -> Value {
    compact(json!({
        "StackName": detail.stack_name(),
        "StackId": detail.stack_id(),
        "LogicalResourceId": detail.logical_resource_id(),
        "PhysicalResourceId": detail.physical_resource_id(),
        "ResourceType": detail.resource_type(),
        "ResourceStatus": detail.resource_status().wire_name(),
        "LastUpdatedTimestamp": detail.last_updated_timestamp().iso8601(),
    }))
}

pub(crate) fn export_json(export: &Export) -> Value {
    compact(json!({
        "ExportingStackId": export.exporting_stack_id(),
        "Name": export.name(),
        "Value": export.value(),
    }))
}

fn change_json(change: &Change) -> Value {
    let resource = change.resource_change().map(|r| {
        compact(json!({
            "Action": r.action().wire_name(),
            "LogicalResourceId": r.logical_resource_id(),
            "PhysicalResourceId": r.physical_resource_id(),
            "ResourceType": r.resource_type(),
            "Replacement": r.replacement().wire_name(),
            "Scope": r.scope().iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        }))
    });
    compact(json!({
        "Type": change.r#type().wire_name(),
        "ResourceChange": resource,
    }))
}

/// DescribeChangeSet output, the document shown to the operator for review.
pub(crate) fn change_set_json(output: &DescribeChangeSetOutput) -> Value {
    compact(json!({
        "ChangeSetName": output.change_set_name(),
        "ChangeSetId": output.change_set_id(),
        "StackId": output.stack_id(),
        "StackName": output.stack_name(),
        "Description": output.description(),
        "CreationTime": output.creation_time().iso8601(),
        "ExecutionStatus": output.execution_status().wire_name(),
        "Status": output.status().wire_name(),
        "StatusReason": output.status_reason(),
        "Parameters": parameters_json(output.parameters()),
        "Capabilities": output.capabilities().iter().map(|c| c.as_str()).collect::<Vec<_>>(),
        "Changes": output.changes().iter().map(change_json).collect::<Vec<_>>(),
    }))
}

/// One SSM parameter as returned by GetParameter.
pub(crate) fn ssm_parameter_json(parameter: &aws_sdk_ssm::types::Parameter) -> Value {
    compact(json!({
        "Name": parameter.name(),
        "Type": parameter.r#type().wire_name(),
        "Value": parameter.value(),
        "Version": parameter.version(),
        "ARN": parameter.arn(),
        "DataType": parameter.data_type(),
        "LastModifiedDate": parameter.last_modified_date().iso8601(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_cloudformation::types::StackStatus;

    #[test]
    fn test_stack_json_keeps_api_names() {
        let stack = Stack::builder()
            .stack_name("web")
            .stack_status(StackStatus::CreateComplete)
            .creation_time(DateTime::from_secs(0))
            .outputs(Output::builder().output_key("Url").output_value("https://web").build())
            .build();

        let json = stack_json(&stack);
        assert_eq!(json["StackName"], "web");
        assert_eq!(json["StackStatus"], "CREATE_COMPLETE");
        assert_eq!(json["CreationTime"], "1970-01-01T00:00:00Z");
        assert_eq!(json["Outputs"][0], json!({"OutputKey": "Url", "OutputValue": "https://web"}));
        assert!(json.get("StackId").is_none());
        assert!(json.get("LastUpdatedTime").is_none());
    }

    #[test]
    fn test_compact_only_drops_nulls() {
        let value = compact(json!({"a": null, "b": [], "c": ""}));
        assert_eq!(value, json!({"b": [], "c": ""}));
    }
}
