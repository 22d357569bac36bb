//! AWS client tests against a stub endpoint.
//!
//! The SDK is pointed at a local mockito server with static credentials, so
//! every test exercises real request encoding and response decoding.

use std::time::Duration;

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;

use cumulus_providers::{AwsApi, AwsClient, AwsOptions, CfnWaiter, CloudFormationApi, ProviderError};

const CFN_NS: &str = "http://cloudformation.amazonaws.com/doc/2010-05-15/";

fn client(server: &ServerGuard) -> AwsClient {
    AwsClient::new(
        AwsOptions::new()
            .region("us-east-1")
            .static_credentials("AKIDEXAMPLE", "secret")
            .endpoint_url(server.url())
            .poll(Duration::from_millis(1), 3),
    )
    .unwrap()
}

/// Wrap a CloudFormation result in its query protocol envelope.
fn cfn_response(action: &str, result: &str) -> String {
    format!(
        r#"<{action}Response xmlns="{CFN_NS}">
  <{action}Result>{result}</{action}Result>
  <ResponseMetadata><RequestId>b9b4a8e0</RequestId></ResponseMetadata>
</{action}Response>"#
    )
}

fn cfn_error(code: &str, message: &str) -> String {
    format!(
        r#"<ErrorResponse xmlns="{CFN_NS}">
  <Error><Type>Sender</Type><Code>{code}</Code><Message>{message}</Message></Error>
  <RequestId>b9b4a8e1</RequestId>
</ErrorResponse>"#
    )
}

fn cfn_action(action: &str) -> Matcher {
    Matcher::Regex(format!("Action={}&", action))
}

const WEB_STACK: &str = r#"<Stacks><member>
  <StackName>web</StackName>
  <StackId>arn:aws:cloudformation:us-east-1:123456789012:stack/web/1</StackId>
  <CreationTime>2024-03-01T12:00:00Z</CreationTime>
  <StackStatus>CREATE_COMPLETE</StackStatus>
  <Parameters><member><ParameterKey>Size</ParameterKey><ParameterValue>3</ParameterValue></member></Parameters>
  <Outputs>
    <member><OutputKey>Url</OutputKey><OutputValue>https://web.example.com</OutputValue></member>
    <member><OutputKey>BucketName</OutputKey><OutputValue>web-assets</OutputValue><ExportName>web-bucket</ExportName></member>
  </Outputs>
  <Tags><member><Key>build_id</Key><Value>42</Value></member></Tags>
</member></Stacks>"#;

/// Test that DescribeStacks outputs decode with their API field names.
#[test]
fn test_describe_stack_outputs() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::AllOf(vec![cfn_action("DescribeStacks"), Matcher::Regex("StackName=web".into())]))
        .with_status(200)
        .with_header("content-type", "text/xml")
        .with_body(cfn_response("DescribeStacks", WEB_STACK))
        .create();

    let stack = client(&server).describe_stack("web").unwrap();

    assert_eq!(stack["StackName"], "web");
    assert_eq!(stack["StackStatus"], "CREATE_COMPLETE");
    assert_eq!(stack["CreationTime"], "2024-03-01T12:00:00Z");
    assert_eq!(
        stack["Outputs"],
        json!([
            {"OutputKey": "Url", "OutputValue": "https://web.example.com"},
            {"OutputKey": "BucketName", "OutputValue": "web-assets", "ExportName": "web-bucket"}
        ])
    );
    assert_eq!(stack["Parameters"][0]["ParameterValue"], "3");
    assert_eq!(stack["Tags"][0], json!({"Key": "build_id", "Value": "42"}));
    mock.assert();
}

/// Test that a missing stack keeps the CloudFormation error code.
#[test]
fn test_describe_missing_stack() {
    let mut server = Server::new();
    server
        .mock("POST", "/")
        .match_body(cfn_action("DescribeStacks"))
        .with_status(400)
        .with_header("content-type", "text/xml")
        .with_body(cfn_error("ValidationError", "Stack with id web does not exist"))
        .create();

    let err = client(&server).describe_stack("web").unwrap_err();

    assert!(err.is_missing_stack());
    assert_eq!(err.code(), Some("ValidationError"));
    assert_eq!(err.to_string(), "Stack with id web does not exist");
}

/// Test that update errors are told apart by code and message.
#[test]
fn test_update_stack_errors() {
    let mut server = Server::new();
    server
        .mock("POST", "/")
        .match_body(Matcher::AllOf(vec![cfn_action("UpdateStack"), Matcher::Regex("StackName=gone".into())]))
        .with_status(400)
        .with_body(cfn_error("ValidationError", "Stack [gone] does not exist"))
        .create();
    server
        .mock("POST", "/")
        .match_body(Matcher::AllOf(vec![cfn_action("UpdateStack"), Matcher::Regex("StackName=web".into())]))
        .with_status(400)
        .with_body(cfn_error("ValidationError", "No updates are to be performed."))
        .create();
    let client = client(&server);

    let err = client
        .update_stack(&json!({"StackName": "gone", "TemplateBody": "Resources: {}"}))
        .unwrap_err();
    assert!(err.is_missing_stack());

    let err = client
        .update_stack(&json!({"StackName": "web", "TemplateBody": "Resources: {}"}))
        .unwrap_err();
    assert!(!err.is_missing_stack());
    assert_eq!(err.code(), Some("ValidationError"));
}

/// Test that create-only arguments never reach UpdateStack.
#[test]
fn test_update_stack_rejects_create_arguments() {
    let server = Server::new();
    let err = client(&server)
        .update_stack(&json!({"StackName": "web", "OnFailure": "DELETE"}))
        .unwrap_err();
    assert!(matches!(err, ProviderError::InvalidRequest { .. }));
    assert!(err.to_string().contains("UpdateStack does not accept OnFailure"));
}

/// Test that DescribeStackResource yields the physical id.
#[test]
fn test_describe_stack_resource_physical_id() {
    let mut server = Server::new();
    server
        .mock("POST", "/")
        .match_body(Matcher::AllOf(vec![
            cfn_action("DescribeStackResource"),
            Matcher::Regex("LogicalResourceId=Bucket".into()),
        ]))
        .with_status(200)
        .with_body(cfn_response(
            "DescribeStackResource",
            r#"<StackResourceDetail>
  <StackName>web</StackName>
  <LogicalResourceId>Bucket</LogicalResourceId>
  <PhysicalResourceId>web-bucket-1a2b3c</PhysicalResourceId>
  <ResourceType>AWS::S3::Bucket</ResourceType>
  <LastUpdatedTimestamp>2024-03-01T12:00:00Z</LastUpdatedTimestamp>
  <ResourceStatus>CREATE_COMPLETE</ResourceStatus>
</StackResourceDetail>"#,
        ))
        .create();
    let client = client(&server);

    assert_eq!(client.describe_stack_resource("web", "Bucket").unwrap(), "web-bucket-1a2b3c");

    let detail = client
        .call(
            "cloudformation",
            "describe_stack_resource",
            &json!({"StackName": "web", "LogicalResourceId": "Bucket"}),
            Some("StackResourceDetail"),
        )
        .unwrap();
    assert_eq!(detail["ResourceType"], "AWS::S3::Bucket");
    assert_eq!(detail["ResourceStatus"], "CREATE_COMPLETE");
}

/// Test that a generic call applies its result filter to the decoded response.
#[test]
fn test_call_filters_exports() {
    let mut server = Server::new();
    server
        .mock("POST", "/")
        .match_body(cfn_action("ListExports"))
        .with_status(200)
        .with_body(cfn_response(
            "ListExports",
            r#"<Exports>
  <member><ExportingStackId>arn:net</ExportingStackId><Name>vpc-id</Name><Value>vpc-123</Value></member>
  <member><ExportingStackId>arn:net</ExportingStackId><Name>subnet-id</Name><Value>subnet-9</Value></member>
</Exports>"#,
        ))
        .create();

    let value = client(&server)
        .call(
            "cloudformation",
            "list_exports",
            &json!({}),
            Some("Exports[?Name=='subnet-id'].Value | [0]"),
        )
        .unwrap();
    assert_eq!(value, json!("subnet-9"));
}

/// Test describe_stacks through the generic call with an output filter.
#[test]
fn test_call_filters_stack_outputs() {
    let mut server = Server::new();
    server
        .mock("POST", "/")
        .match_body(cfn_action("DescribeStacks"))
        .with_status(200)
        .with_body(cfn_response("DescribeStacks", WEB_STACK))
        .create();

    let value = client(&server)
        .call(
            "cloudformation",
            "describe_stacks",
            &json!({"StackName": "web"}),
            Some("Stacks[0].Outputs[?OutputKey=='BucketName'].OutputValue | [0]"),
        )
        .unwrap();
    assert_eq!(value, json!("web-assets"));
}

/// Test SSM parameter decoding and filtering.
#[test]
fn test_call_ssm_get_parameter() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/")
        .match_header("x-amz-target", "AmazonSSM.GetParameter")
        .match_body(Matcher::PartialJson(json!({"Name": "/app/db-host", "WithDecryption": true})))
        .with_status(200)
        .with_header("content-type", "application/x-amz-json-1.1")
        .with_body(r#"{"Parameter": {"Name": "/app/db-host", "Type": "SecureString", "Value": "db.internal", "Version": 4}}"#)
        .expect(2)
        .create();
    let client = client(&server);

    let value = client
        .call(
            "ssm",
            "get_parameter",
            &json!({"Name": "/app/db-host", "WithDecryption": true}),
            Some("Parameter.Value"),
        )
        .unwrap();
    assert_eq!(value, json!("db.internal"));

    let full = client
        .call("ssm", "get_parameter", &json!({"Name": "/app/db-host", "WithDecryption": true}), None)
        .unwrap();
    assert_eq!(full["Parameter"]["Type"], "SecureString");
    assert_eq!(full["Parameter"]["Version"], 4);
    mock.assert();
}

/// Test that SSM errors keep their code.
#[test]
fn test_call_ssm_parameter_not_found() {
    let mut server = Server::new();
    server
        .mock("POST", "/")
        .match_header("x-amz-target", "AmazonSSM.GetParameter")
        .with_status(400)
        .with_header("content-type", "application/x-amz-json-1.1")
        .with_body(r#"{"__type": "ParameterNotFound", "message": "Parameter /app/none not found."}"#)
        .create();

    let err = client(&server)
        .call("ssm", "get_parameter", &json!({"Name": "/app/none"}), None)
        .unwrap_err();
    assert_eq!(err.code(), Some("ParameterNotFound"));
}

/// Test that operations outside the supported table are refused locally.
#[test]
fn test_call_unsupported_operation() {
    let server = Server::new();
    let client = client(&server);

    let err = client.call("ec2", "describe_vpcs", &json!({}), None).unwrap_err();
    assert!(matches!(
        err,
        ProviderError::UnsupportedOperation { ref service, ref action }
            if service == "ec2" && action == "describe_vpcs"
    ));

    let err = client
        .call("ssm", "get_parameter", &json!({"Name": "/x", "Bogus": 1}), None)
        .unwrap_err();
    assert!(matches!(err, ProviderError::InvalidRequest { .. }));
}

/// Test S3 object bodies and the missing-key code.
#[test]
fn test_get_object() {
    let mut server = Server::new();
    server
        .mock("GET", Matcher::Regex(r"^/templates/web\.yaml".into()))
        .match_query(Matcher::UrlEncoded("versionId".into(), "3".into()))
        .with_status(200)
        .with_header("content-type", "application/x-yaml")
        .with_body("Resources: {}\n")
        .create();
    server
        .mock("GET", Matcher::Regex(r"^/templates/missing\.yaml".into()))
        .with_status(404)
        .with_header("content-type", "application/xml")
        .with_body(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message><Key>missing.yaml</Key><RequestId>4442587FB7D0A2F9</RequestId></Error>"#,
        )
        .create();
    let client = client(&server);

    let body = client
        .get_object("templates", "web.yaml", &[("VersionId".to_string(), "3".to_string())])
        .unwrap();
    assert_eq!(body, "Resources: {}\n");

    let err = client.get_object("templates", "missing.yaml", &[]).unwrap_err();
    assert_eq!(err.code(), Some("NoSuchKey"));
}

/// Test that unknown GetObject arguments are refused.
#[test]
fn test_get_object_rejects_unknown_argument() {
    let server = Server::new();
    let err = client(&server)
        .get_object("templates", "web.yaml", &[("Color".to_string(), "blue".to_string())])
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid s3 request: GetObject does not accept Color");
}

fn change_set(status: &str, reason: &str) -> String {
    cfn_response(
        "DescribeChangeSet",
        &format!(
            r#"<ChangeSetName>web-42</ChangeSetName>
<StackName>web</StackName>
<Status>{status}</Status>
<StatusReason>{reason}</StatusReason>
<ExecutionStatus>AVAILABLE</ExecutionStatus>
<Changes><member>
  <Type>Resource</Type>
  <ResourceChange>
    <Action>Modify</Action>
    <LogicalResourceId>Bucket</LogicalResourceId>
    <PhysicalResourceId>web-bucket-1a2b3c</PhysicalResourceId>
    <ResourceType>AWS::S3::Bucket</ResourceType>
    <Replacement>False</Replacement>
    <Scope><member>Properties</member></Scope>
  </ResourceChange>
</member></Changes>"#
        ),
    )
}

/// Test change set decoding and the change set waiter.
#[test]
fn test_change_set_review() {
    let mut server = Server::new();
    server
        .mock("POST", "/")
        .match_body(cfn_action("DescribeChangeSet"))
        .with_status(200)
        .with_body(change_set("CREATE_COMPLETE", "ready"))
        .create();
    let client = client(&server);

    client
        .wait(CfnWaiter::ChangeSetCreateComplete, "web", Some("web-42"))
        .unwrap();

    let description = client.describe_change_set("web", "web-42").unwrap();
    assert_eq!(description["Status"], "CREATE_COMPLETE");
    assert_eq!(
        description["Changes"][0]["ResourceChange"],
        json!({
            "Action": "Modify",
            "LogicalResourceId": "Bucket",
            "PhysicalResourceId": "web-bucket-1a2b3c",
            "ResourceType": "AWS::S3::Bucket",
            "Replacement": "False",
            "Scope": ["Properties"]
        })
    );
}

/// Test that a failed change set stops the waiter with its reason.
#[test]
fn test_change_set_waiter_failure() {
    let mut server = Server::new();
    server
        .mock("POST", "/")
        .match_body(cfn_action("DescribeChangeSet"))
        .with_status(200)
        .with_body(change_set("FAILED", "No updates are to be performed."))
        .create();

    let err = client(&server)
        .wait(CfnWaiter::ChangeSetCreateComplete, "web", Some("web-42"))
        .unwrap_err();
    assert!(matches!(err, ProviderError::Waiter { .. }));
    assert!(err.to_string().contains("No updates are to be performed."));
}

/// Test that the stack waiters read the stack status.
#[test]
fn test_stack_waiters() {
    let mut server = Server::new();
    server
        .mock("POST", "/")
        .match_body(cfn_action("DescribeStacks"))
        .with_status(200)
        .with_body(cfn_response("DescribeStacks", WEB_STACK))
        .create();
    let client = client(&server);

    client.wait(CfnWaiter::StackCreateComplete, "web", None).unwrap();

    let err = client.wait(CfnWaiter::StackUpdateComplete, "web", None).unwrap_err();
    assert_eq!(err.to_string(), "Waiter stack-update-complete failed: Max attempts exceeded");
}

/// Test that the delete waiter treats a vanished stack as deleted.
#[test]
fn test_delete_waiter_on_missing_stack() {
    let mut server = Server::new();
    server
        .mock("POST", "/")
        .match_body(cfn_action("DescribeStacks"))
        .with_status(400)
        .with_body(cfn_error("ValidationError", "Stack with id web does not exist"))
        .create();
    let client = client(&server);

    client.wait(CfnWaiter::StackDeleteComplete, "web", None).unwrap();

    let err = client.wait(CfnWaiter::StackCreateComplete, "web", None).unwrap_err();
    assert!(err.is_missing_stack());
}
