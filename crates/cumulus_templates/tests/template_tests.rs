//! Integration tests for the template pipeline.

use std::fs;
use std::sync::Arc;

use serde_json::json;
use serde_yaml::{Mapping, Value};
use tempfile::tempdir;

use cumulus_providers::MockCloud;
use cumulus_templates::{
    ReferenceResolver, TemplateEngine, TemplateError, TemplateFetcher, TemplateRenderer,
};

fn renderer(cloud: &MockCloud) -> TemplateRenderer {
    TemplateRenderer::new(Arc::new(ReferenceResolver::new(cloud.context())))
}

fn params(text: &str) -> Mapping {
    serde_yaml::from_str(text).unwrap()
}

/// Test fetching a script template from disk and rendering it by extension.
#[test]
fn test_fetch_and_render_script_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queue.mako");
    fs::write(
        &path,
        "Description: queue for ${env}\nResources:\n  queue:\n    Type: AWS::SQS::Queue\n    Properties:\n      Tags:\n        - {Key: build, Value: '${build_id}'}\n",
    )
    .unwrap();

    let cloud = MockCloud::new();
    let fetcher = TemplateFetcher::new(cloud.context().aws);
    let (location, body) = fetcher.fetch(path.to_str().unwrap()).unwrap();

    let doc = renderer(&cloud)
        .render_path("jobs", &location, &body, &params("env: prod\nbuild_id: '42'"))
        .unwrap();

    assert_eq!(doc["Description"], Value::from("queue for prod"));
    assert_eq!(
        doc["Resources"]["queue"]["Properties"]["Tags"][0]["Value"],
        Value::from("42")
    );
    assert_eq!(doc["Outputs"]["queue"]["Export"]["Name"], Value::from("jobs-queue"));
}

/// Test the script engine's utils object against the mock cloud.
#[test]
fn test_script_utils_resolve_outputs() {
    let cloud = MockCloud::new().with_stack_outputs("net", &[("VpcId", "vpc-9")]);
    let source = "VpcId: ${utils.stack_output(\"net\", \"VpcId\")}\n";

    let doc = renderer(&cloud)
        .render_document(source, TemplateEngine::Script, &Mapping::new())
        .unwrap();
    assert_eq!(doc.get("VpcId"), Some(&Value::from("vpc-9")));
}

/// Test a Tera template mixing context values and resolver functions.
#[test]
fn test_tera_template() {
    let cloud = MockCloud::new().with_azure_deployment(
        "rg-net",
        "network",
        json!({"properties": {"outputs": {"subnetId": {"type": "String", "value": "sub-1"}}}}),
    );
    let source = "name: {{ name }}\nsubnet: {{ azure_output(resource_group=\"rg-net\", deployment=\"network\", output=\"subnetId\") }}\n";

    let doc = renderer(&cloud)
        .render_document(source, TemplateEngine::Tera, &params("name: api"))
        .unwrap();
    assert_eq!(doc.get("name"), Some(&Value::from("api")));
    assert_eq!(doc.get("subnet"), Some(&Value::from("sub-1")));
}

/// Test that reference tags of every provider resolve in one document and
/// each deployment is described once.
#[test]
fn test_cross_provider_tags() {
    let layout = "resources: []\noutputs:\n  - name: ip\n    finalValue: 10.0.0.1\n";
    let cloud = MockCloud::new()
        .with_stack_outputs("net", &[("VpcId", "vpc-1")])
        .with_azure_deployment(
            "rg",
            "net",
            json!({"properties": {"outputs": {"vnetId": {"value": "vnet-1"}}}}),
        )
        .with_gcp_deployment(
            "proj",
            "net",
            vec![json!({"name": "net", "manifest": "https://dm/projects/proj/global/deployments/net/manifests/m-1"})],
        )
        .with_gcp_manifest("proj", "net", "m-1", json!({"layout": layout}));

    let source = "\
aws: !Cloudformation {stack: net, output: VpcId}
aws_again: !Cloudformation {stack: net, output: VpcId}
azure: !ARM {resource_group: rg, deployment: net, output: vnetId}
gcp: !GCPDM {project: proj, deployment: net, output: ip}
gcp_missing: !GCPDM {project: proj, deployment: net, output: nope}
";
    let doc = renderer(&cloud)
        .render_document(source, TemplateEngine::Yaml, &Mapping::new())
        .unwrap();

    assert_eq!(doc.get("aws"), Some(&Value::from("vpc-1")));
    assert_eq!(doc.get("aws_again"), Some(&Value::from("vpc-1")));
    assert_eq!(doc.get("azure"), Some(&Value::from("vnet-1")));
    assert_eq!(doc.get("gcp"), Some(&Value::from("10.0.0.1")));
    assert_eq!(doc.get("gcp_missing"), Some(&Value::from("")));

    assert_eq!(cloud.call_count("describe_stack"), 1);
    assert_eq!(cloud.call_count("get_gcp_deployment"), 1);
    assert_eq!(cloud.call_count("get_manifest"), 1);
}

/// Test that provider-native tags survive a render and re-serialize unchanged.
#[test]
fn test_native_tags_round_trip() {
    let source = "Resources:\n  bucket:\n    Type: AWS::S3::Bucket\n    Properties:\n      BucketName: !Sub '${AWS::StackName}-data'\n";
    let doc = renderer(&MockCloud::new())
        .render("data", source, &Mapping::new(), TemplateEngine::Yaml)
        .unwrap();

    let text = serde_yaml::to_string(&doc).unwrap();
    assert!(text.contains("BucketName: !Sub"));

    let reparsed: Value = serde_yaml::from_str(&text).unwrap();
    assert_eq!(reparsed, doc);
}

/// Test that a failing template reports the offending line.
#[test]
fn test_render_error_names_template_line() {
    let source = "a: 1\nb: ${missing_variable}\n";
    let err = renderer(&MockCloud::new())
        .render("web", source, &Mapping::new(), TemplateEngine::Script)
        .unwrap_err();

    assert!(matches!(err, TemplateError::Rendering(_)));
    let message = err.to_string();
    assert!(message.contains("line 2"));
    assert!(message.contains("missing_variable"));
}
