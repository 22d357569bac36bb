//! Deployment Manager client tests against a stub endpoint.

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;

use cumulus_providers::{DeploymentManagerApi, DeploymentManagerOptions, DeploymentManagerRest};

fn client(server: &ServerGuard) -> DeploymentManagerRest {
    DeploymentManagerRest::new(
        DeploymentManagerOptions::new()
            .endpoint(server.url())
            .access_token("ya29.token"),
    )
}

/// Test that a missing deployment reads as `None`.
#[test]
fn test_get_deployment() {
    let mut server = Server::new();
    server
        .mock("GET", "/projects/proj/global/deployments/web")
        .match_header("authorization", "Bearer ya29.token")
        .with_status(200)
        .with_body(r#"{"name": "web", "operation": {"status": "DONE"}, "manifest": "projects/proj/global/deployments/web/manifests/manifest-1"}"#)
        .create();
    server
        .mock("GET", "/projects/proj/global/deployments/gone")
        .with_status(404)
        .with_body(r#"{"error": {"code": 404, "status": "NOT_FOUND", "message": "The object 'projects/proj/global/deployments/gone' is not found."}}"#)
        .create();
    let client = client(&server);

    let deployment = client.get_deployment("proj", "web").unwrap().unwrap();
    assert_eq!(deployment["operation"]["status"], "DONE");
    assert!(client.get_deployment("proj", "gone").unwrap().is_none());
}

/// Test that API errors keep their status as the error code.
#[test]
fn test_insert_deployment_error() {
    let mut server = Server::new();
    server
        .mock("POST", "/projects/proj/global/deployments")
        .match_body(Matcher::PartialJson(json!({"name": "web"})))
        .with_status(403)
        .with_body(r#"{"error": {"code": 403, "status": "PERMISSION_DENIED", "message": "Required 'deploymentmanager.deployments.create' permission"}}"#)
        .create();

    let err = client(&server)
        .insert_deployment("proj", &json!({"name": "web", "target": {}}))
        .unwrap_err();
    assert_eq!(err.code(), Some("PERMISSION_DENIED"));
    assert_eq!(
        err.to_string(),
        "HTTP error 403: Required 'deploymentmanager.deployments.create' permission"
    );
}
