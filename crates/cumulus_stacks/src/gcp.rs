//! GCP Deployment Manager deployments.
//!
//! The stack file layout does not follow the API: imports are read from
//! disk, `imports`/`resources`/`outputs` are dumped into the config
//! content, and only the deployment body keys are sent.

use std::thread;

use serde_json::{json, Map, Value as JsonValue};
use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};

use crate::document::{scalar_string, to_json, StackDocument};
use crate::error::{StackError, StackResult};
use crate::lifecycle::{Lifecycle, LifecycleOptions};
use crate::session::Session;
use crate::stack_type::StackType;

const BODY_KEYS: [&str; 5] = ["description", "fingerprint", "labels", "name", "target"];
const CONFIG_KEYS: [&str; 3] = ["imports", "resources", "outputs"];

/// A Deployment Manager deployment.
#[derive(Debug, Clone)]
pub struct GcpStack {
    name: String,
    project: String,
    body: JsonValue,
}

impl GcpStack {
    pub fn from_document(_session: &Session, mut doc: StackDocument) -> StackResult<Self> {
        let name = doc.require_name()?;
        let project = doc
            .take_required("project")
            .and_then(|p| scalar_string(&p).ok_or_else(|| StackError::invalid("project", "expected a string")))?;

        let mut labels = match doc.take("labels") {
            Some(Value::Mapping(labels)) => labels
                .iter()
                .map(|(k, v)| -> StackResult<JsonValue> {
                    let key = scalar_string(k)
                        .ok_or_else(|| StackError::invalid("labels", "keys must be strings"))?;
                    Ok(json!({"key": key, "value": to_json(v)?}))
                })
                .collect::<StackResult<Vec<_>>>()?,
            Some(Value::Sequence(labels)) => labels.iter().map(to_json).collect::<StackResult<Vec<_>>>()?,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => return Err(StackError::invalid("labels", "expected a mapping or a list")),
        };
        labels.push(json!({"key": "build_id", "value": doc.build_id.clone()}));

        let target = assemble_target(&doc)?;

        let mut body = Map::new();
        body.insert("name".into(), JsonValue::String(name.clone()));
        body.insert("labels".into(), JsonValue::Array(labels));
        body.insert("target".into(), target);
        for key in BODY_KEYS {
            if body.contains_key(key) {
                continue;
            }
            if let Some(value) = doc.get(key) {
                body.insert(key.to_string(), to_json(value)?);
            }
        }

        Ok(Self {
            name,
            project,
            body: JsonValue::Object(body),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// The deployment body as sent to the API.
    pub fn body(&self) -> &JsonValue {
        &self.body
    }

    fn get(&self, session: &Session) -> StackResult<Option<JsonValue>> {
        Ok(session
            .providers
            .deployment_manager
            .get_deployment(&self.project, &self.name)?)
    }

    fn insert(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        info!("Inserting deployment {} in project {}", self.name, self.project);
        session
            .providers
            .deployment_manager
            .insert_deployment(&self.project, &self.body)?;
        if options.wait {
            self.wait(session, false)?;
        }
        Ok(())
    }

    /// Poll until the deployment's operation is `DONE`.
    ///
    /// Gives up without error once the timeout is spent. With `gone_is_done`
    /// a deployment that no longer exists also ends the wait.
    pub fn wait(&self, session: &Session, gone_is_done: bool) -> StackResult<()> {
        let poll = session.poll;
        for attempt in 1..=poll.attempts() {
            thread::sleep(poll.interval);
            let deployment = self.get(session)?;
            match deployment {
                Some(d) if d["operation"]["status"] == "DONE" => {
                    debug!("Deployment {} done after {} polls", self.name, attempt);
                    return Ok(());
                }
                None if gone_is_done => return Ok(()),
                _ => {}
            }
        }
        warn!(
            "Gave up waiting for deployment {} after {:?}",
            self.name, poll.timeout
        );
        Ok(())
    }
}

impl Lifecycle for GcpStack {
    fn stack_type(&self) -> StackType {
        StackType::Gcp
    }

    /// Deployment Manager has no separate validation call.
    fn validate(&self, _session: &Session) -> StackResult<()> {
        Ok(())
    }

    fn create(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        if self.get(session)?.is_some() {
            return Err(StackError::AlreadyExists(self.name.clone()));
        }
        self.insert(session, options)
    }

    fn update(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        self.insert(session, options)
    }

    fn delete(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        if self.get(session)?.is_none() {
            return Err(StackError::DoesNotExist(self.name.clone()));
        }
        info!("Deleting deployment {} in project {}", self.name, self.project);
        session
            .providers
            .deployment_manager
            .delete_deployment(&self.project, &self.name)?;
        if options.wait {
            self.wait(session, true)?;
        }
        Ok(())
    }

    fn upsert(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        if self.get(session)?.is_some() {
            info!("Deployment {} exists, updating", self.name);
        }
        self.insert(session, options)
    }

    fn render(&self) -> StackResult<String> {
        let deployment = json!({"project": self.project, "body": self.body});
        Ok(serde_yaml::to_string(&deployment)?)
    }
}

/// Build `target`: imported file contents plus the YAML config.
fn assemble_target(doc: &StackDocument) -> StackResult<JsonValue> {
    let mut imports = Vec::new();
    if let Some(declared) = doc.get("imports") {
        let Value::Sequence(declared) = declared else {
            return Err(StackError::invalid("imports", "expected a list"));
        };
        for import in declared {
            let path = import
                .get("path")
                .and_then(scalar_string)
                .ok_or_else(|| StackError::invalid("imports", "every import needs a path"))?;
            let name = import.get("name").and_then(scalar_string).unwrap_or_else(|| path.clone());
            let content = std::fs::read_to_string(&path).map_err(|source| StackError::Import {
                path: path.clone(),
                source,
            })?;
            imports.push(json!({"content": content.trim_end(), "name": name}));
        }
    }

    let mut config = Mapping::new();
    for (key, value) in &doc.fields {
        if key.as_str().map_or(false, |k| CONFIG_KEYS.contains(&k)) {
            config.insert(key.clone(), value.clone());
        }
    }

    Ok(json!({
        "imports": imports,
        "config": {"content": serde_yaml::to_string(&config)?},
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_set::ChangeSetDecision;
    use crate::session::PollConfig;
    use cumulus_providers::MockCloud;
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn session(cloud: &MockCloud) -> Session {
        Session::new(cloud.context(), Arc::new(ChangeSetDecision::Keep)).with_poll(PollConfig::new(
            Duration::from_millis(5),
            Duration::from_millis(10),
        ))
    }

    fn stack(session: &Session, text: &str) -> StackResult<GcpStack> {
        let doc = StackDocument::from_mapping(serde_yaml::from_str(text).unwrap()).unwrap();
        GcpStack::from_document(session, doc)
    }

    const MINIMAL: &str = "\
type: gcp
name: net
project: proj
BuildId: '42'
description: network
labels:
  team: net
resources:
  - name: vpc
    type: compute.v1.network
outputs:
  - name: vpc
    value: $(ref.vpc.selfLink)
";

    #[test]
    fn test_body_shape() {
        let cloud = MockCloud::new();
        let stack = stack(&session(&cloud), MINIMAL).unwrap();
        let body = stack.body();

        let mut keys: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["description", "labels", "name", "target"]);
        assert_eq!(
            body["labels"],
            json!([{"key": "team", "value": "net"}, {"key": "build_id", "value": "42"}])
        );

        let config: Value =
            serde_yaml::from_str(body["target"]["config"]["content"].as_str().unwrap()).unwrap();
        assert_eq!(config["resources"][0]["name"], Value::from("vpc"));
        assert_eq!(config["outputs"][0]["name"], Value::from("vpc"));
        assert!(config.get("description").is_none());
        assert_eq!(body["target"]["imports"], json!([]));
        assert_eq!(stack.project(), "proj");
    }

    #[test]
    fn test_imports_are_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vm.jinja");
        fs::write(&path, "resources: []\n\n").unwrap();

        let cloud = MockCloud::new();
        let text = format!("{}imports:\n  - path: {}\n", MINIMAL, path.display());
        let stack = stack(&session(&cloud), &text).unwrap();

        let imports = &stack.body()["target"]["imports"];
        assert_eq!(imports[0]["content"], "resources: []");
        assert_eq!(imports[0]["name"], path.display().to_string());
    }

    #[test]
    fn test_missing_import_file() {
        let cloud = MockCloud::new();
        let text = format!("{}imports:\n  - path: missing/vm.jinja\n", MINIMAL);
        let err = stack(&session(&cloud), &text).unwrap_err();
        assert!(matches!(err, StackError::Import { .. }));
    }

    #[test]
    fn test_project_required() {
        let cloud = MockCloud::new();
        let err = stack(&session(&cloud), "type: gcp\nname: net\nBuildId: '1'\n").unwrap_err();
        assert_eq!(err.to_string(), "GCP stack requires field 'project'");
    }

    #[test]
    fn test_create_requires_absence() {
        let cloud = MockCloud::new().with_gcp_deployment("proj", "net", vec![json!({"name": "net"})]);
        let session = session(&cloud);
        let stack = stack(&session, MINIMAL).unwrap();

        let err = stack.create(&session, LifecycleOptions::new()).unwrap_err();
        assert!(matches!(err, StackError::AlreadyExists(_)));
        assert!(!cloud.was_called("insert_deployment"));
    }

    #[test]
    fn test_delete_requires_existence() {
        let cloud = MockCloud::new();
        let session = session(&cloud);
        let stack = stack(&session, MINIMAL).unwrap();

        let err = stack.delete(&session, LifecycleOptions::new()).unwrap_err();
        assert_eq!(err.to_string(), "Deployment doesn't exist: net");
        assert!(!cloud.was_called("delete_gcp_deployment"));
    }

    #[test]
    fn test_wait_stops_at_done() {
        let cloud = MockCloud::new().with_gcp_deployment(
            "proj",
            "net",
            vec![json!({"operation": {"status": "DONE"}})],
        );
        let session = session(&cloud);
        let stack = stack(&session, MINIMAL).unwrap();

        stack.wait(&session, false).unwrap();
        assert_eq!(cloud.call_count("get_gcp_deployment"), 1);
    }

    #[test]
    fn test_wait_gives_up_silently() {
        let cloud = MockCloud::new().with_gcp_deployment(
            "proj",
            "net",
            vec![json!({"operation": {"status": "RUNNING"}})],
        );
        let session = session(&cloud);
        let stack = stack(&session, MINIMAL).unwrap();

        stack.wait(&session, false).unwrap();
        assert_eq!(cloud.call_count("get_gcp_deployment"), 2);
    }

    #[test]
    fn test_update_waits_for_done() {
        let cloud = MockCloud::new().with_gcp_deployment(
            "proj",
            "net",
            vec![
                json!({"operation": {"status": "RUNNING"}}),
                json!({"operation": {"status": "DONE"}}),
            ],
        );
        let session = session(&cloud);
        let stack = stack(&session, MINIMAL).unwrap();

        stack.update(&session, LifecycleOptions::new().wait(true)).unwrap();
        assert_eq!(
            cloud.method_names(),
            ["insert_deployment", "get_gcp_deployment", "get_gcp_deployment"]
        );
        let inserted = &cloud.get_method_calls("insert_deployment")[0];
        assert_eq!(inserted.target, "proj");
        assert_eq!(inserted.payload.as_ref().unwrap()["name"], "net");
    }

    #[test]
    fn test_delete_existing_deployment() {
        let cloud = MockCloud::new().with_gcp_deployment(
            "proj",
            "net",
            vec![json!({"operation": {"status": "DONE"}})],
        );
        let session = session(&cloud);
        let stack = stack(&session, MINIMAL).unwrap();
        stack.delete(&session, LifecycleOptions::new()).unwrap();
        assert_eq!(cloud.get_method_calls("delete_gcp_deployment")[0].target, "proj/net");
    }

    #[test]
    fn test_upsert_inserts_either_way() {
        let cloud = MockCloud::new();
        let session = session(&cloud);
        let stack = stack(&session, MINIMAL).unwrap();

        stack.upsert(&session, LifecycleOptions::new()).unwrap();
        assert_eq!(cloud.method_names(), ["get_gcp_deployment", "insert_deployment"]);
    }

    #[test]
    fn test_render_shows_project_and_body() {
        let cloud = MockCloud::new();
        let stack = stack(&session(&cloud), MINIMAL).unwrap();
        let rendered: Value = serde_yaml::from_str(&stack.render().unwrap()).unwrap();
        assert_eq!(rendered["project"], Value::from("proj"));
        assert_eq!(rendered["body"]["name"], Value::from("net"));
    }
}
