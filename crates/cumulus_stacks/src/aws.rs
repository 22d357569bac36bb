//! CloudFormation stacks.

use serde_json::{json, Map, Value as JsonValue};
use serde_yaml::{Mapping, Value};
use tracing::info;

use cumulus_providers::CfnWaiter;

use crate::change_set::ChangeSetDecision;
use crate::document::{scalar_string, to_json, StackDocument};
use crate::error::{StackError, StackResult};
use crate::lifecycle::{Lifecycle, LifecycleOptions};
use crate::session::Session;
use crate::stack_type::StackType;
use crate::template::render_location;

/// CreateStack arguments that UpdateStack and CreateChangeSet reject.
const CREATE_ONLY_KEYS: [&str; 4] = [
    "OnFailure",
    "TimeoutInMinutes",
    "DisableRollback",
    "EnableTerminationProtection",
];

/// A CloudFormation stack with its CreateStack payload.
#[derive(Debug, Clone)]
pub struct AwsStack {
    name: String,
    build_id: String,
    template_body: String,
    payload: Map<String, JsonValue>,
}

impl AwsStack {
    /// Normalize a stack document.
    ///
    /// `TemplateBody` is either an inline mapping or the location of a
    /// template, which is fetched and rendered. Templated engines consume
    /// `Parameters`; plain YAML/JSON templates keep them as stack parameters.
    pub fn from_document(session: &Session, mut doc: StackDocument) -> StackResult<Self> {
        let name = doc.require_name()?;
        let template = doc.take_required("TemplateBody")?;
        let mut parameters = doc.take("Parameters");

        let template_body = match template {
            Value::String(location) => {
                let values = match &parameters {
                    Some(Value::Mapping(values)) => Some(values),
                    _ => None,
                };
                let rendered = render_location(session, &name, &location, values, &doc.build_id)?;
                if rendered.consumed_parameters {
                    parameters = None;
                }
                serde_yaml::to_string(&rendered.body)?
            }
            inline @ Value::Mapping(_) => serde_yaml::to_string(&inline)?,
            _ => {
                return Err(StackError::invalid(
                    "TemplateBody",
                    "expected a mapping or a template location",
                ))
            }
        };

        let mut tags = match doc.take("Tags") {
            Some(tags) => key_value_list(tags, "Tags", "Key", "Value")?,
            None => Vec::new(),
        };
        tags.push(json!({"Key": "build_id", "Value": doc.build_id.clone()}));

        let mut payload = Map::new();
        payload.insert("StackName".into(), JsonValue::String(name.clone()));
        payload.insert(
            "TemplateBody".into(),
            JsonValue::String(template_body.clone()),
        );
        if let Some(parameters) = parameters {
            payload.insert(
                "Parameters".into(),
                JsonValue::Array(key_value_list(
                    parameters,
                    "Parameters",
                    "ParameterKey",
                    "ParameterValue",
                )?),
            );
        }
        payload.insert("Tags".into(), JsonValue::Array(tags));
        for (key, value) in &doc.fields {
            let key = scalar_string(key)
                .ok_or_else(|| StackError::invalid("fields", "keys must be strings"))?;
            payload.insert(key, to_json(value)?);
        }

        Ok(Self {
            name,
            build_id: doc.build_id,
            template_body,
            payload,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template_body(&self) -> &str {
        &self.template_body
    }

    /// The CreateStack payload.
    pub fn payload(&self) -> JsonValue {
        JsonValue::Object(self.payload.clone())
    }

    /// The UpdateStack payload: the create payload without create-only keys.
    pub fn update_payload(&self) -> JsonValue {
        let mut payload = self.payload.clone();
        for key in CREATE_ONLY_KEYS {
            payload.remove(key);
        }
        JsonValue::Object(payload)
    }

    pub fn change_set_name(&self) -> String {
        format!("{}-{}", self.name, self.build_id)
    }

    fn apply_create(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        let cfn = &session.providers.cloudformation;
        info!("Creating stack {}", self.name);
        cfn.create_stack(&self.payload())?;
        if options.wait {
            cfn.wait(CfnWaiter::StackCreateComplete, &self.name, None)?;
        }
        Ok(())
    }

    fn apply_update(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        if options.review {
            return self.review_change_set(session, options.wait);
        }
        let cfn = &session.providers.cloudformation;
        info!("Updating stack {}", self.name);
        cfn.update_stack(&self.update_payload())?;
        if options.wait {
            cfn.wait(CfnWaiter::StackUpdateComplete, &self.name, None)?;
        }
        Ok(())
    }

    /// Create a change set, show it to the decider and act on the answer.
    fn review_change_set(&self, session: &Session, wait: bool) -> StackResult<()> {
        let cfn = &session.providers.cloudformation;
        let change_set = self.change_set_name();

        let mut payload = self.update_payload();
        payload["ChangeSetName"] = JsonValue::String(change_set.clone());
        payload["ChangeSetType"] = JsonValue::String("UPDATE".into());

        info!("Creating change set {}", change_set);
        cfn.create_change_set(&payload)?;
        cfn.wait(CfnWaiter::ChangeSetCreateComplete, &self.name, Some(&change_set))?;

        let mut description = cfn.describe_change_set(&self.name, &change_set)?;
        if let Some(fields) = description.as_object_mut() {
            fields.remove("ResponseMetadata");
        }

        match session.decider.decide(&description) {
            ChangeSetDecision::Execute => {
                info!("Executing change set {}", change_set);
                cfn.execute_change_set(&self.name, &change_set)?;
                if wait {
                    cfn.wait(CfnWaiter::StackUpdateComplete, &self.name, None)?;
                }
            }
            ChangeSetDecision::Discard => {
                info!(
                    "Deleting change set {}. No changes made to stack {}",
                    change_set, self.name
                );
                cfn.delete_change_set(&self.name, &change_set)?;
            }
            ChangeSetDecision::Keep => {
                info!(
                    "Change set {} unchanged. No changes made to stack {}",
                    change_set, self.name
                );
            }
        }
        Ok(())
    }
}

impl Lifecycle for AwsStack {
    fn stack_type(&self) -> StackType {
        StackType::Aws
    }

    fn validate(&self, session: &Session) -> StackResult<()> {
        info!("Validating template of stack {}", self.name);
        session
            .providers
            .cloudformation
            .validate_template(&self.template_body)
            .map_err(|e| StackError::ValidationFailed(e.to_string()))
    }

    fn create(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        self.validate(session)?;
        self.apply_create(session, options)
    }

    fn update(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        self.validate(session)?;
        self.apply_update(session, options)
    }

    fn delete(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        let cfn = &session.providers.cloudformation;
        info!("Deleting stack {}", self.name);
        cfn.delete_stack(&self.name)?;
        if options.wait {
            cfn.wait(CfnWaiter::StackDeleteComplete, &self.name, None)?;
        }
        Ok(())
    }

    /// Update, or create when the stack does not exist yet.
    fn upsert(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        self.validate(session)?;
        match self.apply_update(session, options) {
            Err(err) if err.is_missing_stack() => {
                info!("Stack {} does not exist yet", self.name);
                self.apply_create(session, options)
            }
            other => other,
        }
    }

    fn render(&self) -> StackResult<String> {
        let mut payload = match serde_yaml::to_value(&self.payload)? {
            Value::Mapping(payload) => payload,
            _ => Mapping::new(),
        };
        let template: Value = serde_yaml::from_str(&self.template_body)?;
        payload.insert(Value::from("TemplateBody"), template);
        Ok(serde_yaml::to_string(&payload)?)
    }
}

/// Turn a `{key: value}` mapping into `[{<key_name>: key, <value_name>: value}]`.
/// Lists are taken as already being in that shape.
fn key_value_list(
    value: Value,
    field: &str,
    key_name: &str,
    value_name: &str,
) -> StackResult<Vec<JsonValue>> {
    match value {
        Value::Mapping(entries) => entries
            .iter()
            .map(|(key, value)| -> StackResult<JsonValue> {
                let key = scalar_string(key)
                    .ok_or_else(|| StackError::invalid(field, "keys must be strings"))?;
                let value = scalar_string(value).ok_or_else(|| {
                    StackError::invalid(field, format!("value of {} must be a scalar", key))
                })?;
                let mut entry = Map::new();
                entry.insert(key_name.to_string(), JsonValue::String(key));
                entry.insert(value_name.to_string(), JsonValue::String(value));
                Ok(JsonValue::Object(entry))
            })
            .collect(),
        Value::Sequence(items) => items.iter().map(to_json).collect(),
        Value::Null => Ok(Vec::new()),
        _ => Err(StackError::invalid(field, "expected a mapping or a list")),
    }
}
