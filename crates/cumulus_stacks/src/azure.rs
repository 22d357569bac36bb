//! Azure Resource Manager deployments.
//!
//! ARM deploys into a resource group, which cannot itself be created by the
//! deployment. The group is created (or updated) first through the resource
//! API:
//!
//! ```yaml
//! type: azure
//! name: web
//! resourceGroup:
//!   name: rg-web
//!   location: eastus
//!   tags: {team: web}
//!   persist: false
//! template: templates/web.mako
//! parameters:
//!   minVMs: 1
//! mode: Incremental
//! ```

use serde_json::{json, Map, Value as JsonValue};
use serde_yaml::Value;
use tracing::info;

use crate::document::{scalar_string, to_json, StackDocument};
use crate::error::{StackError, StackResult};
use crate::lifecycle::{Lifecycle, LifecycleOptions};
use crate::session::Session;
use crate::stack_type::StackType;
use crate::template::render_location;

const DEFAULT_MODE: &str = "Incremental";

/// The resource group holding a deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceGroup {
    pub name: String,
    pub location: String,
    pub tags: Map<String, JsonValue>,
    /// Keep the group when the deployment is deleted.
    pub persist: bool,
    extra: Map<String, JsonValue>,
}

impl ResourceGroup {
    fn from_value(value: Value, build_id: &str) -> StackResult<Self> {
        let Value::Mapping(mut fields) = value else {
            return Err(StackError::invalid("resourceGroup", "expected a mapping"));
        };
        let mut required = |key: &str| -> StackResult<String> {
            fields
                .remove(key)
                .as_ref()
                .and_then(scalar_string)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| StackError::missing(StackType::Azure, &format!("resourceGroup.{}", key)))
        };
        let name = required("name")?;
        let location = required("location")?;

        let mut tags = match fields.remove("tags") {
            Some(tags @ Value::Mapping(_)) => match to_json(&tags)? {
                JsonValue::Object(tags) => tags,
                _ => Map::new(),
            },
            Some(Value::Null) | None => Map::new(),
            Some(_) => return Err(StackError::invalid("resourceGroup.tags", "expected a mapping")),
        };
        tags.insert("build_id".into(), JsonValue::String(build_id.to_string()));

        let persist = match fields.remove("persist") {
            Some(Value::Bool(persist)) => persist,
            None => true,
            Some(_) => return Err(StackError::invalid("resourceGroup.persist", "expected a boolean")),
        };

        let extra = match to_json(&Value::Mapping(fields))? {
            JsonValue::Object(extra) => extra,
            _ => Map::new(),
        };

        Ok(Self {
            name,
            location,
            tags,
            persist,
            extra,
        })
    }

    /// Create-or-update parameters: everything except the name and `persist`.
    pub fn parameters(&self) -> JsonValue {
        let mut parameters = self.extra.clone();
        parameters.insert("location".into(), JsonValue::String(self.location.clone()));
        parameters.insert("tags".into(), JsonValue::Object(self.tags.clone()));
        JsonValue::Object(parameters)
    }
}

/// An ARM deployment.
#[derive(Debug, Clone)]
pub struct AzureStack {
    name: String,
    resource_group: ResourceGroup,
    properties: Map<String, JsonValue>,
}

impl AzureStack {
    pub fn from_document(session: &Session, mut doc: StackDocument) -> StackResult<Self> {
        let name = doc.require_name()?;
        if doc.get("template").is_some() && doc.get("templateLink").is_some() {
            return Err(StackError::ConflictingFields {
                first: "template".into(),
                second: "templateLink".into(),
            });
        }
        let resource_group = ResourceGroup::from_value(doc.take_required("resourceGroup")?, &doc.build_id)?;

        let mut properties = Map::new();
        let mut parameters = doc.take("parameters");
        match doc.take("template") {
            Some(Value::String(location)) => {
                let values = match &parameters {
                    Some(Value::Mapping(values)) => Some(values),
                    _ => None,
                };
                let rendered = render_location(session, &name, &location, values, &doc.build_id)?;
                if rendered.consumed_parameters {
                    parameters = None;
                }
                properties.insert("template".into(), to_json(&rendered.body)?);
            }
            Some(inline @ Value::Mapping(_)) => {
                properties.insert("template".into(), to_json(&inline)?);
            }
            Some(_) => {
                return Err(StackError::invalid(
                    "template",
                    "expected a mapping or a template location",
                ))
            }
            None => {}
        }
        match doc.take("templateLink") {
            Some(link) => {
                properties.insert("templateLink".into(), link_value(link, "templateLink")?);
            }
            None if !properties.contains_key("template") => {
                return Err(StackError::missing(StackType::Azure, "template"));
            }
            None => {}
        }
        if let Some(link) = doc.take("parametersLink") {
            properties.insert("parametersLink".into(), link_value(link, "parametersLink")?);
        }
        if let Some(parameters) = parameters {
            properties.insert("parameters".into(), wrap_parameters(parameters)?);
        }
        let mode = match doc.take("mode") {
            Some(mode) => scalar_string(&mode)
                .ok_or_else(|| StackError::invalid("mode", "expected a string"))?,
            None => DEFAULT_MODE.to_string(),
        };
        properties.insert("mode".into(), JsonValue::String(mode));

        for (key, value) in &doc.fields {
            let key = scalar_string(key)
                .ok_or_else(|| StackError::invalid("fields", "keys must be strings"))?;
            properties.insert(key, to_json(value)?);
        }

        Ok(Self {
            name,
            resource_group,
            properties,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_group(&self) -> &ResourceGroup {
        &self.resource_group
    }

    /// Deployment properties as sent to the API.
    pub fn properties(&self) -> JsonValue {
        JsonValue::Object(self.properties.clone())
    }

    fn ensure_resource_group(&self, session: &Session) -> StackResult<()> {
        info!(
            "Creating or updating resource group {} in {}",
            self.resource_group.name, self.resource_group.location
        );
        session
            .providers
            .resource_manager
            .create_or_update_resource_group(&self.resource_group.name, &self.resource_group.parameters())?;
        Ok(())
    }

    fn deploy(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        self.ensure_resource_group(session)?;
        info!("Deploying {} to {}", self.name, self.resource_group.name);
        session.providers.resource_manager.create_or_update_deployment(
            &self.resource_group.name,
            &self.name,
            &self.properties(),
            options.wait,
        )?;
        Ok(())
    }
}

impl Lifecycle for AzureStack {
    fn stack_type(&self) -> StackType {
        StackType::Azure
    }

    fn validate(&self, session: &Session) -> StackResult<()> {
        self.ensure_resource_group(session)?;
        let error = session.providers.resource_manager.validate_deployment(
            &self.resource_group.name,
            &self.name,
            &self.properties(),
        )?;
        match error {
            Some(message) => Err(StackError::ValidationFailed(message)),
            None => Ok(()),
        }
    }

    fn create(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        self.deploy(session, options)
    }

    fn update(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        self.deploy(session, options)
    }

    /// Deleting a non-persistent group waits for the deployment to go first.
    fn delete(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        let arm = &session.providers.resource_manager;
        let group = &self.resource_group;
        info!("Deleting deployment {} from {}", self.name, group.name);
        if group.persist {
            arm.delete_deployment(&group.name, &self.name, options.wait)?;
        } else {
            arm.delete_deployment(&group.name, &self.name, true)?;
            info!("Deleting resource group {}", group.name);
            arm.delete_resource_group(&group.name)?;
        }
        Ok(())
    }

    fn upsert(&self, session: &Session, options: LifecycleOptions) -> StackResult<()> {
        self.deploy(session, options)
    }

    fn render(&self) -> StackResult<String> {
        Ok(serde_json::to_string_pretty(&self.properties)?)
    }
}

/// A link given as a plain URI becomes `{uri: ...}`.
fn link_value(value: Value, field: &str) -> StackResult<JsonValue> {
    match value {
        Value::String(uri) => Ok(json!({ "uri": uri })),
        link @ Value::Mapping(_) => to_json(&link),
        _ => Err(StackError::invalid(field, "expected a URI or a mapping")),
    }
}

/// ARM expects every parameter as `{value: ...}` (or `{reference: ...}`).
fn wrap_parameters(parameters: Value) -> StackResult<JsonValue> {
    let Value::Mapping(parameters) = parameters else {
        return Err(StackError::invalid("parameters", "expected a mapping"));
    };
    let mut wrapped = Map::new();
    for (key, value) in &parameters {
        let key = scalar_string(key)
            .ok_or_else(|| StackError::invalid("parameters", "keys must be strings"))?;
        let value = to_json(value)?;
        let is_wrapped = value
            .as_object()
            .map_or(false, |v| v.contains_key("value") || v.contains_key("reference"));
        let value = if is_wrapped {
            value
        } else {
            json!({ "value": value })
        };
        wrapped.insert(key, value);
    }
    Ok(JsonValue::Object(wrapped))
}
