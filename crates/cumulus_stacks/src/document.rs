//! Rendered stack descriptions.

use serde_yaml::{Mapping, Value};

use crate::error::{StackError, StackResult};
use crate::stack_type::StackType;

const TYPE_KEYS: [&str; 2] = ["type", "StackType"];
const NAME_KEYS: [&str; 2] = ["name", "StackName"];
const BUILD_ID_KEY: &str = "BuildId";

/// A stack file after rendering, split into the fields every stack type
/// shares and the provider-specific remainder.
#[derive(Debug, Clone, PartialEq)]
pub struct StackDocument {
    pub stack_type: StackType,
    pub name: Option<String>,
    pub build_id: String,
    /// Everything except the type, name and build id.
    pub fields: Mapping,
}

impl StackDocument {
    /// Split a rendered stack mapping.
    ///
    /// The type is read from `type` or `StackType` (AWS when absent), the name
    /// from `name` or `StackName`. `BuildId` must be present and non-empty.
    pub fn from_mapping(mut fields: Mapping) -> StackResult<Self> {
        let stack_type = match take_string(&mut fields, &TYPE_KEYS)? {
            Some(name) => StackType::from_name(&name)?,
            None => StackType::default(),
        };
        let name = take_string(&mut fields, &NAME_KEYS)?;
        let build_id = match fields.remove(BUILD_ID_KEY) {
            Some(value) => scalar_string(&value).unwrap_or_default(),
            None => String::new(),
        };
        if build_id.is_empty() {
            return Err(StackError::MissingBuildId);
        }

        Ok(Self {
            stack_type,
            name,
            build_id,
            fields,
        })
    }

    /// The stack name, required by every provider-backed stack.
    pub fn require_name(&self) -> StackResult<String> {
        self.name
            .clone()
            .ok_or_else(|| StackError::missing(self.stack_type, "name"))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn take(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Remove a field that must be present.
    pub fn take_required(&mut self, key: &str) -> StackResult<Value> {
        let stack_type = self.stack_type;
        self.take(key)
            .ok_or_else(|| StackError::missing(stack_type, key))
    }
}

fn take_string(fields: &mut Mapping, keys: &[&str]) -> StackResult<Option<String>> {
    let mut found = None;
    for key in keys {
        if let Some(value) = fields.remove(*key) {
            let text = scalar_string(&value)
                .ok_or_else(|| StackError::invalid(key, "expected a string"))?;
            found.get_or_insert(text);
        }
    }
    Ok(found)
}

/// Text of a scalar value. `None` for collections and tagged values.
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => None,
    }
}

/// Convert a document value into an API payload value.
pub fn to_json(value: &Value) -> StackResult<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(text: &str) -> Mapping {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_defaults_to_aws() {
        let doc = StackDocument::from_mapping(mapping("StackName: web\nBuildId: '7'\nTemplateBody: {}\n"))
            .unwrap();
        assert_eq!(doc.stack_type, StackType::Aws);
        assert_eq!(doc.name.as_deref(), Some("web"));
        assert_eq!(doc.build_id, "7");
        assert_eq!(doc.fields.len(), 1);
        assert!(doc.get("TemplateBody").is_some());
    }

    #[test]
    fn test_alternate_keys() {
        let doc = StackDocument::from_mapping(mapping("type: gcp\nname: dm\nBuildId: 12\n"))
            .unwrap();
        assert_eq!(doc.stack_type, StackType::Gcp);
        assert_eq!(doc.name.as_deref(), Some("dm"));
        assert_eq!(doc.build_id, "12");
        assert!(doc.fields.is_empty());
    }

    #[test]
    fn test_unknown_type() {
        let err = StackDocument::from_mapping(mapping("type: openstack\nBuildId: '1'\n")).unwrap_err();
        assert_eq!(err.to_string(), "Stack type not supported: openstack");
    }

    #[test]
    fn test_build_id_required() {
        let err = StackDocument::from_mapping(mapping("StackName: web\n")).unwrap_err();
        assert!(matches!(err, StackError::MissingBuildId));

        let err = StackDocument::from_mapping(mapping("StackName: web\nBuildId: ''\n")).unwrap_err();
        assert!(matches!(err, StackError::MissingBuildId));
    }

    #[test]
    fn test_require_name() {
        let doc = StackDocument::from_mapping(mapping("StackType: Shell\nBuildId: '1'\n")).unwrap();
        assert!(doc.name.is_none());
        let err = doc.require_name().unwrap_err();
        assert_eq!(err.to_string(), "Shell stack requires field 'name'");
    }
}
