//! Reference tag registry.
//!
//! Documents may carry YAML tags such as `!Cloudformation {stack: net, output: VpcId}`.
//! Tags registered here are parsed into a [`Reference`] and replaced by the
//! resolved value when the document is loaded. Any other tag (`!Ref`,
//! `!GetAtt`, `!Sub`, ...) is left in place and serializes back unchanged.

use std::collections::HashMap;

use serde_json::Value as JsonValue;
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{TemplateError, TemplateResult};
use crate::resolver::{Reference, ReferenceResolver};

/// Parses the value under a tag into a reference.
pub type TagParser = fn(&str, &Value) -> TemplateResult<Reference>;

/// Registry mapping tag names to reference parsers.
#[derive(Clone)]
pub struct TagRegistry {
    parsers: HashMap<String, TagParser>,
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl TagRegistry {
    /// An empty registry. Every tag passes through.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// The built-in reference tags.
    pub fn standard() -> Self {
        Self::empty()
            .register("Cloudformation", parse_cloudformation)
            .register("SSM", parse_ssm)
            .register("AWS", parse_aws_call)
            .register("ARM", parse_arm)
            .register("GCPDM", parse_gcp_dm)
    }

    /// Register a parser for a tag name (without the leading `!`).
    pub fn register(mut self, tag: &str, parser: TagParser) -> Self {
        self.parsers.insert(tag.to_string(), parser);
        self
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.parsers.contains_key(tag)
    }

    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.parsers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Parse the reference carried by a tagged value, if its tag is registered.
    pub fn parse(&self, tagged: &TaggedValue) -> Option<TemplateResult<Reference>> {
        let name = tag_name(tagged);
        self.parsers
            .get(&name)
            .map(|parser| parser(&name, &tagged.value))
    }

    /// Replace every registered tag in `value` with its resolved value.
    ///
    /// Children are resolved before their parents, so a reference may take
    /// arguments that are references themselves.
    pub fn resolve(&self, value: Value, resolver: &ReferenceResolver) -> TemplateResult<Value> {
        match value {
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| self.resolve(item, resolver))
                .collect::<TemplateResult<Vec<_>>>()
                .map(Value::Sequence),
            Value::Mapping(mapping) => {
                let mut resolved = Mapping::with_capacity(mapping.len());
                for (key, item) in mapping {
                    resolved.insert(key, self.resolve(item, resolver)?);
                }
                Ok(Value::Mapping(resolved))
            }
            Value::Tagged(tagged) => {
                let TaggedValue { tag, value } = *tagged;
                let tagged = TaggedValue {
                    tag,
                    value: self.resolve(value, resolver)?,
                };
                match self.parse(&tagged) {
                    Some(reference) => {
                        let reference = reference?;
                        debug!("Resolving {:?}", reference);
                        let resolved = resolver.resolve(&reference)?;
                        Ok(serde_yaml::to_value(resolved)?)
                    }
                    None => Ok(Value::Tagged(Box::new(tagged))),
                }
            }
            other => Ok(other),
        }
    }
}

impl std::fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

/// Tag name without the leading `!`.
pub fn tag_name(tagged: &TaggedValue) -> String {
    tagged.tag.to_string().trim_start_matches('!').to_string()
}

/// Field access for a tag's mapping body.
struct TagFields<'a> {
    tag: &'a str,
    mapping: &'a Mapping,
}

impl<'a> TagFields<'a> {
    fn new(tag: &'a str, value: &'a Value) -> TemplateResult<Self> {
        match value {
            Value::Mapping(mapping) => Ok(Self { tag, mapping }),
            _ => Err(TemplateError::malformed(tag, "expected a mapping")),
        }
    }

    /// First present field among `names`.
    fn find(&self, names: &[&str]) -> Option<&'a Value> {
        names.iter().find_map(|name| self.mapping.get(*name))
    }

    fn optional_string(&self, names: &[&str]) -> TemplateResult<Option<String>> {
        match self.find(names) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(_) => Err(TemplateError::malformed(
                self.tag,
                format!("field '{}' must be a string", names[0]),
            )),
        }
    }

    fn string(&self, names: &[&str]) -> TemplateResult<String> {
        self.optional_string(names)?.ok_or_else(|| {
            TemplateError::malformed(self.tag, format!("missing required field '{}'", names[0]))
        })
    }

    fn bool(&self, names: &[&str]) -> TemplateResult<bool> {
        match self.find(names) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => Ok(s.eq_ignore_ascii_case("true")),
            Some(_) => Err(TemplateError::malformed(
                self.tag,
                format!("field '{}' must be a boolean", names[0]),
            )),
        }
    }

    fn json(&self, names: &[&str]) -> TemplateResult<JsonValue> {
        match self.find(names) {
            None | Some(Value::Null) => Ok(JsonValue::Object(Default::default())),
            Some(value) => Ok(serde_json::to_value(value)?),
        }
    }
}

fn parse_cloudformation(tag: &str, value: &Value) -> TemplateResult<Reference> {
    let fields = TagFields::new(tag, value)?;
    let stack = fields.string(&["stack"])?;
    if let Some(output) = fields.optional_string(&["output"])? {
        return Ok(Reference::StackOutput { stack, output });
    }
    match fields.optional_string(&["resource_id", "resourceId"])? {
        Some(logical_id) => Ok(Reference::StackResource { stack, logical_id }),
        None => Err(TemplateError::malformed(
            tag,
            "one of 'output' or 'resource_id' is required",
        )),
    }
}

fn parse_ssm(tag: &str, value: &Value) -> TemplateResult<Reference> {
    let fields = TagFields::new(tag, value)?;
    Ok(Reference::Parameter {
        name: fields.string(&["Name", "name"])?,
        with_decryption: fields.bool(&["WithDecryption", "withDecryption"])?,
    })
}

fn parse_aws_call(tag: &str, value: &Value) -> TemplateResult<Reference> {
    let fields = TagFields::new(tag, value)?;
    Ok(Reference::ApiCall {
        service: fields.string(&["service"])?,
        action: fields.string(&["action"])?,
        arguments: fields.json(&["arguments"])?,
        result_filter: fields.optional_string(&["result_filter", "resultFilter"])?,
    })
}

fn parse_arm(tag: &str, value: &Value) -> TemplateResult<Reference> {
    let fields = TagFields::new(tag, value)?;
    Ok(Reference::AzureOutput {
        resource_group: fields.string(&["resource_group", "resourceGroup"])?,
        deployment: fields.string(&["deployment"])?,
        output: fields.string(&["output"])?,
    })
}

fn parse_gcp_dm(tag: &str, value: &Value) -> TemplateResult<Reference> {
    let fields = TagFields::new(tag, value)?;
    Ok(Reference::GcpOutput {
        project: fields.string(&["project"])?,
        deployment: fields.string(&["deployment"])?,
        output: fields.string(&["output"])?,
    })
}
