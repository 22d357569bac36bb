//! Automatic output exports.

use serde_yaml::{Mapping, Value};

/// Add an exported output for every entry under `Resources`.
///
/// Each resource `key` gets `{Value: {Ref: key}, Export: {Name: "{stack}-{key}"}}`.
/// Outputs already declared in the document take precedence, and `Outputs`
/// is only written when the result is non-empty.
pub fn synthesize_outputs(stack_name: &str, document: &mut Value) {
    let Value::Mapping(root) = document else {
        return;
    };

    let mut outputs = Mapping::new();
    if let Some(Value::Mapping(resources)) = root.get("Resources") {
        for key in resources.keys() {
            let Value::String(name) = key else {
                continue;
            };
            outputs.insert(key.clone(), default_output(stack_name, name));
        }
    }

    if let Some(Value::Mapping(explicit)) = root.get("Outputs") {
        for (key, output) in explicit {
            outputs.insert(key.clone(), output.clone());
        }
    }

    if !outputs.is_empty() {
        root.insert(Value::from("Outputs"), Value::Mapping(outputs));
    }
}

fn default_output(stack_name: &str, resource: &str) -> Value {
    let mut reference = Mapping::new();
    reference.insert(Value::from("Ref"), Value::from(resource));

    let mut export = Mapping::new();
    export.insert(
        Value::from("Name"),
        Value::from(format!("{}-{}", stack_name, resource)),
    );

    let mut output = Mapping::new();
    output.insert(Value::from("Value"), Value::Mapping(reference));
    output.insert(Value::from("Export"), Value::Mapping(export));
    Value::Mapping(output)
}
