//! Tera templates.
//!
//! Parameters form the template context. The reference resolver is exposed
//! through functions taking named arguments:
//!
//! ```text
//! {{ stack_output(stack="net", output="VpcId") }}
//! {{ stack_resource(stack="net", resource_id="Vpc") }}
//! {{ parameter(name="/db/password", with_decryption=true) }}
//! {{ call_aws(service="ec2", action="describe_vpcs", arguments=vpc_query, result_filter="Vpcs[].VpcId") }}
//! {{ azure_output(resource_group="rg", deployment="net", output="vnetId") }}
//! {{ gcp_output(project="proj", deployment="net", output="ip") }}
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use serde_yaml::Mapping;
use tera::{Context, Tera};

use crate::error::{TemplateError, TemplateResult};
use crate::resolver::ReferenceResolver;

type Args = HashMap<String, Value>;

fn required<'a>(args: &'a Args, function: &str, name: &str) -> tera::Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| tera::Error::msg(format!("{}() requires a string argument '{}'", function, name)))
}

fn optional<'a>(args: &'a Args, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

fn resolver_error(err: TemplateError) -> tera::Error {
    tera::Error::msg(err.to_string())
}

/// Register the resolver functions on a Tera instance.
pub fn register_functions(tera: &mut Tera, resolver: &Arc<ReferenceResolver>) {
    let r = resolver.clone();
    tera.register_function("stack_output", move |args: &Args| -> tera::Result<Value> {
        let stack = required(args, "stack_output", "stack")?;
        let output = required(args, "stack_output", "output")?;
        r.stack_output(stack, output)
            .map(Value::String)
            .map_err(resolver_error)
    });

    let r = resolver.clone();
    tera.register_function("stack_resource", move |args: &Args| -> tera::Result<Value> {
        let stack = required(args, "stack_resource", "stack")?;
        let logical_id = match optional(args, "resource_id") {
            Some(id) => id,
            None => required(args, "stack_resource", "resourceId")?,
        };
        r.stack_resource(stack, logical_id)
            .map(Value::String)
            .map_err(resolver_error)
    });

    let r = resolver.clone();
    tera.register_function("parameter", move |args: &Args| -> tera::Result<Value> {
        let name = required(args, "parameter", "name")?;
        let with_decryption = args
            .get("with_decryption")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        r.parameter(name, with_decryption)
            .map(Value::String)
            .map_err(resolver_error)
    });

    let r = resolver.clone();
    tera.register_function("call_aws", move |args: &Args| -> tera::Result<Value> {
        let service = required(args, "call_aws", "service")?;
        let action = required(args, "call_aws", "action")?;
        let arguments = args
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        r.call(service, action, &arguments, optional(args, "result_filter"))
            .map_err(resolver_error)
    });

    let r = resolver.clone();
    tera.register_function("azure_output", move |args: &Args| -> tera::Result<Value> {
        let group = required(args, "azure_output", "resource_group")?;
        let deployment = required(args, "azure_output", "deployment")?;
        let output = required(args, "azure_output", "output")?;
        r.azure_output(group, deployment, output)
            .map(Value::String)
            .map_err(resolver_error)
    });

    let r = resolver.clone();
    tera.register_function("gcp_output", move |args: &Args| -> tera::Result<Value> {
        let project = required(args, "gcp_output", "project")?;
        let deployment = required(args, "gcp_output", "deployment")?;
        let output = required(args, "gcp_output", "output")?;
        r.gcp_output(project, deployment, output)
            .map(Value::String)
            .map_err(resolver_error)
    });
}

/// Flatten a Tera error and its sources into one line.
fn error_detail(err: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        details.push(inner.to_string());
        source = inner.source();
    }
    details.join(": ")
}

/// Render a Tera template with `params` as context.
pub fn render_tera(
    source: &str,
    params: &Mapping,
    resolver: &Arc<ReferenceResolver>,
) -> TemplateResult<String> {
    let mut tera = Tera::default();
    register_functions(&mut tera, resolver);

    let context = Context::from_serialize(params)
        .map_err(|e| TemplateError::Rendering(error_detail(&e)))?;
    tera.render_str(source, &context)
        .map_err(|e| TemplateError::Rendering(error_detail(&e)))
}
