//! Scripted templates.
//!
//! A scripted template is text with embedded [Rhai](https://rhai.rs) code:
//!
//! - `${expr}` interpolates an expression. Strings are inserted verbatim,
//!   arrays and maps as JSON flow collections.
//! - `$${` produces a literal `${`, for CloudFormation `!Sub` strings.
//! - `<% ... %>` runs statements and may span several lines.
//! - A line whose first non-blank character is `%` is a control line:
//!   `% for zone in zones {` ... `% }`.
//! - `%%` at the start of a line produces a literal `%`.
//! - Lines starting with `##` are dropped.
//!
//! Parameters are in scope as variables, and also together as `params`.
//! `utils` exposes the reference resolver:
//! `utils.stack_output(stack, output)`, `utils.stack_resource(stack, id)`,
//! `utils.call_aws(service, action, args, filter)`, `utils.parameter(name)`,
//! `utils.azure_output(group, deployment, output)` and
//! `utils.gcp_output(project, deployment, output)`.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use rhai::{Dynamic, Engine, EvalAltResult, Map, Position, Scope};
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{TemplateError, TemplateResult};
use crate::resolver::ReferenceResolver;

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// Lines shown around the failing line in error excerpts.
const EXCERPT_CONTEXT: usize = 2;

/// Resolver capabilities exposed to scripts as `utils`.
#[derive(Clone)]
pub struct ScriptUtils {
    resolver: Arc<ReferenceResolver>,
}

impl ScriptUtils {
    pub fn new(resolver: Arc<ReferenceResolver>) -> Self {
        Self { resolver }
    }

    fn stack_output(&mut self, stack: &str, output: &str) -> ScriptResult<String> {
        self.resolver.stack_output(stack, output).map_err(script_error)
    }

    fn stack_resource(&mut self, stack: &str, logical_id: &str) -> ScriptResult<String> {
        self.resolver.stack_resource(stack, logical_id).map_err(script_error)
    }

    fn parameter(&mut self, name: &str, with_decryption: bool) -> ScriptResult<String> {
        self.resolver.parameter(name, with_decryption).map_err(script_error)
    }

    fn azure_output(&mut self, group: &str, deployment: &str, output: &str) -> ScriptResult<String> {
        self.resolver
            .azure_output(group, deployment, output)
            .map_err(script_error)
    }

    fn gcp_output(&mut self, project: &str, deployment: &str, output: &str) -> ScriptResult<String> {
        self.resolver
            .gcp_output(project, deployment, output)
            .map_err(script_error)
    }

    fn call_aws(
        &mut self,
        service: &str,
        action: &str,
        arguments: Map,
        result_filter: Option<&str>,
    ) -> ScriptResult<Dynamic> {
        let arguments: serde_json::Value = rhai::serde::from_dynamic(&Dynamic::from_map(arguments))?;
        let result = self
            .resolver
            .call(service, action, &arguments, result_filter)
            .map_err(script_error)?;
        rhai::serde::to_dynamic(result)
    }
}

fn script_error(err: TemplateError) -> Box<EvalAltResult> {
    err.to_string().into()
}

/// A template translated to a Rhai program.
#[derive(Debug)]
struct CompiledTemplate {
    script: String,
    chunks: Vec<String>,
    /// Template line (1-based) for each script line.
    line_map: Vec<usize>,
}

/// Translation state while walking the template.
#[derive(Default)]
struct Compiler {
    lines: Vec<String>,
    line_map: Vec<usize>,
    chunks: Vec<String>,
    text: String,
    in_block: bool,
}

impl Compiler {
    fn statement(&mut self, line_no: usize, statement: impl Into<String>) {
        self.lines.push(statement.into());
        self.line_map.push(line_no);
    }

    /// Code from `<% %>` or a control line, terminated if it ends a statement.
    fn code(&mut self, line_no: usize, code: &str) {
        let code = code.trim();
        if code.is_empty() {
            return;
        }
        if code.ends_with([';', '{', '}']) {
            self.statement(line_no, code);
        } else {
            self.statement(line_no, format!("{};", code));
        }
    }

    fn flush_text(&mut self, line_no: usize) {
        if self.text.is_empty() {
            return;
        }
        let index = self.chunks.len();
        self.chunks.push(std::mem::take(&mut self.text));
        self.statement(line_no, format!("emit_text({});", index));
    }

    fn line(&mut self, line_no: usize, line: &str) -> TemplateResult<()> {
        if self.in_block {
            match line.find("%>") {
                Some(end) => {
                    self.in_block = false;
                    self.code(line_no, &line[..end]);
                    return self.text_segment(line_no, &line[end + 2..]);
                }
                None => {
                    self.statement(line_no, line.trim_end());
                    return Ok(());
                }
            }
        }

        let trimmed = line.trim_start();
        if trimmed.starts_with("##") {
            return Ok(());
        }
        if let Some(rest) = trimmed.strip_prefix("%%") {
            let indent = &line[..line.len() - trimmed.len()];
            self.text.push_str(indent);
            self.text.push('%');
            return self.text_segment(line_no, rest);
        }
        if let Some(control) = trimmed.strip_prefix('%') {
            self.code(line_no, control);
            return Ok(());
        }
        self.text_segment(line_no, line)
    }

    fn text_segment(&mut self, line_no: usize, segment: &str) -> TemplateResult<()> {
        let mut rest = segment;
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix("$${") {
                self.text.push_str("${");
                rest = after;
            } else if let Some(after) = rest.strip_prefix("${") {
                let end = find_expression_end(after).ok_or_else(|| {
                    TemplateError::Rendering(format!(
                        "Template error at line {}: unterminated ${{ expression",
                        line_no
                    ))
                })?;
                self.flush_text(line_no);
                self.statement(line_no, format!("emit_value({});", &after[..end]));
                rest = &after[end + 1..];
            } else if let Some(after) = rest.strip_prefix("<%") {
                self.flush_text(line_no);
                match after.find("%>") {
                    Some(end) => {
                        self.code(line_no, &after[..end]);
                        rest = &after[end + 2..];
                    }
                    None => {
                        self.in_block = true;
                        let code = after.trim_end();
                        if !code.trim().is_empty() {
                            self.statement(line_no, code);
                        }
                        return Ok(());
                    }
                }
            } else {
                let mut chars = rest.chars();
                if let Some(c) = chars.next() {
                    self.text.push(c);
                }
                rest = chars.as_str();
            }
        }
        self.flush_text(line_no);
        Ok(())
    }

    fn finish(mut self, last_line: usize) -> TemplateResult<CompiledTemplate> {
        if self.in_block {
            return Err(TemplateError::Rendering(format!(
                "Template error at line {}: unterminated <% block",
                last_line
            )));
        }
        self.flush_text(last_line);
        Ok(CompiledTemplate {
            script: self.lines.join("\n"),
            chunks: self.chunks,
            line_map: self.line_map,
        })
    }
}

/// Byte offset of the `}` closing an interpolation, skipping nested braces
/// and string literals.
fn find_expression_end(expr: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in expr.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '`' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn compile(source: &str) -> TemplateResult<CompiledTemplate> {
    let mut compiler = Compiler::default();
    let mut last_line = 1;
    for (index, line) in source.split_inclusive('\n').enumerate() {
        last_line = index + 1;
        compiler.line(last_line, line)?;
    }
    compiler.finish(last_line)
}

/// Format an interpolated value.
fn format_value(value: &Dynamic) -> ScriptResult<String> {
    if value.is_unit() {
        Ok(String::new())
    } else if value.is_array() || value.is_map() {
        let json: serde_json::Value = rhai::serde::from_dynamic(value)?;
        Ok(json.to_string())
    } else {
        Ok(value.to_string())
    }
}

/// Drop Rhai's `(line x, position y)` suffixes, which refer to the generated script.
fn strip_positions(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(start) = rest.find(" (line ") {
        out.push_str(&rest[..start]);
        match rest[start..].find(')') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = &rest[start..];
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

impl CompiledTemplate {
    /// Build a readable error with an excerpt of the offending template lines.
    fn error(&self, source: &str, message: &str, position: Position) -> TemplateError {
        let message = strip_positions(message);
        let Some(script_line) = position.line() else {
            return TemplateError::Rendering(format!("Template error: {}", message));
        };
        let Some(line_no) = self
            .line_map
            .get(script_line.saturating_sub(1))
            .or_else(|| self.line_map.last())
            .copied()
        else {
            return TemplateError::Rendering(format!("Template error: {}", message));
        };

        let lines: Vec<&str> = source.lines().collect();
        let first = line_no.saturating_sub(EXCERPT_CONTEXT).max(1);
        let last = (line_no + EXCERPT_CONTEXT).min(lines.len());
        let width = last.to_string().len();

        let mut excerpt = format!("Template error at line {}: {}", line_no, message);
        for n in first..=last {
            let marker = if n == line_no { ">" } else { " " };
            excerpt.push_str(&format!(
                "\n{} {:>width$} | {}",
                marker,
                n,
                lines[n - 1],
                width = width
            ));
        }
        TemplateError::Rendering(excerpt)
    }
}

fn build_engine(
    resolver: &Arc<ReferenceResolver>,
    buffer: &Rc<RefCell<String>>,
    chunks: Rc<Vec<String>>,
) -> Engine {
    let mut engine = Engine::new();

    let out = buffer.clone();
    engine.register_fn("emit_text", move |index: i64| {
        if let Some(chunk) = usize::try_from(index).ok().and_then(|i| chunks.get(i)) {
            out.borrow_mut().push_str(chunk);
        }
    });

    let out = buffer.clone();
    engine.register_fn("emit_value", move |value: Dynamic| -> ScriptResult<()> {
        let text = format_value(&value)?;
        out.borrow_mut().push_str(&text);
        Ok(())
    });

    engine
        .register_type_with_name::<ScriptUtils>("Utils")
        .register_fn("stack_output", ScriptUtils::stack_output)
        .register_fn("stack_resource", ScriptUtils::stack_resource)
        .register_fn("parameter", |u: &mut ScriptUtils, name: &str| u.parameter(name, false))
        .register_fn("parameter", ScriptUtils::parameter)
        .register_fn("azure_output", ScriptUtils::azure_output)
        .register_fn("gcp_output", ScriptUtils::gcp_output)
        .register_fn("call_aws", |u: &mut ScriptUtils, service: &str, action: &str| {
            u.call_aws(service, action, Map::new(), None)
        })
        .register_fn(
            "call_aws",
            |u: &mut ScriptUtils, service: &str, action: &str, arguments: Map| {
                u.call_aws(service, action, arguments, None)
            },
        )
        .register_fn(
            "call_aws",
            |u: &mut ScriptUtils, service: &str, action: &str, arguments: Map, filter: &str| {
                u.call_aws(service, action, arguments, Some(filter))
            },
        );

    // Free functions available to stack files.
    let r = resolver.clone();
    engine.register_fn("get_stack_output", move |stack: &str, output: &str| {
        r.stack_output(stack, output).map_err(script_error)
    });
    let r = resolver.clone();
    engine.register_fn("get_stack_resource", move |stack: &str, logical_id: &str| {
        r.stack_resource(stack, logical_id).map_err(script_error)
    });

    engine
}

/// Whether `name` can be used as a script variable.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name != "_" && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Render a scripted template with `params` in scope.
pub fn render_script(
    source: &str,
    params: &Mapping,
    resolver: &Arc<ReferenceResolver>,
) -> TemplateResult<String> {
    let compiled = compile(source)?;
    debug!(
        "Compiled template into {} script lines",
        compiled.line_map.len()
    );

    let buffer = Rc::new(RefCell::new(String::new()));
    let engine = build_engine(resolver, &buffer, Rc::new(compiled.chunks.clone()));

    let mut scope = Scope::new();
    for (key, value) in params {
        let Value::String(name) = key else {
            continue;
        };
        if !is_identifier(name) {
            debug!("Parameter {} is only reachable through params", name);
            continue;
        }
        let value = rhai::serde::to_dynamic(value)
            .map_err(|e| TemplateError::Rendering(format!("Invalid parameter {}: {}", name, e)))?;
        scope.push_dynamic(name.as_str(), value);
    }
    let all = rhai::serde::to_dynamic(params)
        .map_err(|e| TemplateError::Rendering(format!("Invalid parameters: {}", e)))?;
    scope.push_dynamic("params", all);
    scope.push("utils", ScriptUtils::new(resolver.clone()));

    let ast = engine
        .compile(&compiled.script)
        .map_err(|e| compiled.error(source, &e.to_string(), e.position()))?;
    engine
        .run_ast_with_scope(&mut scope, &ast)
        .map_err(|e| compiled.error(source, &e.to_string(), e.position()))?;

    let rendered = buffer.borrow().clone();
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_providers::MockCloud;

    fn params(text: &str) -> Mapping {
        serde_yaml::from_str(text).unwrap()
    }

    fn render(source: &str, params_text: &str) -> TemplateResult<String> {
        let resolver = Arc::new(ReferenceResolver::new(MockCloud::new().context()));
        render_script(source, &params(params_text), &resolver)
    }

    #[test]
    fn test_interpolation() {
        let out = render("Name: ${name}\nId: ${build_id}\n", "name: web\nbuild_id: '42'").unwrap();
        assert_eq!(out, "Name: web\nId: 42\n");
    }

    #[test]
    fn test_control_lines() {
        let source = "Zones:\n% for zone in zones {\n  - ${zone}\n% }\n";
        let out = render(source, "zones: [a, b]").unwrap();
        assert_eq!(out, "Zones:\n  - a\n  - b\n");
    }

    #[test]
    fn test_conditionals() {
        let source = "% if public {\nScheme: internet-facing\n% } else {\nScheme: internal\n% }\n";
        assert_eq!(render(source, "public: true").unwrap(), "Scheme: internet-facing\n");
        assert_eq!(render(source, "public: false").unwrap(), "Scheme: internal\n");
    }

    #[test]
    fn test_comments_and_escapes() {
        let source = "## dropped\n%% literal\nName: !Sub '$${AWS::StackName}-web'\n";
        let out = render(source, "{}").unwrap();
        assert_eq!(out, "% literal\nName: !Sub '${AWS::StackName}-web'\n");
    }

    #[test]
    fn test_code_blocks() {
        let source = "<% let greeting = \"hello \" + name; %>\nMessage: ${greeting}\n<%\nlet shout = greeting.to_upper();\n%>Loud: ${shout}\n";
        let out = render(source, "name: web").unwrap();
        assert_eq!(out, "\nMessage: hello web\nLoud: HELLO WEB\n");
    }

    #[test]
    fn test_collections_interpolate_as_json() {
        let out = render("Zones: ${zones}\nTags: ${tags}\n", "zones: [a, b]\ntags: {team: ops}").unwrap();
        assert_eq!(out, "Zones: [\"a\",\"b\"]\nTags: {\"team\":\"ops\"}\n");
    }

    #[test]
    fn test_params_map_and_odd_names() {
        let out = render("Value: ${params[\"my-key\"]}\n", "my-key: x").unwrap();
        assert_eq!(out, "Value: x\n");
    }

    #[test]
    fn test_braces_inside_expressions() {
        let out = render("Value: ${\"a}\" + \"{b\"}\n", "{}").unwrap();
        assert_eq!(out, "Value: a}{b\n");
        assert_eq!(find_expression_end("#{a: 1}.a} rest"), Some(9));
    }

    #[test]
    fn test_utils_object() {
        let cloud = MockCloud::new()
            .with_stack_outputs("net", &[("VpcId", "vpc-1")])
            .with_stack_resource("net", "Vpc", "vpc-123");
        let resolver = Arc::new(ReferenceResolver::new(cloud.context()));
        let source = "VpcId: ${utils.stack_output(\"net\", \"VpcId\")}\nVpc: ${get_stack_resource(\"net\", \"Vpc\")}\n";

        let out = render_script(source, &Mapping::new(), &resolver).unwrap();
        assert_eq!(out, "VpcId: vpc-1\nVpc: vpc-123\n");
    }

    #[test]
    fn test_runtime_error_excerpt() {
        let source = "a: 1\nb: 2\nc: ${missing_var}\nd: 4\ne: 5\nf: 6\n";
        let err = render(source, "{}").unwrap_err();
        let message = err.to_string();

        assert!(message.starts_with("Template error at line 3:"), "{}", message);
        assert!(message.contains("missing_var"));
        assert!(message.contains("> 3 | c: ${missing_var}"));
        assert!(message.contains("  1 | a: 1"));
        assert!(message.contains("  5 | e: 5"));
        assert!(!message.contains("f: 6"));
        assert!(!message.contains("position"));
    }

    #[test]
    fn test_syntax_error_excerpt() {
        let source = "a: 1\nb: ${1 +}\nc: 3\n";
        let err = render(source, "{}").unwrap_err();
        assert!(err.to_string().contains("> 2 | b: ${1 +}"), "{}", err);
    }

    #[test]
    fn test_unterminated_expression() {
        let err = render("a: ${oops\n", "{}").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_identifier_check() {
        assert!(is_identifier("build_id"));
        assert!(is_identifier("_private"));
        assert!(!is_identifier("my-key"));
        assert!(!is_identifier("9lives"));
        assert!(!is_identifier("_"));
    }
}
