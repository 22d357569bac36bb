//! Reading and rendering stack files.

use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};
use tracing::debug;

use cumulus_stacks::Session;
use cumulus_templates::TemplateEngine;

use super::StackArgs;

/// The source name that reads the stack from stdin.
pub const STDIN: &str = "-";

/// Engine for the stack source: `-t` for stdin, the file extension otherwise.
pub fn engine_for(args: &StackArgs) -> Result<TemplateEngine> {
    let engine = if args.stack == STDIN {
        TemplateEngine::from_name(&args.templating_engine)?
    } else {
        TemplateEngine::from_path(&args.stack)?
    };
    Ok(engine)
}

/// Read the stack source text.
pub fn read_source(source: &str) -> Result<String> {
    if source == STDIN {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read the stack from stdin")?;
        return Ok(text);
    }
    fs::read_to_string(source).with_context(|| format!("Failed to read stack file {}", source))
}

/// Render stack text into its attributes, stamped with the build id.
pub fn render_stack(
    session: &Session,
    text: &str,
    engine: TemplateEngine,
    build_id: &str,
) -> Result<Mapping> {
    debug!("Rendering stack file with the {} engine", engine);
    let mut params = Mapping::new();
    params.insert(Value::from("build_id"), Value::from(build_id));

    let mut attributes = session
        .renderer
        .render_document(text, engine, &params)
        .context("Failed to render the stack file")?;
    attributes.insert(Value::from("BuildId"), Value::from(build_id));
    Ok(attributes)
}
