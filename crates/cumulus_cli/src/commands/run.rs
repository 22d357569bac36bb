//! Lifecycle driver: render the stack file, build the stack, run the action.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use serde_yaml::Mapping;
use tracing::info;

use cumulus_providers::{ProviderContext, ProviderOptions};
use cumulus_stacks::{factory, LifecycleOptions, Session, StackError};

use super::prompt::PromptDecider;
use super::stack_file::{engine_for, read_source, render_stack};
use super::{Action, Commands, StackArgs};

/// Run a parsed command against the real providers.
pub fn execute(command: Commands) -> Result<()> {
    let (action, args, review) = command.into_parts();
    let build_id = build_id(&args)?;

    let engine = engine_for(&args)?;
    let text = read_source(&args.stack)?;

    let providers = ProviderContext::from_options(ProviderOptions::default())?;
    let session = Session::new(providers, Arc::new(PromptDecider::stdio()));
    let attributes = render_stack(&session, &text, engine, &build_id)?;

    let options = LifecycleOptions::new().wait(args.wait).review(review);
    let stdout = io::stdout();
    run(&session, action, attributes, options, &mut stdout.lock())
}

/// The build id from `-b` or `BUILD_ID`. It must not be empty.
pub fn build_id(args: &StackArgs) -> Result<String, StackError> {
    args.build_id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or(StackError::MissingBuildId)
}

/// Build the stack from its rendered attributes and run `action` on it.
pub fn run(
    session: &Session,
    action: Action,
    attributes: Mapping,
    options: LifecycleOptions,
    out: &mut impl Write,
) -> Result<()> {
    let summary = serde_yaml::to_string(&attributes)?;
    let stack = factory(session, attributes)?;
    let name = stack.name().unwrap_or("-").to_string();
    info!("Running {:?} on {} stack {}", action, stack.stack_type(), name);

    match action {
        Action::Create => stack.create(session, options)?,
        Action::Update => stack.update(session, options)?,
        Action::Delete => stack.delete(session, options)?,
        Action::Upsert => stack.upsert(session, options)?,
        Action::Validate => stack.validate(session)?,
        Action::List => writeln!(out, "{}\t{}", name, stack.stack_type())?,
        Action::Render => {
            writeln!(out, "===> Stack Attributes:")?;
            writeln!(out, "{}", summary)?;
            writeln!(out, "===> Final Template:")?;
            writeln!(out, "{}", stack.render()?)?;
        }
    }
    Ok(())
}
