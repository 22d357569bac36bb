//! cumulus CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or stack configuration
//! - 3: Validation failure
//! - 4: Template error
//! - 5: Provider error
//! - a failing shell command's own exit code

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cumulus_providers::ProviderError;
use cumulus_stacks::StackError;
use cumulus_templates::TemplateError;

mod commands;

use commands::Cli;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const TEMPLATE_ERROR: u8 = 4;
    pub const PROVIDER_ERROR: u8 = 5;
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match commands::run::execute(cli.command) {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(categorize_error(&e))
        }
    }
}

/// Logs go to stderr so rendered output stays clean. `RUST_LOG` wins over
/// the command line levels.
fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(log_directives(
            cli.loglevel.as_str(),
            cli.provider_loglevel.as_str(),
        ))
    });

    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

fn log_directives(level: &str, provider_level: &str) -> String {
    format!(
        "error,cumulus_cli={level},cumulus_stacks={level},cumulus_templates={level},cumulus_providers={provider_level}"
    )
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<StackError>() {
            return stack_exit_code(err);
        }
        if cause.is::<TemplateError>() {
            return ExitCodes::TEMPLATE_ERROR;
        }
        if cause.is::<ProviderError>() {
            return ExitCodes::PROVIDER_ERROR;
        }
    }
    ExitCodes::GENERAL_ERROR
}

fn stack_exit_code(err: &StackError) -> u8 {
    match err {
        StackError::CommandFailed { code, .. } => u8::try_from(*code)
            .ok()
            .filter(|code| *code != 0)
            .unwrap_or(ExitCodes::GENERAL_ERROR),
        StackError::ValidationFailed(_) => ExitCodes::VALIDATION_FAILURE,
        StackError::Template(_) => ExitCodes::TEMPLATE_ERROR,
        StackError::Provider(_) | StackError::AlreadyExists(_) | StackError::DoesNotExist(_) => {
            ExitCodes::PROVIDER_ERROR
        }
        StackError::UnknownType(_)
        | StackError::MissingBuildId
        | StackError::MissingField { .. }
        | StackError::InvalidField { .. }
        | StackError::ConflictingFields { .. }
        | StackError::UnsupportedOperation { .. }
        | StackError::MissingAction(_)
        | StackError::EmptyCommands(_) => ExitCodes::INVALID_ARGS,
        _ => ExitCodes::GENERAL_ERROR,
    }
}
