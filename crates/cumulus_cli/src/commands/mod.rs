//! CLI command definitions.
//!
//! Every subcommand takes the same stack source and flags and maps to one
//! lifecycle operation of the stack it describes.

use clap::{Args, Parser, Subcommand, ValueEnum};

pub mod prompt;
pub mod run;
pub mod stack_file;

/// cumulus - multi-cloud stack deployments
#[derive(Parser)]
#[command(name = "cumulus")]
#[command(version, about = "Deploy AWS, Azure, GCP and shell stacks from templated stack files")]
#[command(long_about = r#"
cumulus renders a templated stack file, builds the stack it describes and
runs one lifecycle operation against the matching cloud provider.

ACTIONS:
  create    → Create the stack
  update    → Update the stack (optionally reviewing a change set)
  delete    → Delete the stack
  upsert    → Update the stack, creating it when missing
  list      → Show the stack name and type
  render    → Print the stack attributes and the final template
  validate  → Validate the stack template with the provider

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or stack configuration
  3 - Validation failure
  4 - Template error
  5 - Provider error
  A failing shell command exits with the command's own code.
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log level for cumulus itself
    #[arg(short = 'l', long, global = true, value_enum, default_value_t = LogLevel::Error)]
    pub loglevel: LogLevel,

    /// Log level for the provider clients
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Error)]
    pub provider_loglevel: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the stack
    Create(StackArgs),

    /// Update the stack
    Update(ReviewArgs),

    /// Delete the stack
    Delete(StackArgs),

    /// Update the stack, or create it when it does not exist
    Upsert(ReviewArgs),

    /// Show the stack name and type
    List(StackArgs),

    /// Print the stack attributes and the final template
    Render(StackArgs),

    /// Validate the stack template
    Validate(StackArgs),
}

impl Commands {
    /// Split into the lifecycle action, the shared arguments and the review flag.
    pub fn into_parts(self) -> (Action, StackArgs, bool) {
        match self {
            Commands::Create(args) => (Action::Create, args, false),
            Commands::Update(args) => (Action::Update, args.stack, args.review),
            Commands::Delete(args) => (Action::Delete, args, false),
            Commands::Upsert(args) => (Action::Upsert, args.stack, args.review),
            Commands::List(args) => (Action::List, args, false),
            Commands::Render(args) => (Action::Render, args, false),
            Commands::Validate(args) => (Action::Validate, args, false),
        }
    }
}

/// Lifecycle operation requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
    Upsert,
    List,
    Render,
    Validate,
}

/// Arguments shared by every action.
#[derive(Args, Debug, Clone)]
pub struct StackArgs {
    /// Path to the stack file. Use - for stdin, in which case -t selects the engine
    pub stack: String,

    /// Templating engine for a stack read from stdin
    #[arg(short = 't', long, default_value = "mako", value_parser = ["mako", "jinja", "yaml"])]
    pub templating_engine: String,

    /// Wait for the stack to be ready or deleted before exiting
    #[arg(short, long)]
    pub wait: bool,

    /// The build id
    #[arg(short, long, env = "BUILD_ID")]
    pub build_id: Option<String>,
}

/// Arguments of actions that can review changes first.
#[derive(Args, Debug, Clone)]
pub struct ReviewArgs {
    #[command(flatten)]
    pub stack: StackArgs,

    /// Review the change set before applying it
    #[arg(short, long)]
    pub review: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_flag_on_update() {
        let cli = Cli::parse_from(["cumulus", "update", "stack.mako", "-r", "-w", "-b", "7"]);
        let (action, args, review) = cli.command.into_parts();
        assert_eq!(action, Action::Update);
        assert!(review);
        assert!(args.wait);
        assert_eq!(args.build_id.as_deref(), Some("7"));
        assert_eq!(args.templating_engine, "mako");
    }

    #[test]
    fn test_review_not_accepted_on_create() {
        assert!(Cli::try_parse_from(["cumulus", "create", "stack.mako", "-r"]).is_err());
    }

    #[test]
    fn test_global_log_levels() {
        let cli = Cli::try_parse_from([
            "cumulus",
            "render",
            "-",
            "-t",
            "yaml",
            "--loglevel",
            "debug",
            "--provider-loglevel",
            "info",
        ])
        .unwrap();
        assert_eq!(cli.loglevel, LogLevel::Debug);
        assert_eq!(cli.provider_loglevel, LogLevel::Info);
        let (action, args, _) = cli.command.into_parts();
        assert_eq!(action, Action::Render);
        assert_eq!(args.stack, "-");
        assert_eq!(args.templating_engine, "yaml");
    }

    #[test]
    fn test_unknown_engine_rejected() {
        assert!(Cli::try_parse_from(["cumulus", "create", "-", "-t", "erb"]).is_err());
    }
}
