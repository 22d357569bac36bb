//! Local shell command stacks.
//!
//! For resources no provider manages, a stack can run local commands per
//! action:
//!
//! ```yaml
//! StackType: Shell
//! Shell: /bin/bash
//! Environment:
//!   AWS_DEFAULT_REGION: us-west-2
//! Actions:
//!   Create:
//!     Environment:
//!       KMS_KEY: !Cloudformation {stack: kms, output: KeyArn}
//!     Commands: |
//!       ./create.sh "$KMS_KEY"
//!   Delete:
//!     Commands: [./delete.sh, --force]
//! ```
//!
//! String commands run through the shell; lists run directly.

use std::collections::BTreeMap;
use std::process::Command;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tracing::{error, info};

use crate::document::{scalar_string, StackDocument};
use crate::error::{StackError, StackResult};
use crate::lifecycle::{Lifecycle, LifecycleOptions};
use crate::session::Session;
use crate::stack_type::StackType;

pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Commands of an action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Commands {
    /// Run through the stack's shell.
    Script(String),
    /// Run directly, first element is the program.
    Args(Vec<String>),
}

impl Commands {
    fn is_empty(&self) -> bool {
        match self {
            Commands::Script(script) => script.trim().is_empty(),
            Commands::Args(args) => args.is_empty(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Commands::Script(script) => script.trim().to_string(),
            Commands::Args(args) => args.join(" "),
        }
    }
}

/// One entry under `Actions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShellAction {
    #[serde(rename = "Commands")]
    pub commands: Commands,
    #[serde(rename = "Environment", skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

/// A stack whose lifecycle runs local commands.
#[derive(Debug, Clone)]
pub struct ShellStack {
    name: Option<String>,
    build_id: String,
    shell: String,
    environment: BTreeMap<String, String>,
    actions: BTreeMap<String, ShellAction>,
}

impl ShellStack {
    pub fn from_document(_session: &Session, mut doc: StackDocument) -> StackResult<Self> {
        let Value::Mapping(declared) = doc.take_required("Actions")? else {
            return Err(StackError::invalid("Actions", "expected a mapping"));
        };
        let mut actions = BTreeMap::new();
        for (name, action) in &declared {
            let name = scalar_string(name)
                .ok_or_else(|| StackError::invalid("Actions", "action names must be strings"))?;
            let action = parse_action(&name, action)?;
            actions.insert(name, action);
        }

        let shell = match doc.take("Shell") {
            Some(shell) => scalar_string(&shell)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SHELL.to_string()),
            None => DEFAULT_SHELL.to_string(),
        };
        let environment = match doc.take("Environment") {
            Some(Value::Mapping(env)) => environment_map("Environment", &env)?,
            Some(Value::Null) | None => BTreeMap::new(),
            Some(_) => return Err(StackError::invalid("Environment", "expected a mapping")),
        };

        Ok(Self {
            name: doc.name,
            build_id: doc.build_id,
            shell,
            environment,
            actions,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    pub fn action(&self, name: &str) -> Option<&ShellAction> {
        self.actions.get(name)
    }

    /// Build the process for an action: stack environment, then action
    /// environment, then `BUILD_ID`, over the inherited environment.
    pub fn command(&self, action: &str) -> StackResult<Command> {
        let spec = self
            .actions
            .get(action)
            .ok_or_else(|| StackError::MissingAction(action.to_string()))?;
        if spec.commands.is_empty() {
            return Err(StackError::EmptyCommands(action.to_string()));
        }

        let mut command = match &spec.commands {
            Commands::Script(script) => {
                let mut command = Command::new(&self.shell);
                command.arg("-c").arg(script);
                command
            }
            Commands::Args(args) => {
                let mut command = Command::new(&args[0]);
                command.args(&args[1..]);
                command
            }
        };
        command
            .envs(&self.environment)
            .envs(&spec.environment)
            .env("BUILD_ID", &self.build_id);
        Ok(command)
    }

    /// Run an action, failing with the child's exit code.
    pub fn execute(&self, action: &str) -> StackResult<()> {
        let mut command = self.command(action)?;
        let description = self
            .actions
            .get(action)
            .map(|spec| spec.commands.describe())
            .unwrap_or_default();
        info!(
            "Running {} action of {}",
            action,
            self.name.as_deref().unwrap_or("shell stack")
        );

        let status = command.status().map_err(|source| StackError::Spawn {
            command: description.clone(),
            source,
        })?;
        if !status.success() {
            let code = status.code().unwrap_or(1);
            error!("Command {} exited with return code {}", description, code);
            return Err(StackError::CommandFailed {
                command: description,
                code,
            });
        }
        Ok(())
    }
}

impl Lifecycle for ShellStack {
    fn stack_type(&self) -> StackType {
        StackType::Shell
    }

    fn validate(&self, _session: &Session) -> StackResult<()> {
        Err(self.unsupported("validate"))
    }

    fn create(&self, _session: &Session, _options: LifecycleOptions) -> StackResult<()> {
        self.execute("Create")
    }

    fn update(&self, _session: &Session, _options: LifecycleOptions) -> StackResult<()> {
        self.execute("Update")
    }

    fn delete(&self, _session: &Session, _options: LifecycleOptions) -> StackResult<()> {
        self.execute("Delete")
    }

    fn render(&self) -> StackResult<String> {
        Ok(serde_yaml::to_string(&self.actions)?)
    }
}

fn parse_action(name: &str, action: &Value) -> StackResult<ShellAction> {
    let field = format!("Actions.{}", name);
    let Value::Mapping(action) = action else {
        return Err(StackError::invalid(&field, "expected a mapping"));
    };

    let commands = match action.get("Commands") {
        Some(Value::String(script)) => Commands::Script(expand_vars(script)),
        Some(Value::Sequence(args)) => Commands::Args(
            args.iter()
                .map(|arg| {
                    scalar_string(arg)
                        .ok_or_else(|| StackError::invalid(&field, "command arguments must be scalars"))
                })
                .collect::<StackResult<_>>()?,
        ),
        Some(Value::Null) | None => Commands::Args(Vec::new()),
        Some(_) => {
            return Err(StackError::invalid(
                &field,
                "Commands must be a non-empty list or string",
            ))
        }
    };
    let environment = match action.get("Environment") {
        Some(Value::Mapping(env)) => environment_map(&field, env)?,
        Some(Value::Null) | None => BTreeMap::new(),
        Some(_) => return Err(StackError::invalid(&field, "Environment must be a mapping")),
    };

    Ok(ShellAction {
        commands,
        environment,
    })
}

fn environment_map(field: &str, env: &Mapping) -> StackResult<BTreeMap<String, String>> {
    env.iter()
        .map(|(key, value)| -> StackResult<(String, String)> {
            let key = scalar_string(key)
                .ok_or_else(|| StackError::invalid(field, "variable names must be strings"))?;
            let value = scalar_string(value).ok_or_else(|| {
                StackError::invalid(field, format!("value of {} must be a scalar", key))
            })?;
            Ok((key, value))
        })
        .collect()
}

/// Expand `$VAR` and `${VAR}` from the process environment. Unknown
/// variables are left as written.
pub fn expand_vars(text: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"\$(?:([A-Za-z0-9_]+)|\{([^}]*)\})").expect("variable pattern is valid")
    });
    pattern
        .replace_all(text, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}
