//! # Run Facade
//!
//! The single-shot entry point an embedding binary calls: derive the
//! command string from the process arguments, pick the command root, wire
//! up a [`Context`] with the configured client and plugins, prepare,
//! execute, and translate the outcome.
//!
//! Errors the client has already reported surface as the Context's result
//! rather than as a second failure; everything else propagates as a
//! [`CliError`] for the binary to report (see [`report`]).

use std::path::{Path, PathBuf};
use std::rc::Rc;

use colored::Colorize;

use crate::constants::{DEFAULT_COMMANDS_DIR, LOG_TARGET};
use crate::core::context::Context;
use crate::core::tokens;
use crate::errors::CliError;
use crate::models::Value;
use crate::plugins::Plugin;
use crate::system::client::{Client, ConsoleClient};
use crate::system::loader::ModuleLoader;

/// Configuration for one [`run`] invocation. Everything is optional; the
/// zero value runs the process arguments against the default command-root
/// lookup with a terminal client and no plugins.
#[derive(Default)]
pub struct RunParams {
    /// The command string. Defaults to the process arguments, joined.
    pub command: Option<String>,
    /// The command root. Defaults to the lookup `<cwd>/commands`, then
    /// `<caller_dir>/commands`.
    pub commands_dir: Option<PathBuf>,
    /// Opaque hint for the default command-root lookup.
    pub caller_dir: Option<PathBuf>,
    /// Substituted when the command is empty or starts with a flag.
    pub default_command: Option<String>,
    /// Seed data for the middleware chain.
    pub initial_data: Option<Value>,
    /// Plugins, registered in order.
    pub plugins: Vec<Plugin>,
    /// I/O client. Defaults to the terminal-backed [`ConsoleClient`].
    pub client: Option<Rc<dyn Client>>,
}

/// Runs one invocation against `loader` and returns the final data value.
pub fn run(loader: Rc<dyn ModuleLoader>, params: RunParams) -> Result<Option<Value>, CliError> {
    let RunParams {
        command,
        commands_dir,
        caller_dir,
        default_command,
        initial_data,
        plugins,
        client,
    } = params;

    let mut command = command.unwrap_or_else(argv_command);
    if let Some(default) = default_command {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            command = default;
        } else if trimmed.starts_with('-') {
            command = format!("{} {}", default, trimmed);
        }
    }
    log::debug!(target: LOG_TARGET, "running '{}'", command);

    let commands_dir = match commands_dir {
        Some(dir) => dir,
        None => resolve_commands_dir(loader.as_ref(), caller_dir.as_deref())?,
    };
    let client: Rc<dyn Client> = client.unwrap_or_else(|| Rc::new(ConsoleClient::new()));

    let mut context = Context::new(command, commands_dir, client, loader);
    for plugin in plugins {
        context.register_plugin(plugin)?;
    }

    if let Err(error) = context.prepare() {
        return finish(context, Err(error));
    }
    let outcome = context.execute(initial_data);
    finish(context, outcome)
}

fn finish(
    mut context: Context,
    outcome: Result<Option<Value>, CliError>,
) -> Result<Option<Value>, CliError> {
    match outcome {
        Ok(result) => Ok(result),
        Err(CliError::Client(error)) => {
            // Already on the user's screen; the run is over, not broken.
            log::debug!(target: LOG_TARGET, "client already reported: {}", error);
            Ok(context.take_result())
        }
        Err(error) => Err(error),
    }
}

/// The process arguments (minus the binary name) as a command string,
/// quoting tokens that contain the delimiter.
fn argv_command() -> String {
    let args: Vec<String> = std::env::args().skip(1).collect();
    tokens::join(&args)
}

/// The default command-root lookup: `<cwd>/commands`, then
/// `<caller_dir>/commands`. Fails with the full list of attempted paths.
fn resolve_commands_dir(
    loader: &dyn ModuleLoader,
    caller_dir: Option<&Path>,
) -> Result<PathBuf, CliError> {
    let mut attempted = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        let candidate = dunce::simplified(&cwd).join(DEFAULT_COMMANDS_DIR);
        if loader.is_dir(&candidate) {
            return Ok(candidate);
        }
        attempted.push(candidate);
    }
    if let Some(caller) = caller_dir {
        let candidate = caller.join(DEFAULT_COMMANDS_DIR);
        if loader.is_dir(&candidate) {
            return Ok(candidate);
        }
        attempted.push(candidate);
    }

    Err(CliError::CommandsDirNotFound { attempted })
}

/// Prints an error the way a terminal binary should (message plus cause
/// chain) and returns the exit code to use: usage mistakes and failures
/// both map to 1; success paths never reach here.
pub fn report(error: &CliError) -> i32 {
    eprintln!("\n{}: {}", "Error".red().bold(), error);
    let mut cause = std::error::Error::source(error);
    if cause.is_some() {
        eprintln!("\nCaused by:");
    }
    let mut depth = 0;
    while let Some(current) = cause {
        eprintln!("   {}: {}", depth, current);
        cause = current.source();
        depth += 1;
    }
    1
}
