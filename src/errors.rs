// src/errors.rs

use std::path::PathBuf;

use thiserror::Error;

/// The top-level error type of the engine.
///
/// Every failure raised by the orchestrator funnels through
/// [`Context::throw`](crate::core::context::Context::throw) before it
/// propagates, which gives `BeforeError` hooks a chance to replace or
/// suppress it. Handler and hook bodies return `anyhow::Result`; their
/// errors fold into the `Handler`/`Hook` variants at the engine boundary.
#[derive(Debug, Error)]
pub enum CliError {
    /// A recoverable user mistake: bad flags, missing choice, conflicts.
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// Empty invocation with no default command configured.
    #[error("no command was provided and no default command is configured")]
    CommandRequired,

    /// The resolver could not match a token against the module tree.
    #[error("unknown command '{name}' (searched in '{}')", .dir.display())]
    NotFound { name: String, dir: PathBuf },

    /// The loader found something at the path but it was not a command.
    #[error("the module at '{}' did not provide a command", .path.display())]
    MissingModule { path: PathBuf },

    /// A terminal command declared `requires_subcommand`.
    #[error("command '{name}' requires a subcommand")]
    SubcommandRequired { name: String },

    /// Plugin registration or initialization failed.
    #[error("plugin '{name}': {message}")]
    Plugin { name: String, message: String },

    /// The default command-root lookup exhausted its candidates.
    #[error("no command root found; tried: {}", .attempted.iter().map(|p| format!("'{}'", p.display())).collect::<Vec<_>>().join(", "))]
    CommandsDirNotFound { attempted: Vec<PathBuf> },

    /// A failure the client has already reported to the user.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A command handler returned an error.
    #[error("command '{command}' failed: {source}")]
    Handler {
        command: String,
        #[source]
        source: anyhow::Error,
    },

    /// A hook handler returned an error.
    #[error("hook '{hook}' failed: {source}")]
    Hook {
        hook: String,
        #[source]
        source: anyhow::Error,
    },

    /// Anything else, preserving the original cause chain.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Folds an error raised inside a hook body into the taxonomy. A hook
    /// that deliberately raised a `CliError` keeps its identity; anything
    /// else is wrapped with the hook name for context.
    pub(crate) fn from_hook(hook: &str, error: anyhow::Error) -> Self {
        match error.downcast::<CliError>() {
            Ok(cli) => cli,
            Err(other) => CliError::Hook {
                hook: hook.to_string(),
                source: other,
            },
        }
    }

    /// Folds an error raised inside a command handler into the taxonomy.
    pub(crate) fn from_handler(command: &str, error: anyhow::Error) -> Self {
        match error.downcast::<CliError>() {
            Ok(cli) => cli,
            Err(other) => CliError::Handler {
                command: command.to_string(),
                source: other,
            },
        }
    }

    /// `true` for errors a user can recover from by fixing the invocation.
    pub fn is_usage(&self) -> bool {
        matches!(self, CliError::Usage(_))
    }
}

/// Recoverable invocation mistakes. These carry the offending key so that
/// diagnostics (and the help plugin) can point at the right flag.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UsageError {
    #[error("unknown option '{flag}'")]
    UnknownOption { flag: String },

    #[error("option '--{key}' expects a value")]
    MissingValue { key: String },

    #[error("option '--{key}' expects a number, got '{value}'")]
    NotANumber { key: String, value: String },

    #[error("option '--{key}' must be one of [{allowed}], got '{value}'")]
    InvalidChoice {
        key: String,
        value: String,
        allowed: String,
    },

    #[error("option '--{key}' cannot be combined with '--{other}'")]
    Conflict { key: String, other: String },

    #[error("option '--{key}' also requires '--{other}'")]
    MissingPeer { key: String, other: String },

    #[error("option '--{key}' is required")]
    MissingRequired { key: String },

    #[error("invalid value for '--{key}': {message}")]
    Invalid { key: String, message: String },

    #[error("'{name}' is not a valid command name")]
    InvalidCommandName { name: String },
}

/// Errors raised by the I/O client.
///
/// `Reported` marks an error that has already been shown to the user; the
/// run facade treats it as terminal output, not as a failure to re-print.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("user interface error: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("operation cancelled by user")]
    Cancelled,

    #[error("cannot prompt: client is not interactive")]
    NotInteractive,

    #[error("{0}")]
    Reported(String),
}
