//! # tiller
//!
//! The core engine for interactive, hierarchical command-line tools.
//! Commands live in a logical tree served by a [`ModuleLoader`]; an
//! invocation is resolved against that tree into a middleware chain,
//! its options are parsed against the merged schema, and each handler
//! runs in turn with cooperative `next`/`end` control flow. Plugins and
//! lifecycle hooks can observe or alter every stage.
//!
//! ```no_run
//! use std::rc::Rc;
//! use tiller::{run, CommandModule, OptionDecl, RunParams, StaticLoader};
//!
//! let loader = Rc::new(StaticLoader::new().module(
//!     "hello",
//!     CommandModule::new(|step| {
//!         let name = step.option("name")?.unwrap();
//!         step.end_with(format!("Hi {}", name))?;
//!         Ok(())
//!     })
//!     .option("name", OptionDecl::string().required()),
//! ));
//!
//! let params = RunParams {
//!     commands_dir: Some("commands".into()),
//!     ..RunParams::default()
//! };
//! match run(loader, params) {
//!     Ok(result) => {
//!         if let Some(value) = result {
//!             println!("{}", value);
//!         }
//!     }
//!     Err(error) => std::process::exit(tiller::run::report(&error)),
//! }
//! ```

pub mod constants;
pub mod core;
pub mod errors;
pub mod models;
pub mod plugins;
pub mod run;
pub mod state;
pub mod system;

pub use crate::core::context::{Context, ParseFn, ResolveFn};
pub use crate::core::hooks::{Hook, HookArgs, HookEvent, HookId, HookRegistry};
pub use crate::core::options::OptionQuery;
pub use crate::core::parser::ParseOptions;
pub use crate::core::tokens::{join_tokens, split_tokens, JoinOptions, Token};
pub use crate::errors::{ClientError, CliError, UsageError};
pub use crate::models::{
    CommandModule, Handler, OptionDecl, OptionKind, OptionValues, OptionsConfig, ParamValue,
    Params, ParsedInput, PromptKind, PromptRequest, ResolvedCommand, Validator, Value,
};
pub use crate::plugins::help::help_plugin;
pub use crate::plugins::logger::logger_plugin;
pub use crate::plugins::{Plugin, PluginInfo};
pub use crate::run::{run, RunParams};
pub use crate::state::{State, StateChanges, Status, Step};
pub use crate::system::client::{Client, ConsoleClient, ScriptedClient};
pub use crate::system::loader::{ModuleLoader, StaticLoader};
