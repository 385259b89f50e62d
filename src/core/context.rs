//! # Execution Context
//!
//! The lifecycle orchestrator for one invocation. A `Context` is created
//! with a command string, a command root, a client and a loader; `prepare`
//! takes it through plugin initialization, hooked resolution and hooked
//! parsing; `execute` walks the resolved queue through a fresh
//! [`State`](crate::state::State).
//!
//! ## Lifecycle
//!
//! ```text
//! prepare:  init plugins -> [beforeResolve -> resolve]* -> afterResolve
//!           -> beforeParse -> parse -> afterParse -> ready
//! execute:  beforeExecute -> [beforeCommand -> handler -> afterCommand]*
//!           -> [beforeEnd] -> afterExecute
//! ```
//!
//! `prepare` is idempotent; after it completes the configuration is
//! logically frozen. Every error the orchestrator raises funnels through
//! [`Context::throw`], where `beforeError` hooks may replace or suppress
//! it; a suppressed error leaves the phase in its current state and the
//! lifecycle continues.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::constants::LOG_TARGET;
use crate::core::hooks::{
    ErrorEvent, ExecuteEvent, ExecutedEvent, ExitEvent, Hook, HookArgs, HookEvent, HookRegistry,
    ParseEvent, ParsedEvent, ResolveEvent, ResolvedEvent,
};
use crate::core::parser::{self, ParseOptions};
use crate::core::{resolver, tokens};
use crate::errors::{CliError, UsageError};
use crate::models::{
    OptionDecl, OptionsConfig, OptionValues, ParsedInput, ResolvedCommand, Value,
};
use crate::plugins::{Plugin, PluginInfo};
use crate::state::State;
use crate::system::client::Client;
use crate::system::loader::ModuleLoader;

/// Replaceable resolution step. The engine reads this through an
/// indirection on every step, so plugins may swap it at init or from a
/// `beforeResolve` hook.
pub type ResolveFn =
    Rc<dyn Fn(&str, &Path, &Context) -> Result<ResolvedCommand, CliError>>;

/// Replaceable parser, read through an indirection on every parse.
pub type ParseFn =
    Rc<dyn Fn(&str, &OptionsConfig, &ParseOptions) -> Result<ParsedInput, UsageError>>;

fn default_resolve_fn() -> ResolveFn {
    Rc::new(|input, dir, context| resolver::resolve_step(input, dir, context.loader().as_ref()))
}

fn default_parse_fn() -> ParseFn {
    Rc::new(|input, schema, options| parser::parse(input, schema, options))
}

/// Process-scoped orchestrator for a single invocation.
pub struct Context {
    command_string: String,
    commands_dir: PathBuf,
    client: Rc<dyn Client>,
    loader: Rc<dyn ModuleLoader>,
    hooks: HookRegistry,
    plugin_defs: Vec<Plugin>,
    plugin_infos: Vec<PluginInfo>,
    options: OptionsConfig,
    option_values: OptionValues,
    tokens: Vec<String>,
    queue: Vec<ResolvedCommand>,
    result: Option<Value>,
    is_resolved: bool,
    is_parsed: bool,
    is_ready: bool,
    resolve_fn: ResolveFn,
    parse_fn: ParseFn,
}

impl Context {
    pub fn new(
        command_string: impl Into<String>,
        commands_dir: impl Into<PathBuf>,
        client: Rc<dyn Client>,
        loader: Rc<dyn ModuleLoader>,
    ) -> Self {
        Self {
            command_string: command_string.into(),
            commands_dir: commands_dir.into(),
            client,
            loader,
            hooks: HookRegistry::new(),
            plugin_defs: Vec::new(),
            plugin_infos: Vec::new(),
            options: OptionsConfig::new(),
            option_values: OptionValues::new(),
            tokens: Vec::new(),
            queue: Vec::new(),
            result: None,
            is_resolved: false,
            is_parsed: false,
            is_ready: false,
            resolve_fn: default_resolve_fn(),
            parse_fn: default_parse_fn(),
        }
    }

    // --- Accessors ---

    pub fn command_string(&self) -> &str {
        &self.command_string
    }

    pub fn commands_dir(&self) -> &Path {
        &self.commands_dir
    }

    pub fn client(&self) -> Rc<dyn Client> {
        self.client.clone()
    }

    pub fn loader(&self) -> Rc<dyn ModuleLoader> {
        self.loader.clone()
    }

    pub fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }

    /// The merged option schema: plugin contributions first, then each
    /// resolved command's declarations in resolution order.
    pub fn options(&self) -> &OptionsConfig {
        &self.options
    }

    pub fn add_option(&mut self, key: impl Into<String>, decl: OptionDecl) {
        self.options.insert(key, decl);
    }

    pub fn add_options(&mut self, options: OptionsConfig) {
        self.options.merge(options);
    }

    pub fn option_values(&self) -> &OptionValues {
        &self.option_values
    }

    pub fn set_option_value(&mut self, key: impl Into<String>, value: Value) {
        self.option_values.insert(key, value);
    }

    /// Positional tokens from the parse phase.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn queue(&self) -> &[ResolvedCommand] {
        &self.queue
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, result: Value) {
        self.result = Some(result);
    }

    pub fn take_result(&mut self) -> Option<Value> {
        self.result.take()
    }

    pub fn is_resolved(&self) -> bool {
        self.is_resolved
    }

    pub fn is_parsed(&self) -> bool {
        self.is_parsed
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    pub fn set_resolve_fn(&mut self, f: ResolveFn) {
        self.resolve_fn = f;
    }

    pub fn set_parse_fn(&mut self, f: ParseFn) {
        self.parse_fn = f;
    }

    // --- Plugins ---

    /// Registers a plugin. Names are unique per Context.
    pub fn register_plugin(&mut self, plugin: Plugin) -> Result<(), CliError> {
        if self.plugin_infos.iter().any(|info| info.name == plugin.name) {
            return Err(CliError::Plugin {
                name: plugin.name.clone(),
                message: "a plugin with this name is already registered".to_string(),
            });
        }
        self.plugin_infos.push(PluginInfo::from_plugin(&plugin));
        self.plugin_defs.push(plugin);
        Ok(())
    }

    /// Frozen post-init views of the registered plugins.
    pub fn plugins(&self) -> &[PluginInfo] {
        &self.plugin_infos
    }

    /// Annotates a plugin's metadata. Only possible while the plugin is
    /// still initializing; once `init` returns, its info is frozen.
    pub fn annotate_plugin(
        &mut self,
        name: &str,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), CliError> {
        let Some(info) = self.plugin_infos.iter_mut().find(|info| info.name == name) else {
            return Err(CliError::Plugin {
                name: name.to_string(),
                message: "no plugin with this name is registered".to_string(),
            });
        };
        if info.is_ready {
            return Err(CliError::Plugin {
                name: name.to_string(),
                message: "plugin info is frozen after init".to_string(),
            });
        }
        info.meta.insert(key.into(), value.into());
        Ok(())
    }

    fn init_plugins(&mut self) -> Result<(), CliError> {
        let defs = self.plugin_defs.clone();
        for (position, plugin) in defs.iter().enumerate() {
            if self.plugin_infos[position].is_ready {
                continue;
            }
            if let Some(init) = &plugin.init {
                log::debug!(target: LOG_TARGET, "initializing plugin '{}'", plugin.name);
                init.call(self).map_err(|error| CliError::Plugin {
                    name: plugin.name.clone(),
                    message: error.to_string(),
                })?;
            }
            self.plugin_infos[position].is_ready = true;
        }
        Ok(())
    }

    // --- Hook dispatch ---

    /// Awaits each attached handler in registration order, passing the same
    /// event to all of them. Registrations made by a handler only affect
    /// future dispatches.
    pub(crate) fn dispatch(
        &mut self,
        hook: Hook,
        mut state: Option<&mut State>,
        event: &mut HookEvent,
    ) -> Result<(), CliError> {
        let snapshot = self.hooks.snapshot(hook);
        if snapshot.is_empty() {
            return Ok(());
        }
        log::trace!(target: LOG_TARGET, "dispatching {} ({} handlers)", hook, snapshot.len());
        for handler in snapshot {
            let mut args = HookArgs {
                context: &mut *self,
                state: state.as_deref_mut(),
            };
            handler(&mut args, event)
                .map_err(|error| CliError::from_hook(&hook.to_string(), error))?;
        }
        Ok(())
    }

    // --- Lifecycle ---

    /// Initializes plugins, resolves the command queue and parses the
    /// option values. Idempotent: a ready Context returns immediately.
    pub fn prepare(&mut self) -> Result<(), CliError> {
        if self.is_ready {
            return Ok(());
        }
        if let Err(error) = self.init_plugins() {
            self.throw(error)?;
        }
        if let Err(error) = self.resolve_phase() {
            self.throw(error)?;
        }
        if let Err(error) = self.parse_phase() {
            self.throw(error)?;
        }
        self.is_ready = true;
        Ok(())
    }

    fn resolve_phase(&mut self) -> Result<(), CliError> {
        if self.is_resolved {
            return Ok(());
        }
        let mut remaining = self.command_string.clone();
        let mut dir = self.commands_dir.clone();
        let mut last_skipped = false;
        // Params accumulate down the chain: `users/[id]/delete` must see
        // `id` from the handler of `delete`.
        let mut inherited = crate::models::Params::new();

        loop {
            let mut event =
                HookEvent::Resolve(ResolveEvent::new(remaining.clone(), dir.clone()));
            self.dispatch(Hook::BeforeResolve, None, &mut event)?;
            let HookEvent::Resolve(mut event) = event else {
                unreachable!("resolve dispatch preserves the event variant");
            };

            for mut seeded in event.take_added() {
                self.options.merge(seeded.command.options.clone());
                let mut params = inherited.clone();
                params.merge(&seeded.params);
                seeded.params = params;
                inherited = seeded.params.clone();
                self.queue.push(seeded);
            }
            if let Some(replacement) = event.take_resolve_fn() {
                self.resolve_fn = replacement;
            }

            let skipped = event.is_skipped();
            let (hook_remaining, hook_dir, mut stopped) = event.into_cursor();
            if skipped {
                // A skipping hook that neither advances the cursor nor stops
                // would loop forever; treat it as a stop.
                if hook_remaining == remaining && !stopped {
                    stopped = true;
                }
                remaining = hook_remaining;
                dir = hook_dir;
            } else {
                remaining = hook_remaining;
                dir = hook_dir;
                if !has_routable_token(&remaining) {
                    if self.queue.is_empty() {
                        return Err(CliError::CommandRequired);
                    }
                    // Trailing flags belong to the parse phase.
                    last_skipped = false;
                    break;
                }
                let resolve = self.resolve_fn.clone();
                match resolve(remaining.trim(), &dir, self) {
                    Ok(mut resolved) => {
                        remaining = resolved.remaining_command_string.clone();
                        dir = resolved.subcommands_dir.clone();
                        self.options.merge(resolved.command.options.clone());
                        let mut params = inherited.clone();
                        params.merge(&resolved.params);
                        resolved.params = params;
                        inherited = resolved.params.clone();
                        self.queue.push(resolved);
                    }
                    Err(error) => return Err(self.subcommand_required_or(error)),
                }
            }

            last_skipped = skipped;
            if stopped || remaining.trim().is_empty() {
                break;
            }
        }

        self.is_resolved = true;
        let mut after = HookEvent::Resolved(ResolvedEvent {
            remaining,
            next_dir: dir,
            skipped: last_skipped,
        });
        self.dispatch(Hook::AfterResolve, None, &mut after)?;

        if let Some(last) = self.queue.last() {
            if last.command.requires_subcommand {
                return Err(CliError::SubcommandRequired {
                    name: last.command_name.clone(),
                });
            }
        }
        Ok(())
    }

    /// A continuation that fails to route under a `requires_subcommand`
    /// parent reports the missing subcommand, not an unknown command.
    fn subcommand_required_or(&self, error: CliError) -> CliError {
        if matches!(error, CliError::NotFound { .. }) {
            if let Some(last) = self.queue.last() {
                if last.command.requires_subcommand {
                    return CliError::SubcommandRequired {
                        name: last.command_name.clone(),
                    };
                }
            }
        }
        error
    }

    fn parse_phase(&mut self) -> Result<(), CliError> {
        if self.is_parsed {
            return Ok(());
        }
        let mut event = HookEvent::Parse(ParseEvent::default());
        self.dispatch(Hook::BeforeParse, None, &mut event)?;
        let HookEvent::Parse(mut event) = event else {
            unreachable!("parse dispatch preserves the event variant");
        };

        if let Some(replacement) = event.take_parse_fn() {
            self.parse_fn = replacement;
        }
        let skipped = event.is_skipped();

        if let Some(parsed) = event.take_parsed() {
            self.tokens = parsed.tokens;
            self.option_values.merge(parsed.options);
        } else if !skipped {
            let parse = self.parse_fn.clone();
            let parsed = parse(
                &self.command_string,
                &self.options,
                &ParseOptions::default(),
            )?;
            log::debug!(
                target: LOG_TARGET,
                "parsed {} option(s) from '{}'",
                parsed.options.len(),
                self.command_string
            );
            self.tokens = parsed.tokens;
            self.option_values.merge(parsed.options);
        }

        self.is_parsed = true;
        let mut after = HookEvent::Parsed(ParsedEvent { skipped });
        self.dispatch(Hook::AfterParse, None, &mut after)?;
        Ok(())
    }

    /// Walks the queue with a fresh [`State`], threading `initial` through
    /// the chain. The final data value becomes the Context result.
    pub fn execute(&mut self, initial: Option<Value>) -> Result<Option<Value>, CliError> {
        let mut state = State::new(initial.clone());

        let mut event = HookEvent::Execute(ExecuteEvent::default());
        self.dispatch(Hook::BeforeExecute, Some(&mut state), &mut event)?;
        let HookEvent::Execute(mut event) = event else {
            unreachable!("execute dispatch preserves the event variant");
        };
        let skipped = event.is_skipped();

        let outcome = if skipped {
            event.take_result().or(initial)
        } else {
            if !self.is_ready {
                self.throw(
                    anyhow::anyhow!("execute() called before prepare() completed").into(),
                )?;
            }
            match state.start(self) {
                Ok(()) => state.data().cloned(),
                Err(error) => {
                    self.throw(error)?;
                    None
                }
            }
        };

        self.result = outcome;
        let mut after = HookEvent::Executed(ExecutedEvent { skipped });
        self.dispatch(Hook::AfterExecute, Some(&mut state), &mut after)?;
        Ok(self.result.clone())
    }

    /// Routes an error through the `beforeError` hooks. Returns `Ok(())`
    /// when a hook suppressed it, otherwise the (possibly replaced) error.
    pub fn throw(&mut self, error: CliError) -> Result<(), CliError> {
        log::debug!(target: LOG_TARGET, "raising: {}", error);
        let mut event = HookEvent::Error(ErrorEvent::new(error));
        self.dispatch(Hook::BeforeError, None, &mut event)?;
        let HookEvent::Error(event) = event else {
            unreachable!("error dispatch preserves the event variant");
        };
        match event.into_outcome() {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }

    /// Terminates the process after the `beforeExit` hooks have had their
    /// say. Returns only when a hook cancelled the exit.
    pub fn exit(&mut self, code: i32, message: Option<String>) -> Result<(), CliError> {
        let mut event = HookEvent::Exit(ExitEvent::new(code, message));
        self.dispatch(Hook::BeforeExit, None, &mut event)?;
        let HookEvent::Exit(event) = event else {
            unreachable!("exit dispatch preserves the event variant");
        };
        if event.is_cancelled() {
            return Ok(());
        }
        let (code, message) = event.into_parts();
        if let Some(message) = message {
            if code == 0 {
                self.client.log(&message);
            } else {
                self.client.error(&message);
            }
        }
        log::debug!(target: LOG_TARGET, "exiting with code {}", code);
        std::process::exit(code);
    }
}

/// Whether anything in `input` could still be routed as a command name.
fn has_routable_token(input: &str) -> bool {
    tokens::split(input)
        .iter()
        .any(|t| !parser::is_flag(t) && t != crate::constants::OPTION_TERMINATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::models::CommandModule;
    use crate::state::Status;
    use crate::system::client::ScriptedClient;
    use crate::system::loader::StaticLoader;

    fn context_with(
        command: &str,
        loader: StaticLoader,
        client: Rc<ScriptedClient>,
    ) -> Context {
        // Run with RUST_LOG=tiller=trace to see the engine's own tracing.
        let _ = env_logger::builder().is_test(true).try_init();
        Context::new(command, "commands", client, Rc::new(loader))
    }

    fn prepare_and_run(context: &mut Context, initial: Option<Value>) -> Option<Value> {
        context.prepare().unwrap();
        context.execute(initial).unwrap()
    }

    #[test]
    fn test_single_command_reads_option_and_ends() {
        let hello = CommandModule::new(|step| {
            let name = step.option("name")?.unwrap();
            step.end_with(format!("Hi {}", name))?;
            Ok(())
        })
        .option("name", OptionDecl::string());

        let loader = StaticLoader::new().module("hello", hello);
        let mut context =
            context_with("hello --name Alice", loader, Rc::new(ScriptedClient::new()));
        let result = prepare_and_run(&mut context, None);

        assert_eq!(result, Some(Value::String("Hi Alice".into())));
    }

    #[test]
    fn test_route_params_and_merged_options_reach_the_handler() {
        let delete = CommandModule::new(|step| {
            let id = step.param("id").unwrap().as_str().unwrap().to_string();
            assert!(step.option("force")?.unwrap().is_truthy());
            step.end_with(format!("deleted {}", id))?;
            Ok(())
        })
        .option("force", OptionDecl::bool());

        let loader = StaticLoader::new().module("users/[id]/delete", delete);
        let mut context = context_with(
            "users 123 delete --force",
            loader,
            Rc::new(ScriptedClient::new()),
        );
        let result = prepare_and_run(&mut context, None);

        assert_eq!(result, Some(Value::String("deleted 123".into())));
        assert!(context.option_values().flag("force"));
    }

    #[test]
    fn test_requires_subcommand_with_subcommand_present() {
        let deploy = CommandModule::new(|step| {
            step.next()?;
            Ok(())
        })
        .requires_subcommand();
        let prod = CommandModule::new(|step| {
            step.end_with("deployed to prod")?;
            Ok(())
        });

        let loader = StaticLoader::new()
            .module("deploy", deploy)
            .module("deploy/prod", prod);
        let mut context = context_with("deploy prod", loader, Rc::new(ScriptedClient::new()));
        let result = prepare_and_run(&mut context, None);

        assert_eq!(result, Some(Value::String("deployed to prod".into())));
    }

    #[test]
    fn test_requires_subcommand_missing_child_errors() {
        let deploy = CommandModule::new(|step| {
            step.next()?;
            Ok(())
        })
        .requires_subcommand();

        let loader = StaticLoader::new().module("deploy", deploy);
        let mut context = context_with("deploy prod", loader, Rc::new(ScriptedClient::new()));
        let err = context.prepare().unwrap_err();
        assert!(matches!(err, CliError::SubcommandRequired { .. }));

        let loader = StaticLoader::new().module(
            "deploy",
            CommandModule::new(|_| Ok(())).requires_subcommand(),
        );
        let mut context = context_with("deploy", loader, Rc::new(ScriptedClient::new()));
        let err = context.prepare().unwrap_err();
        assert!(matches!(err, CliError::SubcommandRequired { .. }));
    }

    #[test]
    fn test_middleware_chain_threads_data_through() {
        let forward = || {
            CommandModule::new(|step| {
                let data = step.data().cloned();
                match data {
                    Some(data) => step.next_with(data)?,
                    None => step.next()?,
                }
                Ok(())
            })
        };
        let loader = StaticLoader::new()
            .module("foo", forward())
            .module("foo/bar", forward())
            .module("foo/bar/baz", forward());

        let mut context = context_with("foo bar baz", loader, Rc::new(ScriptedClient::new()));
        let result = prepare_and_run(&mut context, Some(Value::String("x".into())));

        assert_eq!(result, Some(Value::String("x".into())));
        assert_eq!(context.queue().len(), 3);
    }

    #[test]
    fn test_end_short_circuits_the_chain() {
        let invocations: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let seen = invocations.clone();
        let foo = CommandModule::new(move |step| {
            seen.borrow_mut().push("foo");
            step.end_with("stop")?;
            Ok(())
        });
        let seen = invocations.clone();
        let bar = CommandModule::new(move |_| {
            seen.borrow_mut().push("bar");
            Ok(())
        });

        let loader = StaticLoader::new().module("foo", foo).module("foo/bar", bar);
        let mut context = context_with("foo bar", loader, Rc::new(ScriptedClient::new()));

        let after_command_fires = Rc::new(RefCell::new(0));
        let counter = after_command_fires.clone();
        context.hooks_mut().on(Hook::AfterCommand, move |_, _| {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        let result = prepare_and_run(&mut context, None);
        assert_eq!(result, Some(Value::String("stop".into())));
        assert_eq!(*invocations.borrow(), vec!["foo"]);
        assert_eq!(*after_command_fires.borrow(), 1);
    }

    #[test]
    fn test_bad_number_fails_prepare_with_the_key_in_the_message() {
        let cmd = CommandModule::new(|_| Ok(())).option("port", OptionDecl::number());
        let loader = StaticLoader::new().module("cmd", cmd);
        let mut context = context_with("cmd --port=abc", loader, Rc::new(ScriptedClient::new()));

        let err = context.prepare().unwrap_err();
        assert!(err.is_usage());
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_required_option_prompts_when_absent() {
        let deploy = CommandModule::new(|step| {
            let env = step.option("env")?.unwrap();
            step.end_with(format!("deploying to {}", env))?;
            Ok(())
        })
        .option("env", OptionDecl::string().required());

        let client = Rc::new(ScriptedClient::with_answers(["staging"]));
        let loader = StaticLoader::new().module("deploy", deploy);
        let mut context = context_with("deploy", loader, client.clone());
        let result = prepare_and_run(&mut context, None);

        assert_eq!(result, Some(Value::String("deploying to staging".into())));
        assert_eq!(client.prompted().len(), 1);
        // The answer is cached as a value afterwards.
        assert_eq!(
            context.option_values().get("env"),
            Some(&Value::String("staging".into()))
        );
    }

    #[test]
    fn test_prompted_answers_are_cached_across_reads() {
        let reads: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = reads.clone();
        let cmd = CommandModule::new(move |step| {
            sink.borrow_mut().push(step.option("env")?.unwrap());
            sink.borrow_mut().push(step.option("env")?.unwrap());
            Ok(())
        })
        .option("env", OptionDecl::string().required());

        let client = Rc::new(ScriptedClient::with_answers(["prod"]));
        let loader = StaticLoader::new().module("cmd", cmd);
        let mut context = context_with("cmd", loader, client.clone());
        prepare_and_run(&mut context, None);

        assert_eq!(client.prompted().len(), 1);
        assert_eq!(reads.borrow().len(), 2);
    }

    #[test]
    fn test_hook_order_matches_the_lifecycle() {
        let order: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let loader = StaticLoader::new().module(
            "noop",
            CommandModule::new(|step| {
                step.end()?;
                Ok(())
            }),
        );
        let mut context = context_with("noop", loader, Rc::new(ScriptedClient::new()));

        for hook in [
            Hook::BeforeResolve,
            Hook::AfterResolve,
            Hook::BeforeParse,
            Hook::AfterParse,
            Hook::BeforeExecute,
            Hook::BeforeCommand,
            Hook::BeforeEnd,
            Hook::AfterCommand,
            Hook::AfterExecute,
        ] {
            let sink = order.clone();
            context.hooks_mut().on(hook, move |_, _| {
                sink.borrow_mut().push(hook.to_string());
                Ok(())
            });
        }

        prepare_and_run(&mut context, None);
        assert_eq!(
            *order.borrow(),
            vec![
                "beforeResolve",
                "afterResolve",
                "beforeParse",
                "afterParse",
                "beforeExecute",
                "beforeCommand",
                "beforeEnd",
                "afterCommand",
                "afterExecute",
            ]
        );
    }

    #[test]
    fn test_skipping_execute_yields_initial_data_or_set_result() {
        let loader = StaticLoader::new().module(
            "boom",
            CommandModule::new(|_| panic!("must not run")),
        );
        let observed = Rc::new(RefCell::new(None));

        let mut context = context_with("boom", loader, Rc::new(ScriptedClient::new()));
        context.hooks_mut().on(Hook::BeforeExecute, |_, event| {
            event.execute_mut().unwrap().skip();
            Ok(())
        });
        let sink = observed.clone();
        context.hooks_mut().on(Hook::AfterExecute, move |_, event| {
            *sink.borrow_mut() = Some(event.executed_mut().unwrap().skipped);
            Ok(())
        });

        let result = prepare_and_run(&mut context, Some(Value::String("seed".into())));
        assert_eq!(result, Some(Value::String("seed".into())));
        assert_eq!(*observed.borrow(), Some(true));

        // With an explicit result.
        let loader = StaticLoader::new().module(
            "boom",
            CommandModule::new(|_| panic!("must not run")),
        );
        let mut context = context_with("boom", loader, Rc::new(ScriptedClient::new()));
        context.hooks_mut().on(Hook::BeforeExecute, |_, event| {
            event
                .execute_mut()
                .unwrap()
                .set_result_and_skip(Value::String("override".into()));
            Ok(())
        });
        let result = prepare_and_run(&mut context, Some(Value::String("seed".into())));
        assert_eq!(result, Some(Value::String("override".into())));
    }

    #[test]
    fn test_data_observed_in_after_command_matches_next() {
        let loader = StaticLoader::new()
            .module(
                "a",
                CommandModule::new(|step| {
                    step.next_with("from-a")?;
                    Ok(())
                }),
            )
            .module(
                "a/b",
                CommandModule::new(|step| {
                    // Returns without next/end: data must stay "from-a".
                    let _ = step;
                    Ok(())
                }),
            );

        let observed: Rc<RefCell<Vec<Option<Value>>>> = Rc::new(RefCell::new(Vec::new()));
        let mut context = context_with("a b", loader, Rc::new(ScriptedClient::new()));
        let sink = observed.clone();
        context.hooks_mut().on(Hook::AfterCommand, move |args, _| {
            sink.borrow_mut()
                .push(args.state.as_ref().unwrap().data().cloned());
            Ok(())
        });

        prepare_and_run(&mut context, None);
        assert_eq!(
            *observed.borrow(),
            vec![
                Some(Value::String("from-a".into())),
                Some(Value::String("from-a".into())),
            ]
        );
    }

    #[test]
    fn test_before_command_skip_advances_without_invoking() {
        let invoked = Rc::new(RefCell::new(Vec::<String>::new()));
        let sink = invoked.clone();
        let first = CommandModule::new(move |step| {
            sink.borrow_mut().push("first".into());
            step.next()?;
            Ok(())
        });
        let sink = invoked.clone();
        let second = CommandModule::new(move |step| {
            sink.borrow_mut().push("second".into());
            step.end()?;
            Ok(())
        });

        let loader = StaticLoader::new().module("a", first).module("a/b", second);
        let mut context = context_with("a b", loader, Rc::new(ScriptedClient::new()));
        context.hooks_mut().on(Hook::BeforeCommand, |args, event| {
            let state = args.state.as_ref().unwrap();
            if state.index() == 0 {
                event.command_mut().unwrap().skip();
            }
            Ok(())
        });

        prepare_and_run(&mut context, None);
        assert_eq!(*invoked.borrow(), vec!["second".to_string()]);
    }

    #[test]
    fn test_before_end_can_override_the_final_data() {
        let loader = StaticLoader::new().module(
            "noop",
            CommandModule::new(|step| {
                step.end_with("original")?;
                Ok(())
            }),
        );
        let mut context = context_with("noop", loader, Rc::new(ScriptedClient::new()));
        context.hooks_mut().on(Hook::BeforeEnd, |_, event| {
            let event = event.end_mut().unwrap();
            assert_eq!(event.data().and_then(Value::as_str), Some("original"));
            event.set_data(Value::String("overridden".into()));
            Ok(())
        });

        let result = prepare_and_run(&mut context, None);
        assert_eq!(result, Some(Value::String("overridden".into())));
    }

    #[test]
    fn test_throw_can_be_suppressed_and_replaced() {
        let loader = StaticLoader::new();
        let mut context = context_with("x", loader, Rc::new(ScriptedClient::new()));

        context.hooks_mut().on(Hook::BeforeError, |_, event| {
            event.error_mut().unwrap().ignore();
            Ok(())
        });
        assert!(context.throw(CliError::CommandRequired).is_ok());

        let mut context = context_with(
            "x",
            StaticLoader::new(),
            Rc::new(ScriptedClient::new()),
        );
        context.hooks_mut().on(Hook::BeforeError, |_, event| {
            event
                .error_mut()
                .unwrap()
                .set_error(CliError::Plugin {
                    name: "test".into(),
                    message: "replaced".into(),
                });
            Ok(())
        });
        let err = context.throw(CliError::CommandRequired).unwrap_err();
        assert!(matches!(err, CliError::Plugin { .. }));
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let counter = Rc::new(RefCell::new(0));
        let sink = counter.clone();
        let loader = StaticLoader::new().module("noop", CommandModule::new(|_| Ok(())));
        let mut context = context_with("noop", loader, Rc::new(ScriptedClient::new()));
        context.hooks_mut().on(Hook::BeforeResolve, move |_, _| {
            *sink.borrow_mut() += 1;
            Ok(())
        });

        context.prepare().unwrap();
        context.prepare().unwrap();
        assert_eq!(*counter.borrow(), 1);
        assert!(context.is_ready());
    }

    #[test]
    fn test_empty_input_without_hooks_requires_a_command() {
        let loader = StaticLoader::new().module("noop", CommandModule::new(|_| Ok(())));
        let mut context = context_with("", loader, Rc::new(ScriptedClient::new()));
        let err = context.prepare().unwrap_err();
        assert!(matches!(err, CliError::CommandRequired));
    }

    #[test]
    fn test_hook_seeded_commands_bypass_the_resolver() {
        let loader = StaticLoader::new();
        let mut context = context_with("anything", loader, Rc::new(ScriptedClient::new()));

        context.hooks_mut().on(Hook::BeforeResolve, |_, event| {
            let event = event.resolve_mut().unwrap();
            let module = CommandModule::new(|step| {
                step.end_with("seeded")?;
                Ok(())
            });
            event.add_resolved_commands(vec![ResolvedCommand {
                command: module,
                command_name: "seeded".into(),
                command_path: "virtual/seeded".into(),
                command_tokens: vec!["seeded".into()],
                remaining_command_string: String::new(),
                subcommands_dir: "virtual".into(),
                params: Default::default(),
            }]);
            event.skip();
            event.stop_resolving();
            event.set_remaining("");
            Ok(())
        });
        // The seeded queue parses against an empty schema; skip the parse
        // of the raw string, which is not meaningful here.
        context.hooks_mut().on(Hook::BeforeParse, |_, event| {
            event.parse_mut().unwrap().skip();
            Ok(())
        });

        let result = prepare_and_run(&mut context, None);
        assert_eq!(result, Some(Value::String("seeded".into())));
    }

    #[test]
    fn test_state_change_hooks_bracket_every_mutation() {
        let order: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let loader = StaticLoader::new().module(
            "noop",
            CommandModule::new(|step| {
                step.end_with("done")?;
                Ok(())
            }),
        );
        let mut context = context_with("noop", loader, Rc::new(ScriptedClient::new()));

        let sink = order.clone();
        context
            .hooks_mut()
            .on(Hook::BeforeStateChange, move |_, _| {
                sink.borrow_mut().push("before".into());
                Ok(())
            });
        let sink = order.clone();
        context.hooks_mut().on(Hook::AfterStateChange, move |_, _| {
            sink.borrow_mut().push("after".into());
            Ok(())
        });

        prepare_and_run(&mut context, None);
        let order = order.borrow();
        assert!(!order.is_empty());
        assert_eq!(order.len() % 2, 0);
        for pair in order.chunks(2) {
            assert_eq!(pair, ["before".to_string(), "after".to_string()]);
        }
    }

    #[test]
    fn test_handler_error_marks_state_and_is_wrapped() {
        let loader = StaticLoader::new().module(
            "boom",
            CommandModule::new(|_| Err(anyhow::anyhow!("kaboom"))),
        );
        let status = Rc::new(RefCell::new(Status::Pending));
        let mut context = context_with("boom", loader, Rc::new(ScriptedClient::new()));
        let sink = status.clone();
        context.hooks_mut().on(Hook::AfterStateChange, move |args, _| {
            if let Some(state) = args.state.as_ref() {
                *sink.borrow_mut() = state.status();
            }
            Ok(())
        });

        context.prepare().unwrap();
        let err = context.execute(None).unwrap_err();
        assert!(matches!(err, CliError::Handler { .. }));
        assert!(err.to_string().contains("boom"));
        assert_eq!(*status.borrow(), Status::Errored);
    }
}
