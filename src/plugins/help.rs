// src/plugins/help.rs
//
// The built-in help plugin. Contributes the `--help`/`-h` option, stops
// resolution when nothing but help flags remain, captures usage errors so
// they render as help instead of a bare failure, and prints the help text
// after the (skipped) execution phase.

use std::cell::RefCell;
use std::fmt::Write as FmtWrite;
use std::rc::Rc;

use colored::Colorize;

use crate::constants::{HELP_ALIAS, HELP_OPTION};
use crate::core::context::Context;
use crate::core::hooks::Hook;
use crate::core::tokens;
use crate::errors::{CliError, UsageError};
use crate::models::{OptionDecl, OptionKind, Value};
use crate::plugins::Plugin;

/// Builds the help plugin.
pub fn help_plugin() -> Plugin {
    Plugin::new("help")
        .description("Renders help text for the resolved command")
        .init(|context| {
            context.add_option(
                HELP_OPTION,
                OptionDecl::bool()
                    .alias(HELP_ALIAS)
                    .description("Show help for the current command"),
            );

            let captured: Rc<RefCell<Option<UsageError>>> = Rc::new(RefCell::new(None));

            // Nothing but help flags left: there is no subcommand to find.
            context.hooks_mut().on(Hook::BeforeResolve, |_, event| {
                if let Some(event) = event.resolve_mut() {
                    if only_help_flags(event.remaining()) {
                        event.skip();
                        event.stop_resolving();
                    }
                }
                Ok(())
            });

            // Usage errors render as help instead of aborting the run.
            let slot = captured.clone();
            context.hooks_mut().on(Hook::BeforeError, move |_, event| {
                if let Some(event) = event.error_mut() {
                    if let Some(CliError::Usage(usage)) = event.error() {
                        *slot.borrow_mut() = Some(usage.clone());
                        event.ignore();
                    }
                }
                Ok(())
            });

            let slot = captured.clone();
            context.hooks_mut().on(Hook::BeforeExecute, move |args, event| {
                if let Some(event) = event.execute_mut() {
                    if help_requested(args.context) || slot.borrow().is_some() {
                        event.skip();
                    }
                }
                Ok(())
            });

            let slot = captured;
            context.hooks_mut().on(Hook::AfterExecute, move |args, event| {
                if event.executed_mut().is_none() {
                    return Ok(());
                }
                let helped = help_requested(args.context);
                let usage_error = slot.borrow_mut().take();
                if !helped && usage_error.is_none() {
                    return Ok(());
                }

                if let Some(usage) = &usage_error {
                    if !helped {
                        let message = usage.to_string();
                        args.context.client().error(&message);
                        args.context.set_result(Value::String(message));
                    }
                }
                let text = render_help(args.context);
                args.context.client().log(&text);
                Ok(())
            });

            Ok(())
        })
}

/// `true` when the remaining command string carries help flags and nothing
/// else.
fn only_help_flags(remaining: &str) -> bool {
    let tokens = tokens::split(remaining);
    !tokens.is_empty()
        && tokens.iter().all(|token| {
            token.as_str() == format!("--{}", HELP_OPTION)
                || token.as_str() == format!("-{}", HELP_ALIAS)
        })
}

fn help_requested(context: &Context) -> bool {
    context.option_values().flag(HELP_OPTION)
}

/// Renders help for the Context's resolved command (or the command root
/// when nothing resolved): description, usage line, option table in
/// declaration order and the subcommand listing.
pub fn render_help(context: &Context) -> String {
    let mut out = String::new();
    let target = context.queue().last();

    if let Some(description) = target.and_then(|t| t.command.description.as_deref()) {
        let _ = writeln!(out, "{}\n", description);
    }

    let dir = target
        .map(|t| t.subcommands_dir.clone())
        .unwrap_or_else(|| context.commands_dir().to_path_buf());
    let entries = context.loader().entries(&dir);

    let mut path: Vec<String> = Vec::new();
    for step in context.queue() {
        path.extend(step.command_tokens.iter().cloned());
    }
    let mut usage = format!(
        "    {}",
        if path.is_empty() {
            "<command>".to_string()
        } else {
            path.join(" ")
        }
    );
    if !context.options().is_empty() {
        usage.push_str(" [OPTIONS]");
    }
    if !entries.is_empty() {
        usage.push_str(" [SUBCOMMAND]");
    }
    let _ = writeln!(out, "{}", "USAGE:".bold());
    let _ = writeln!(out, "{}\n", usage);

    if !context.options().is_empty() {
        let rows: Vec<(String, String)> = context
            .options()
            .iter()
            .map(|(key, decl)| (option_flags(key, decl), option_summary(decl)))
            .collect();
        let width = rows.iter().map(|(flags, _)| flags.len()).max().unwrap_or(0);

        let _ = writeln!(out, "{}", "OPTIONS:".bold());
        for (flags, summary) in rows {
            let _ = writeln!(out, "    {:<width$}  {}", flags, summary, width = width);
        }
        let _ = writeln!(out);
    }

    if !entries.is_empty() {
        let rows: Vec<(String, String)> = entries
            .iter()
            .map(|entry| {
                let description = context
                    .loader()
                    .load(&dir.join(entry))
                    .ok()
                    .flatten()
                    .and_then(|module| module.description)
                    .unwrap_or_default();
                (display_entry(entry), description)
            })
            .collect();
        let width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0);

        let _ = writeln!(out, "{}", "COMMANDS:".bold());
        for (name, description) in rows {
            let _ = writeln!(out, "    {:<width$}  {}", name, description, width = width);
        }
    }

    out.trim_end().to_string()
}

fn option_flags(key: &str, decl: &OptionDecl) -> String {
    let mut parts = vec![format!("--{}", key)];
    for alias in &decl.aliases {
        if alias.chars().count() == 1 {
            parts.push(format!("-{}", alias));
        } else {
            parts.push(format!("--{}", alias));
        }
    }
    let mut flags = parts.join(", ");
    if decl.kind != OptionKind::Bool {
        flags.push_str(&format!(" <{}>", decl.kind));
    }
    flags
}

fn option_summary(decl: &OptionDecl) -> String {
    let mut summary = decl.description.clone().unwrap_or_default();
    if let Some(default) = &decl.default {
        let _ = write!(summary, " (default: {})", default);
    }
    if decl.required {
        summary.push_str(" [required]");
    }
    summary.trim_start().to_string()
}

fn display_entry(entry: &str) -> String {
    if let Some(param) = entry
        .strip_prefix(crate::constants::REST_PARAM_OPEN)
        .and_then(|s| s.strip_suffix(crate::constants::PARAM_CLOSE))
    {
        return format!("<{}...>", param);
    }
    if let Some(param) = entry
        .strip_prefix(crate::constants::PARAM_OPEN)
        .and_then(|s| s.strip_suffix(crate::constants::PARAM_CLOSE))
    {
        return format!("<{}>", param);
    }
    entry.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CommandModule;
    use crate::system::client::ScriptedClient;
    use crate::system::loader::StaticLoader;

    fn build_context(command: &str) -> (Context, Rc<ScriptedClient>) {
        let hello = CommandModule::new(|_| panic!("handler must not run"))
            .description("Greets someone")
            .option("name", OptionDecl::string().alias("n").description("Who to greet"));
        let loader = StaticLoader::new()
            .module("hello", hello)
            .module("hello/loud", CommandModule::new(|_| Ok(())).description("Shout it"));

        let client = Rc::new(ScriptedClient::new());
        let mut context = Context::new(
            command,
            "commands",
            client.clone() as Rc<dyn crate::system::client::Client>,
            Rc::new(loader),
        );
        context.register_plugin(help_plugin()).unwrap();
        (context, client)
    }

    #[test]
    fn test_help_flag_skips_execution_and_renders_help() {
        let (mut context, client) = build_context("hello --help");
        context.prepare().unwrap();
        let result = context.execute(None).unwrap();

        assert_eq!(result, None);
        let logged = client.logged().join("\n");
        assert!(logged.contains("Greets someone"));
        assert!(logged.contains("--name"));
        assert!(logged.contains("loud"));
    }

    #[test]
    fn test_usage_error_is_captured_and_published_as_result() {
        let (mut context, client) = build_context("hello --bogus");
        context.prepare().unwrap();
        let result = context.execute(None).unwrap();

        let message = result.and_then(|v| v.as_str().map(str::to_string)).unwrap();
        assert!(message.contains("--bogus"));
        assert!(client.errored().iter().any(|line| line.contains("--bogus")));
        // Help is rendered alongside the diagnostic.
        assert!(client.logged().join("\n").contains("--name"));
    }

    #[test]
    fn test_bare_help_flag_stops_resolution_and_lists_the_root() {
        let (mut context, client) = build_context("--help");
        context.prepare().unwrap();
        let result = context.execute(None).unwrap();

        assert_eq!(result, None);
        assert!(context.queue().is_empty());
        assert!(client.logged().join("\n").contains("hello"));
    }

    #[test]
    fn test_only_help_flags_detection() {
        assert!(only_help_flags("--help"));
        assert!(only_help_flags("-h"));
        assert!(only_help_flags("-h --help"));
        assert!(!only_help_flags("build --help"));
        assert!(!only_help_flags(""));
    }

    #[test]
    fn test_render_includes_defaults_and_required_markers() {
        let module = CommandModule::new(|_| Ok(()))
            .option("env", OptionDecl::string().required().description("Target"))
            .option("port", OptionDecl::number().default_value(8080.0));
        let loader = StaticLoader::new().module("serve", module);
        let mut context = Context::new(
            "serve",
            "commands",
            Rc::new(ScriptedClient::new()) as Rc<dyn crate::system::client::Client>,
            Rc::new(loader),
        );
        context.prepare().unwrap();

        let text = render_help(&context);
        assert!(text.contains("[required]"));
        assert!(text.contains("(default: 8080)"));
        assert!(text.contains("serve"));
    }
}
