// src/plugins/logger.rs
//
// The built-in logger plugin: an observational subscriber on every core
// hook. Records go to the `log` facade under the engine's target and,
// when configured, to an append-only file sink. The enable/disable
// switches are process-global with last-writer-wins semantics, so
// handlers can toggle logging without holding a Context reference.

use std::fs::OpenOptions;
use std::io::Write as IoWrite;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::constants::LOG_TARGET;
use crate::core::hooks::{Hook, HookArgs, HookEvent};
use crate::plugins::Plugin;

static LOGGER_ENABLED: AtomicBool = AtomicBool::new(true);

/// Turns the logger plugin's output on.
pub fn enable() {
    LOGGER_ENABLED.store(true, Ordering::SeqCst);
}

/// Turns the logger plugin's output off.
pub fn disable() {
    LOGGER_ENABLED.store(false, Ordering::SeqCst);
}

/// Flips the switch and returns the new state.
pub fn toggle() -> bool {
    !LOGGER_ENABLED.fetch_xor(true, Ordering::SeqCst)
}

pub fn is_enabled() -> bool {
    LOGGER_ENABLED.load(Ordering::SeqCst)
}

/// Configuration for [`logger_plugin_with`].
#[derive(Debug, Clone, Default)]
pub struct LoggerOptions {
    /// Append each record to this file as well.
    pub file: Option<PathBuf>,
}

/// Builds the logger plugin with default options.
pub fn logger_plugin() -> Plugin {
    logger_plugin_with(LoggerOptions::default())
}

/// Builds the logger plugin with a file sink or other options.
pub fn logger_plugin_with(options: LoggerOptions) -> Plugin {
    Plugin::new("logger")
        .description("Logs every lifecycle event")
        .init(move |context| {
            for hook in Hook::ALL {
                let options = options.clone();
                context.hooks_mut().on(hook, move |args, event| {
                    if !is_enabled() {
                        return Ok(());
                    }
                    let record = describe(hook, args, event);
                    log::debug!(target: LOG_TARGET, "{}", record);
                    if let Some(path) = &options.file {
                        append_record(path, &record)?;
                    }
                    Ok(())
                });
            }
            Ok(())
        })
}

fn describe(hook: Hook, args: &HookArgs<'_>, event: &HookEvent) -> String {
    match event {
        HookEvent::Resolve(ev) => {
            format!("[{}] remaining='{}'", hook, ev.remaining())
        }
        HookEvent::Resolved(ev) => format!(
            "[{}] queue={} remaining='{}' skipped={}",
            hook,
            args.context.queue().len(),
            ev.remaining,
            ev.skipped
        ),
        HookEvent::Parse(_) => format!("[{}] '{}'", hook, args.context.command_string()),
        HookEvent::Parsed(ev) => format!(
            "[{}] {} value(s) skipped={}",
            hook,
            args.context.option_values().len(),
            ev.skipped
        ),
        HookEvent::Execute(_) | HookEvent::Executed(_) => {
            format!("[{}] queue={}", hook, args.context.queue().len())
        }
        HookEvent::Command(_) | HookEvent::CommandDone(_) => {
            let position = args
                .state
                .as_ref()
                .map(|state| state.index().to_string())
                .unwrap_or_else(|| "?".to_string());
            format!("[{}] index={}", hook, position)
        }
        HookEvent::End(ev) => format!(
            "[{}] data={}",
            hook,
            ev.data()
                .map(|value| value.to_string())
                .unwrap_or_else(|| "<none>".to_string())
        ),
        HookEvent::Error(ev) => format!(
            "[{}] {}",
            hook,
            ev.error()
                .map(|error| error.to_string())
                .unwrap_or_else(|| "<taken>".to_string())
        ),
        HookEvent::Exit(ev) => format!("[{}] code={}", hook, ev.code()),
        HookEvent::StateChange(_) | HookEvent::StateChanged(_) => format!("[{}]", hook),
    }
}

fn append_record(path: &PathBuf, record: &str) -> anyhow::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", record)?;
    Ok(())
}
