//! # Lifecycle Hooks
//!
//! Named, ordered handler lists fired at well-defined points of an
//! invocation. Hook handlers receive two arguments: [`HookArgs`] with
//! mutable access to the [`Context`] (and, during execution-phase hooks,
//! the [`State`]), and the mutable event for that lifecycle point.
//!
//! ## Ordering
//!
//! Handlers run in registration order, each completing before the next.
//! Dispatch iterates a snapshot of the list, so registrations made during a
//! dispatch only affect future dispatches. `once` handlers are removed from
//! the live list before their body runs.
//!
//! ## Mutation protocol
//!
//! Events expose intent through methods (`skip`, `cancel`, `ignore`,
//! `set_*`) over private fields; the engine reads the event after dispatch
//! and applies what was requested. Hooks never reach into engine internals
//! directly, which keeps behavior changes limited to the documented
//! mutators.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::core::context::{Context, ParseFn, ResolveFn};
use crate::errors::CliError;
use crate::models::{ParsedInput, ResolvedCommand, Value};
use crate::state::{State, StateChanges};

/// The lifecycle points a handler can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    BeforeResolve,
    AfterResolve,
    BeforeParse,
    AfterParse,
    BeforeExecute,
    AfterExecute,
    BeforeCommand,
    AfterCommand,
    BeforeEnd,
    BeforeError,
    BeforeExit,
    BeforeStateChange,
    AfterStateChange,
}

impl Hook {
    /// Every hook, in lifecycle order.
    pub const ALL: [Hook; 13] = [
        Hook::BeforeResolve,
        Hook::AfterResolve,
        Hook::BeforeParse,
        Hook::AfterParse,
        Hook::BeforeExecute,
        Hook::AfterExecute,
        Hook::BeforeCommand,
        Hook::AfterCommand,
        Hook::BeforeEnd,
        Hook::BeforeError,
        Hook::BeforeExit,
        Hook::BeforeStateChange,
        Hook::AfterStateChange,
    ];
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hook::BeforeResolve => "beforeResolve",
            Hook::AfterResolve => "afterResolve",
            Hook::BeforeParse => "beforeParse",
            Hook::AfterParse => "afterParse",
            Hook::BeforeExecute => "beforeExecute",
            Hook::AfterExecute => "afterExecute",
            Hook::BeforeCommand => "beforeCommand",
            Hook::AfterCommand => "afterCommand",
            Hook::BeforeEnd => "beforeEnd",
            Hook::BeforeError => "beforeError",
            Hook::BeforeExit => "beforeExit",
            Hook::BeforeStateChange => "beforeStateChange",
            Hook::AfterStateChange => "afterStateChange",
        };
        write!(f, "{}", name)
    }
}

/// What a hook handler sees besides the event.
pub struct HookArgs<'a> {
    pub context: &'a mut Context,
    /// Present during execution-phase hooks; absent during preparation.
    pub state: Option<&'a mut State>,
}

/// The boxed handler shape stored in the registry.
pub type HookFn = Rc<dyn Fn(&mut HookArgs<'_>, &mut HookEvent) -> anyhow::Result<()>>;

/// Identity token returned by `on`/`once`, used to detach a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookId(u64);

struct HookEntry {
    id: HookId,
    once: bool,
    callback: HookFn,
}

/// Mapping from hook name to its ordered handler list.
#[derive(Default)]
pub struct HookRegistry {
    handlers: HashMap<Hook, Vec<HookEntry>>,
    next_id: u64,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler; it stays attached until `off` removes it.
    pub fn on<F>(&mut self, hook: Hook, callback: F) -> HookId
    where
        F: Fn(&mut HookArgs<'_>, &mut HookEvent) -> anyhow::Result<()> + 'static,
    {
        self.attach(hook, false, Rc::new(callback))
    }

    /// Appends a handler that detaches itself before its first invocation.
    pub fn once<F>(&mut self, hook: Hook, callback: F) -> HookId
    where
        F: Fn(&mut HookArgs<'_>, &mut HookEvent) -> anyhow::Result<()> + 'static,
    {
        self.attach(hook, true, Rc::new(callback))
    }

    fn attach(&mut self, hook: Hook, once: bool, callback: HookFn) -> HookId {
        self.next_id += 1;
        let id = HookId(self.next_id);
        self.handlers
            .entry(hook)
            .or_default()
            .push(HookEntry { id, once, callback });
        id
    }

    /// Detaches the handler registered under `id`. Returns whether a
    /// handler was actually removed.
    pub fn off(&mut self, hook: Hook, id: HookId) -> bool {
        let Some(entries) = self.handlers.get_mut(&hook) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        before != entries.len()
    }

    /// Number of handlers currently attached to `hook`.
    pub fn len(&self, hook: Hook) -> usize {
        self.handlers.get(&hook).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self, hook: Hook) -> bool {
        self.len(hook) == 0
    }

    /// Takes an ordered snapshot for dispatch, removing `once` entries from
    /// the live list first so they cannot fire twice even if the dispatch
    /// re-enters.
    pub(crate) fn snapshot(&mut self, hook: Hook) -> Vec<HookFn> {
        let Some(entries) = self.handlers.get_mut(&hook) else {
            return Vec::new();
        };
        let snapshot: Vec<HookFn> = entries.iter().map(|e| e.callback.clone()).collect();
        entries.retain(|e| !e.once);
        snapshot
    }
}

// =========================================================================
// === EVENTS
// =========================================================================

/// One resolution step is about to run.
pub struct ResolveEvent {
    remaining: String,
    next_dir: std::path::PathBuf,
    skip: bool,
    stop: bool,
    added: Vec<ResolvedCommand>,
    resolve_fn: Option<ResolveFn>,
}

impl ResolveEvent {
    pub(crate) fn new(remaining: String, next_dir: std::path::PathBuf) -> Self {
        Self {
            remaining,
            next_dir,
            skip: false,
            stop: false,
            added: Vec::new(),
            resolve_fn: None,
        }
    }

    pub fn remaining(&self) -> &str {
        &self.remaining
    }

    pub fn next_dir(&self) -> &std::path::Path {
        &self.next_dir
    }

    /// Replaces the remaining command string for this and later steps.
    pub fn set_remaining(&mut self, remaining: impl Into<String>) {
        self.remaining = remaining.into();
    }

    pub fn set_next_dir(&mut self, dir: impl Into<std::path::PathBuf>) {
        self.next_dir = dir.into();
    }

    /// Bypasses the default resolver for this step.
    pub fn skip(&mut self) {
        self.skip = true;
    }

    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    /// Ends the resolution loop after this step.
    pub fn stop_resolving(&mut self) {
        self.stop = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stop
    }

    /// Pre-seeds the queue; the engine appends these before (or instead of)
    /// the default resolver's result and merges their option schemas.
    pub fn add_resolved_commands(&mut self, commands: Vec<ResolvedCommand>) {
        self.added.extend(commands);
    }

    /// Swaps the resolver used from this step onward.
    pub fn set_resolve_fn(&mut self, f: ResolveFn) {
        self.resolve_fn = Some(f);
    }

    pub(crate) fn take_added(&mut self) -> Vec<ResolvedCommand> {
        std::mem::take(&mut self.added)
    }

    pub(crate) fn take_resolve_fn(&mut self) -> Option<ResolveFn> {
        self.resolve_fn.take()
    }

    pub(crate) fn into_cursor(self) -> (String, std::path::PathBuf, bool) {
        (self.remaining, self.next_dir, self.stop)
    }
}

/// The resolution loop finished.
pub struct ResolvedEvent {
    pub remaining: String,
    pub next_dir: std::path::PathBuf,
    /// Whether the final step bypassed the default resolver.
    pub skipped: bool,
}

/// The parse phase is about to run.
#[derive(Default)]
pub struct ParseEvent {
    skip: bool,
    parsed: Option<ParsedInput>,
    parse_fn: Option<ParseFn>,
}

impl ParseEvent {
    /// Bypasses the default parse.
    pub fn skip(&mut self) {
        self.skip = true;
    }

    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    /// Supplies pre-parsed values and bypasses the default parse.
    pub fn set_parsed_options_and_skip(&mut self, parsed: ParsedInput) {
        self.parsed = Some(parsed);
        self.skip = true;
    }

    /// Swaps the parser used from this phase onward.
    pub fn set_parse_fn(&mut self, f: ParseFn) {
        self.parse_fn = Some(f);
    }

    pub(crate) fn take_parsed(&mut self) -> Option<ParsedInput> {
        self.parsed.take()
    }

    pub(crate) fn take_parse_fn(&mut self) -> Option<ParseFn> {
        self.parse_fn.take()
    }
}

/// The parse phase finished.
pub struct ParsedEvent {
    pub skipped: bool,
}

/// Execution is about to start.
#[derive(Default)]
pub struct ExecuteEvent {
    skip: bool,
    result: Option<Value>,
}

impl ExecuteEvent {
    /// Bypasses execution; the result falls back to the initial data.
    pub fn skip(&mut self) {
        self.skip = true;
    }

    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    /// Bypasses execution and supplies the result.
    pub fn set_result_and_skip(&mut self, result: Value) {
        self.result = Some(result);
        self.skip = true;
    }

    pub(crate) fn take_result(&mut self) -> Option<Value> {
        self.result.take()
    }
}

/// Execution finished (or was skipped).
pub struct ExecutedEvent {
    pub skipped: bool,
}

/// One command handler is about to run.
#[derive(Default)]
pub struct CommandEvent {
    skip: bool,
}

impl CommandEvent {
    /// Skips this handler; the cursor advances with data unchanged.
    pub fn skip(&mut self) {
        self.skip = true;
    }

    pub fn is_skipped(&self) -> bool {
        self.skip
    }
}

/// One command handler returned (or was skipped).
pub struct CommandDoneEvent {
    pub skipped: bool,
}

/// A handler called `end`.
pub struct EndEvent {
    data: Option<Value>,
    changed: bool,
}

impl EndEvent {
    pub(crate) fn new(data: Option<Value>) -> Self {
        Self {
            data,
            changed: false,
        }
    }

    /// The data the chain is about to end with.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Replaces the final data value.
    pub fn set_data(&mut self, data: Value) {
        self.data = Some(data);
        self.changed = true;
    }

    pub(crate) fn into_override(self) -> Option<Value> {
        if self.changed { self.data } else { None }
    }
}

/// An error is about to propagate.
pub struct ErrorEvent {
    error: Option<CliError>,
    ignored: bool,
}

impl ErrorEvent {
    pub(crate) fn new(error: CliError) -> Self {
        Self {
            error: Some(error),
            ignored: false,
        }
    }

    pub fn error(&self) -> Option<&CliError> {
        self.error.as_ref()
    }

    /// Replaces the propagating error.
    pub fn set_error(&mut self, error: CliError) {
        self.error = Some(error);
    }

    /// Suppresses the error; execution continues in its current state.
    pub fn ignore(&mut self) {
        self.ignored = true;
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub(crate) fn into_outcome(self) -> Option<CliError> {
        if self.ignored { None } else { self.error }
    }
}

/// The process is about to exit.
pub struct ExitEvent {
    code: i32,
    message: Option<String>,
    cancelled: bool,
}

impl ExitEvent {
    pub(crate) fn new(code: i32, message: Option<String>) -> Self {
        Self {
            code,
            message,
            cancelled: false,
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn set_code(&mut self, code: i32) {
        self.code = code;
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    /// Cancels the exit; control returns to the caller.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub(crate) fn into_parts(self) -> (i32, Option<String>) {
        (self.code, self.message)
    }
}

/// A state mutation is about to be applied.
pub struct StateChangeEvent {
    changes: StateChanges,
    skip: bool,
}

impl StateChangeEvent {
    pub(crate) fn new(changes: StateChanges) -> Self {
        Self {
            changes,
            skip: false,
        }
    }

    pub fn changes(&self) -> &StateChanges {
        &self.changes
    }

    /// Replaces the pending changes wholesale.
    pub fn set_changes(&mut self, changes: StateChanges) {
        self.changes = changes;
    }

    /// Drops the mutation entirely.
    pub fn skip(&mut self) {
        self.skip = true;
    }

    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    pub(crate) fn into_parts(self) -> (StateChanges, bool) {
        (self.changes, self.skip)
    }
}

/// A state mutation was applied (or skipped).
pub struct StateChangedEvent {
    pub changes: StateChanges,
    pub skipped: bool,
}

/// The event passed to every hook handler; the variant matches the hook.
pub enum HookEvent {
    Resolve(ResolveEvent),
    Resolved(ResolvedEvent),
    Parse(ParseEvent),
    Parsed(ParsedEvent),
    Execute(ExecuteEvent),
    Executed(ExecutedEvent),
    Command(CommandEvent),
    CommandDone(CommandDoneEvent),
    End(EndEvent),
    Error(ErrorEvent),
    Exit(ExitEvent),
    StateChange(StateChangeEvent),
    StateChanged(StateChangedEvent),
}

impl HookEvent {
    pub fn resolve_mut(&mut self) -> Option<&mut ResolveEvent> {
        match self {
            HookEvent::Resolve(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn resolved_mut(&mut self) -> Option<&mut ResolvedEvent> {
        match self {
            HookEvent::Resolved(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn parse_mut(&mut self) -> Option<&mut ParseEvent> {
        match self {
            HookEvent::Parse(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn parsed_mut(&mut self) -> Option<&mut ParsedEvent> {
        match self {
            HookEvent::Parsed(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn execute_mut(&mut self) -> Option<&mut ExecuteEvent> {
        match self {
            HookEvent::Execute(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn executed_mut(&mut self) -> Option<&mut ExecutedEvent> {
        match self {
            HookEvent::Executed(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn command_mut(&mut self) -> Option<&mut CommandEvent> {
        match self {
            HookEvent::Command(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn command_done_mut(&mut self) -> Option<&mut CommandDoneEvent> {
        match self {
            HookEvent::CommandDone(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn end_mut(&mut self) -> Option<&mut EndEvent> {
        match self {
            HookEvent::End(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn error_mut(&mut self) -> Option<&mut ErrorEvent> {
        match self {
            HookEvent::Error(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn exit_mut(&mut self) -> Option<&mut ExitEvent> {
        match self {
            HookEvent::Exit(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn state_change_mut(&mut self) -> Option<&mut StateChangeEvent> {
        match self {
            HookEvent::StateChange(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn state_changed_mut(&mut self) -> Option<&mut StateChangedEvent> {
        match self {
            HookEvent::StateChanged(ev) => Some(ev),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_appends_in_order_and_off_removes_by_id() {
        let mut registry = HookRegistry::new();
        let first = registry.on(Hook::BeforeExecute, |_, _| Ok(()));
        let _second = registry.on(Hook::BeforeExecute, |_, _| Ok(()));
        assert_eq!(registry.len(Hook::BeforeExecute), 2);

        assert!(registry.off(Hook::BeforeExecute, first));
        assert!(!registry.off(Hook::BeforeExecute, first));
        assert_eq!(registry.len(Hook::BeforeExecute), 1);
    }

    #[test]
    fn test_once_entries_leave_the_live_list_on_snapshot() {
        let mut registry = HookRegistry::new();
        registry.once(Hook::BeforeParse, |_, _| Ok(()));
        registry.on(Hook::BeforeParse, |_, _| Ok(()));

        let snapshot = registry.snapshot(Hook::BeforeParse);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.len(Hook::BeforeParse), 1);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_registration() {
        let mut registry = HookRegistry::new();
        registry.on(Hook::BeforeEnd, |_, _| Ok(()));
        let snapshot = registry.snapshot(Hook::BeforeEnd);
        registry.on(Hook::BeforeEnd, |_, _| Ok(()));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(Hook::BeforeEnd), 2);
    }
}
