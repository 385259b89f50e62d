//! # Execution State
//!
//! This module provides the per-execution cursor through the resolved
//! command queue and the payload handed to command handlers.
//!
//! ## Key Components
//!
//! - **`State`**: the cursor. It tracks the queue index, the data value
//!   threaded through the chain, and a status that moves
//!   `Pending -> Running -> Ended` (or `Errored`). It is created by
//!   `Context::execute` and dropped when execution returns.
//! - **`Step`**: the handler payload. It borrows the `Context` and `State`
//!   for the duration of one handler invocation and exposes the cooperative
//!   protocol: `next` passes data to the following command, `end` finishes
//!   the chain, and `option`/`option_with` read options with interactive
//!   fallback.
//! - **`StateChanges`**: a declarative mutation. Every change to data,
//!   index or status funnels through `State::apply`, which brackets the
//!   mutation with the `beforeStateChange`/`afterStateChange` hooks so
//!   observers never see an undocumented transition.
//!
//! ## Design Philosophy
//!
//! Handlers that return without calling `next` or `end` advance
//! automatically with the data unchanged, so fire-and-forget handlers
//! behave sensibly. Calling `next` twice in one invocation is a no-op, and
//! once `end` has run the loop halts before the next `beforeCommand`.

use std::rc::Rc;

use crate::core::context::Context;
use crate::core::hooks::{
    CommandDoneEvent, CommandEvent, EndEvent, Hook, HookEvent, StateChangeEvent, StateChangedEvent,
};
use crate::core::options::{self, OptionQuery};
use crate::errors::CliError;
use crate::models::{ParamValue, Params, ResolvedCommand, Value};
use crate::system::client::Client;

/// Where an execution currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Pending,
    Running,
    Ended,
    Errored,
}

/// A single field mutation: keep the current value or set a new one.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    Keep,
    Set(T),
}

impl<T> Default for Change<T> {
    fn default() -> Self {
        Change::Keep
    }
}

/// A declarative batch of state mutations, applied atomically between the
/// state-change hooks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateChanges {
    pub data: Change<Value>,
    pub index: Change<usize>,
    pub status: Change<Status>,
}

impl StateChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(mut self, value: Value) -> Self {
        self.data = Change::Set(value);
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.index = Change::Set(index);
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Change::Set(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Per-execution cursor through the command queue.
pub struct State {
    index: usize,
    data: Option<Value>,
    status: Status,
    /// Latch: whether the current handler already advanced the cursor.
    advanced: bool,
}

impl State {
    pub(crate) fn new(initial: Option<Value>) -> Self {
        Self {
            index: 0,
            data: initial,
            status: Status::Pending,
            advanced: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// The queue entry the cursor currently points at, if any.
    pub fn current<'a>(&self, context: &'a Context) -> Option<&'a ResolvedCommand> {
        context.queue().get(self.index)
    }

    /// Applies a batch of changes, bracketed by the state-change hooks.
    /// Hooks may rewrite the batch (`set_changes`) or drop it (`skip`).
    pub(crate) fn apply(
        &mut self,
        context: &mut Context,
        changes: StateChanges,
    ) -> Result<(), CliError> {
        let mut event = HookEvent::StateChange(StateChangeEvent::new(changes));
        context.dispatch(Hook::BeforeStateChange, Some(&mut *self), &mut event)?;
        let HookEvent::StateChange(event) = event else {
            unreachable!("state-change dispatch preserves the event variant");
        };
        let (changes, skipped) = event.into_parts();

        if !skipped {
            if let Change::Set(data) = &changes.data {
                self.data = Some(data.clone());
            }
            if let Change::Set(index) = changes.index {
                self.index = index;
            }
            if let Change::Set(status) = changes.status {
                self.status = status;
            }
        }

        let mut after = HookEvent::StateChanged(StateChangedEvent { changes, skipped });
        context.dispatch(Hook::AfterStateChange, Some(&mut *self), &mut after)?;
        Ok(())
    }

    /// Walks the queue, invoking one handler per step until the queue
    /// drains or a handler calls `end`.
    pub(crate) fn start(&mut self, context: &mut Context) -> Result<(), CliError> {
        self.apply(context, StateChanges::new().status(Status::Running))?;

        loop {
            if self.status == Status::Ended || self.index >= context.queue().len() {
                break;
            }

            let mut before = HookEvent::Command(CommandEvent::default());
            context.dispatch(Hook::BeforeCommand, Some(&mut *self), &mut before)?;
            let HookEvent::Command(before) = before else {
                unreachable!("command dispatch preserves the event variant");
            };
            if before.is_skipped() {
                let next = self.index + 1;
                self.apply(context, StateChanges::new().index(next))?;
                let mut after = HookEvent::CommandDone(CommandDoneEvent { skipped: true });
                context.dispatch(Hook::AfterCommand, Some(&mut *self), &mut after)?;
                continue;
            }

            let entry = self.index;
            let (handler, name) = {
                let command = &context.queue()[entry];
                (command.command.handler.clone(), command.command_name.clone())
            };
            log::trace!(target: crate::constants::LOG_TARGET, "invoking handler for '{}'", name);

            self.advanced = false;
            let outcome = {
                let mut step = Step {
                    context: &mut *context,
                    state: &mut *self,
                    entry,
                };
                handler.call(&mut step)
            };
            if let Err(error) = outcome {
                self.apply(context, StateChanges::new().status(Status::Errored))?;
                return Err(CliError::from_handler(&name, error));
            }

            // Auto-advance for handlers that called neither next nor end.
            if self.status != Status::Ended && !self.advanced {
                self.apply(context, StateChanges::new().index(entry + 1))?;
            }

            let mut after = HookEvent::CommandDone(CommandDoneEvent { skipped: false });
            context.dispatch(Hook::AfterCommand, Some(&mut *self), &mut after)?;
        }

        if self.status == Status::Running {
            self.apply(context, StateChanges::new().status(Status::Ended))?;
        }
        Ok(())
    }
}

/// The payload a command handler receives: non-owning access to the engine
/// for the duration of one invocation.
pub struct Step<'a> {
    pub context: &'a mut Context,
    pub state: &'a mut State,
    /// Queue position of the command this step belongs to. Stable even
    /// after `next` advances the cursor mid-handler.
    pub(crate) entry: usize,
}

impl Step<'_> {
    /// The I/O client of this invocation.
    pub fn client(&self) -> Rc<dyn Client> {
        self.context.client()
    }

    /// The resolved command this handler belongs to.
    pub fn command(&self) -> &ResolvedCommand {
        &self.context.queue()[self.entry]
    }

    /// Route parameters captured for this command.
    pub fn params(&self) -> &Params {
        &self.context.queue()[self.entry].params
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params().get(name)
    }

    /// The data value as it currently stands in the chain.
    pub fn data(&self) -> Option<&Value> {
        self.state.data()
    }

    /// Positional tokens from the parse phase.
    pub fn tokens(&self) -> &[String] {
        self.context.tokens()
    }

    /// Reads an option: parsed value, else declared default, else absent.
    /// A `required` declaration prompts instead of returning absent.
    pub fn option(&mut self, key: &str) -> Result<Option<Value>, CliError> {
        self.option_with(key, OptionQuery::default())
    }

    /// Reads an option with interactive fallback configured by `query`.
    pub fn option_with(
        &mut self,
        key: &str,
        query: OptionQuery,
    ) -> Result<Option<Value>, CliError> {
        options::read_option(self.context, self.entry, key, query)
    }

    /// Advances to the next command, leaving the data unchanged.
    pub fn next(&mut self) -> Result<(), CliError> {
        self.advance(None)
    }

    /// Advances to the next command, passing `data` forward.
    pub fn next_with(&mut self, data: impl Into<Value>) -> Result<(), CliError> {
        self.advance(Some(data.into()))
    }

    /// Ends the chain, leaving the data unchanged.
    pub fn end(&mut self) -> Result<(), CliError> {
        self.finish(None)
    }

    /// Ends the chain with `data` as the final value.
    pub fn end_with(&mut self, data: impl Into<Value>) -> Result<(), CliError> {
        self.finish(Some(data.into()))
    }

    fn advance(&mut self, data: Option<Value>) -> Result<(), CliError> {
        // At most one advance per invocation; later calls are no-ops.
        if self.state.advanced || self.state.status == Status::Ended {
            return Ok(());
        }
        let mut changes = StateChanges::new().index(self.entry + 1);
        if let Some(data) = data {
            changes = changes.data(data);
        }
        self.state.apply(self.context, changes)?;
        self.state.advanced = true;
        Ok(())
    }

    fn finish(&mut self, data: Option<Value>) -> Result<(), CliError> {
        if self.state.status == Status::Ended {
            return Ok(());
        }
        if let Some(data) = data {
            self.state
                .apply(self.context, StateChanges::new().data(data))?;
        }
        let mut event = HookEvent::End(EndEvent::new(self.state.data.clone()));
        self.context
            .dispatch(Hook::BeforeEnd, Some(&mut *self.state), &mut event)?;
        let HookEvent::End(event) = event else {
            unreachable!("end dispatch preserves the event variant");
        };
        if let Some(overridden) = event.into_override() {
            self.state
                .apply(self.context, StateChanges::new().data(overridden))?;
        }
        self.state
            .apply(self.context, StateChanges::new().status(Status::Ended))
    }
}
