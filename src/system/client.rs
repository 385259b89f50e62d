// src/system/client.rs
//
// Abstract I/O for the engine: user-facing output and interactive prompts.
// `ConsoleClient` is the real terminal implementation; `ScriptedClient`
// answers from a queue and records output, for tests and headless
// embeddings.

use std::cell::RefCell;
use std::collections::VecDeque;

use colored::Colorize;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, FuzzySelect, Input, MultiSelect, Password, Select};

use crate::errors::ClientError;
use crate::models::{PromptKind, PromptRequest, Value};

/// The I/O surface handlers and plugins talk to.
pub trait Client {
    /// Informational output.
    fn log(&self, message: &str);

    /// Error output.
    fn error(&self, message: &str);

    /// Whether prompts can be answered at all.
    fn is_interactive(&self) -> bool {
        true
    }

    /// Asks one question and returns a primitive answer.
    fn prompt(&self, request: &PromptRequest) -> Result<Value, ClientError>;

    /// Convenience yes/no question.
    fn confirm(&self, message: &str, default: bool) -> Result<bool, ClientError> {
        let request = PromptRequest::new(PromptKind::Confirm, message).initial(default);
        Ok(self.prompt(&request)?.is_truthy())
    }
}

/// Terminal-backed client: stdout/stderr plus dialoguer prompts.
#[derive(Default)]
pub struct ConsoleClient;

impl ConsoleClient {
    pub fn new() -> Self {
        Self
    }

    fn input_text(&self, request: &PromptRequest) -> Result<String, ClientError> {
        let theme = ColorfulTheme::default();
        let mut input = Input::<String>::with_theme(&theme)
            .with_prompt(&request.message)
            .allow_empty(true);
        if let Some(initial) = &request.initial {
            input = input.with_initial_text(initial.to_string());
        }
        if let Some(validator) = request.validate.clone() {
            input = input.validate_with(move |text: &String| {
                validator.check(&Value::String(text.clone()))
            });
        }
        Ok(input.interact_text()?)
    }
}

impl Client for ConsoleClient {
    fn log(&self, message: &str) {
        println!("{}", message);
    }

    fn error(&self, message: &str) {
        eprintln!("{}: {}", "Error".red().bold(), message);
    }

    fn prompt(&self, request: &PromptRequest) -> Result<Value, ClientError> {
        let theme = ColorfulTheme::default();
        match request.kind {
            PromptKind::Text | PromptKind::Date => {
                Ok(Value::String(self.input_text(request)?))
            }
            PromptKind::List => {
                let text = self.input_text(request)?;
                let items = text
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| Value::String(part.to_string()))
                    .collect();
                Ok(Value::List(items))
            }
            PromptKind::Number => {
                let mut input = Input::<f64>::with_theme(&theme).with_prompt(&request.message);
                if let Some(initial) = request.initial.as_ref().and_then(Value::as_number) {
                    input = input.default(initial);
                }
                Ok(Value::Number(input.interact_text()?))
            }
            PromptKind::Confirm | PromptKind::Toggle => {
                let default = request
                    .initial
                    .as_ref()
                    .map(Value::is_truthy)
                    .unwrap_or(false);
                let answer = Confirm::with_theme(&theme)
                    .with_prompt(&request.message)
                    .default(default)
                    .interact()?;
                Ok(Value::Bool(answer))
            }
            PromptKind::Select => {
                let position = Select::with_theme(&theme)
                    .with_prompt(&request.message)
                    .items(&request.choices)
                    .default(0)
                    .interact()?;
                Ok(Value::String(request.choices[position].clone()))
            }
            PromptKind::Autocomplete => {
                let position = FuzzySelect::with_theme(&theme)
                    .with_prompt(&request.message)
                    .items(&request.choices)
                    .default(0)
                    .interact()?;
                Ok(Value::String(request.choices[position].clone()))
            }
            PromptKind::MultiSelect => {
                let positions = MultiSelect::with_theme(&theme)
                    .with_prompt(&request.message)
                    .items(&request.choices)
                    .interact()?;
                let items = positions
                    .into_iter()
                    .map(|position| Value::String(request.choices[position].clone()))
                    .collect();
                Ok(Value::List(items))
            }
            PromptKind::Password | PromptKind::Invisible => {
                let answer = Password::with_theme(&theme)
                    .with_prompt(&request.message)
                    .interact()?;
                Ok(Value::String(answer))
            }
        }
    }
}

/// A client that answers prompts from a prepared queue and records
/// everything it is asked to print. The workhorse of the engine's own
/// tests; also useful for scripting an embedding end-to-end.
#[derive(Default)]
pub struct ScriptedClient {
    answers: RefCell<VecDeque<Value>>,
    logged: RefCell<Vec<String>>,
    errors: RefCell<Vec<String>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answers<I, V>(answers: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let client = Self::new();
        client
            .answers
            .borrow_mut()
            .extend(answers.into_iter().map(Into::into));
        client
    }

    pub fn push_answer(&self, answer: impl Into<Value>) {
        self.answers.borrow_mut().push_back(answer.into());
    }

    /// Everything `log` received, in order.
    pub fn logged(&self) -> Vec<String> {
        self.logged.borrow().clone()
    }

    /// Everything `error` received, in order.
    pub fn errored(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }

    /// The messages of every prompt that was asked, in order.
    pub fn prompted(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Client for ScriptedClient {
    fn log(&self, message: &str) {
        self.logged.borrow_mut().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.borrow_mut().push(message.to_string());
    }

    fn is_interactive(&self) -> bool {
        !self.answers.borrow().is_empty()
    }

    fn prompt(&self, request: &PromptRequest) -> Result<Value, ClientError> {
        self.prompts.borrow_mut().push(request.message.clone());
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or(ClientError::NotInteractive)
    }
}
