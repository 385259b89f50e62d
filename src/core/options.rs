// src/core/options.rs
//
// On-demand option reads with interactive fallback. Parsing settles what
// the user typed; this module settles what a handler actually *gets*:
// parsed value, else declared default, else an interactive prompt when one
// is requested or the declaration is required, else absent.

use crate::core::parser;
use crate::errors::{ClientError, CliError, UsageError};
use crate::models::{OptionDecl, OptionKind, PromptKind, PromptRequest, Validator, Value};

use crate::core::context::Context;

/// Per-read configuration for [`Step::option_with`](crate::state::Step::option_with).
#[derive(Default, Clone)]
pub struct OptionQuery {
    /// Prompt for the value when it is absent, using this message.
    pub prompt: Option<String>,
    /// Initial value shown by the prompt.
    pub initial: Option<Value>,
    /// Extra validation applied to the obtained value.
    pub validate: Option<Validator>,
}

impl OptionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompt(mut self, message: impl Into<String>) -> Self {
        self.prompt = Some(message.into());
        self
    }

    pub fn initial(mut self, value: impl Into<Value>) -> Self {
        self.initial = Some(value.into());
        self
    }

    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + 'static,
    {
        self.validate = Some(Validator::new(f));
        self
    }
}

/// Resolves one option read for the command at `entry`.
///
/// Prompted answers are validated (choices, declared and per-read
/// predicates) and cached into the Context's values, so later reads see
/// the same answer without prompting again.
pub(crate) fn read_option(
    context: &mut Context,
    entry: usize,
    key: &str,
    query: OptionQuery,
) -> Result<Option<Value>, CliError> {
    let Some((canonical, decl)) = lookup(context, entry, key) else {
        return Err(UsageError::UnknownOption {
            flag: key.to_string(),
        }
        .into());
    };

    if let Some(value) = context.option_values().get(&canonical) {
        return Ok(Some(value.clone()));
    }
    if let Some(default) = &decl.default {
        return Ok(Some(default.clone()));
    }

    // Required implies prompt: a required option missing at read time is
    // asked for instead of failing outright.
    if query.prompt.is_none() && !decl.required {
        return Ok(None);
    }

    let client = context.client();
    let request = build_request(&canonical, &decl, &query);
    log::debug!(
        target: crate::constants::LOG_TARGET,
        "prompting for option '--{}'", canonical
    );
    let answer = match client.prompt(&request) {
        Ok(value) => value,
        Err(ClientError::NotInteractive) if decl.required => {
            return Err(UsageError::MissingRequired { key: canonical }.into());
        }
        Err(error) => return Err(CliError::Client(error)),
    };

    let value = coerce(&canonical, &decl, answer)?;
    parser::check_choices(&canonical, &decl, &value)?;
    for validator in decl.validate.iter().chain(query.validate.iter()) {
        validator
            .check(&value)
            .map_err(|message| UsageError::Invalid {
                key: canonical.clone(),
                message,
            })?;
    }

    context.set_option_value(&canonical, value.clone());
    Ok(Some(value))
}

/// Finds the declaration for a key or alias: the merged schema first, then
/// the current command's local declarations.
fn lookup(context: &Context, entry: usize, key: &str) -> Option<(String, OptionDecl)> {
    if let Some(canonical) = context.options().resolve(key) {
        let decl = context.options().get(canonical)?.clone();
        return Some((canonical.to_string(), decl));
    }
    let local = &context.queue().get(entry)?.command.options;
    let canonical = local.resolve(key)?;
    let decl = local.get(canonical)?.clone();
    Some((canonical.to_string(), decl))
}

fn build_request(key: &str, decl: &OptionDecl, query: &OptionQuery) -> PromptRequest {
    let message = query
        .prompt
        .clone()
        .or_else(|| decl.description.clone())
        .unwrap_or_else(|| format!("Enter a value for '--{}'", key));

    let kind = if !decl.choices.is_empty() {
        if decl.kind.is_list() {
            PromptKind::MultiSelect
        } else {
            PromptKind::Select
        }
    } else {
        match decl.kind {
            OptionKind::String => PromptKind::Text,
            OptionKind::Number => PromptKind::Number,
            OptionKind::Bool => PromptKind::Confirm,
            OptionKind::StringList | OptionKind::NumberList => PromptKind::List,
        }
    };

    let mut request = PromptRequest::new(kind, message)
        .choices(decl.choices.iter().map(Value::to_string));
    if let Some(initial) = &query.initial {
        request = request.initial(initial.clone());
    }
    if let Some(validator) = query.validate.clone().or_else(|| decl.validate.clone()) {
        request = request.validate(validator);
    }
    request
}

/// Bends a prompted answer into the declared kind.
fn coerce(key: &str, decl: &OptionDecl, answer: Value) -> Result<Value, CliError> {
    let coerced = match decl.kind {
        OptionKind::Bool => Value::Bool(answer.is_truthy()),
        OptionKind::String => match answer {
            Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        },
        OptionKind::Number => Value::Number(to_number(key, &answer)?),
        OptionKind::StringList => Value::List(
            to_items(answer)
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Value::String(s),
                    other => Value::String(other.to_string()),
                })
                .collect(),
        ),
        OptionKind::NumberList => {
            let mut items = Vec::new();
            for item in to_items(answer) {
                items.push(Value::Number(to_number(key, &item)?));
            }
            Value::List(items)
        }
    };
    Ok(coerced)
}

fn to_number(key: &str, value: &Value) -> Result<f64, CliError> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::String(s) => s.parse::<f64>().map_err(|_| {
            UsageError::NotANumber {
                key: key.to_string(),
                value: s.clone(),
            }
            .into()
        }),
        other => Err(UsageError::NotANumber {
            key: key.to_string(),
            value: other.to_string(),
        }
        .into()),
    }
}

fn to_items(answer: Value) -> Vec<Value> {
    match answer {
        Value::List(items) => items,
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| Value::String(part.to_string()))
            .collect(),
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_number_from_string_answer() {
        let decl = OptionDecl::number();
        let value = coerce("port", &decl, Value::String("8080".into())).unwrap();
        assert_eq!(value, Value::Number(8080.0));
    }

    #[test]
    fn test_coerce_bad_number_is_a_usage_error() {
        let decl = OptionDecl::number();
        let err = coerce("port", &decl, Value::String("abc".into())).unwrap_err();
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_coerce_list_from_comma_separated_answer() {
        let decl = OptionDecl::string_list();
        let value = coerce("tags", &decl, Value::String("a, b".into())).unwrap();
        assert_eq!(
            value,
            Value::List(vec![Value::String("a".into()), Value::String("b".into())])
        );
    }

    #[test]
    fn test_request_kind_follows_declaration() {
        let query = OptionQuery::new();
        let select = build_request("env", &OptionDecl::string().choices(["dev", "prod"]), &query);
        assert_eq!(select.kind, PromptKind::Select);
        assert_eq!(select.choices, vec!["dev", "prod"]);

        let confirm = build_request("force", &OptionDecl::bool(), &query);
        assert_eq!(confirm.kind, PromptKind::Confirm);

        let number = build_request("port", &OptionDecl::number(), &query);
        assert_eq!(number.kind, PromptKind::Number);
    }

    #[test]
    fn test_request_message_prefers_query_prompt() {
        let decl = OptionDecl::string().description("Your name");
        let with_prompt = build_request("name", &decl, &OptionQuery::new().prompt("Who are you?"));
        assert_eq!(with_prompt.message, "Who are you?");

        let from_decl = build_request("name", &decl, &OptionQuery::new());
        assert_eq!(from_decl.message, "Your name");
    }
}
