// src/core/parser.rs
//
// The flag parser. Consumes a command string against a merged option schema
// and produces positional tokens plus typed option values. POSIX-ish
// surface: short `-x`, clustered `-abc`, inline `-n5`, long `--key`,
// `--key=value`, `--key value`, `--no-key` negation, `--` terminator.
//
// A `required` option that is absent never fails the parse. Interactive
// handlers may still obtain it at read time, so the requirement is only
// enforced on access (see core::options).

use crate::constants::OPTION_TERMINATOR;
use crate::core::tokens;
use crate::errors::UsageError;
use crate::models::{OptionDecl, OptionKind, OptionsConfig, OptionValues, ParsedInput, Value};

/// Controls for one parser invocation.
///
/// The resolver re-parses remaining input with `validate` off and
/// `allow_unknown` on to peel leading flags without judging them; the
/// Context's parse phase runs with the defaults.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub validate: bool,
    pub allow_unknown: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            validate: true,
            allow_unknown: false,
        }
    }
}

/// `true` for anything flag-shaped: a dash followed by at least one more
/// character. A lone `-` is a positional token.
pub fn is_flag(token: &str) -> bool {
    token.len() > 1 && token.starts_with('-')
}

/// Parses a full command string against `schema`.
pub fn parse(
    input: &str,
    schema: &OptionsConfig,
    options: &ParseOptions,
) -> Result<ParsedInput, UsageError> {
    parse_tokens(&tokens::split(input), schema, options)
}

/// Parses pre-split tokens against `schema`.
pub fn parse_tokens(
    tokens: &[String],
    schema: &OptionsConfig,
    options: &ParseOptions,
) -> Result<ParsedInput, UsageError> {
    let mut positional = Vec::new();
    let mut values = OptionValues::new();
    let mut terminated = false;
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        if terminated || !is_flag(token) {
            positional.push(token.clone());
            i += 1;
        } else if token == OPTION_TERMINATOR {
            terminated = true;
            i += 1;
        } else if let Some(body) = token.strip_prefix("--") {
            i = parse_long(body, tokens, i, schema, options, &mut values)?;
        } else {
            i = parse_short_cluster(&token[1..], tokens, i, schema, options, &mut values)?;
        }
    }

    if options.validate {
        validate_values(schema, &values)?;
    }
    Ok(ParsedInput {
        tokens: positional,
        options: values,
    })
}

/// How many leading tokens are flags, or values consumed by those flags.
/// The resolver trims this span off a remaining command string so that an
/// option value is never mistaken for a subcommand name.
pub fn leading_flag_span(tokens: &[String], schema: &OptionsConfig) -> usize {
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if !is_flag(token) {
            break;
        }
        if token == OPTION_TERMINATOR {
            i += 1;
            break;
        }
        let consumes_next = if let Some(body) = token.strip_prefix("--") {
            !body.contains('=')
                && body.strip_prefix("no-").is_none()
                && long_takes_value(body, schema)
        } else {
            short_cluster_consumes_next(&token[1..], schema)
        };
        let next_is_value = consumes_next
            && tokens.get(i + 1).map(|t| !is_flag(t)).unwrap_or(false);
        i += if next_is_value { 2 } else { 1 };
    }
    i
}

fn long_takes_value(body: &str, schema: &OptionsConfig) -> bool {
    schema
        .resolve(body)
        .and_then(|canonical| schema.get(canonical))
        .map(|decl| decl.kind.takes_value())
        .unwrap_or(false)
}

fn short_cluster_consumes_next(body: &str, schema: &OptionsConfig) -> bool {
    let chars: Vec<char> = body.chars().collect();
    for (pos, c) in chars.iter().enumerate() {
        let flag = c.to_string();
        let Some(canonical) = schema.resolve(&flag) else {
            continue;
        };
        let takes_value = schema
            .get(canonical)
            .map(|d| d.kind.takes_value())
            .unwrap_or(false);
        if takes_value {
            // An inline value ("-n5") consumes nothing beyond the cluster.
            return pos + 1 == chars.len();
        }
    }
    false
}

fn parse_long(
    body: &str,
    tokens: &[String],
    i: usize,
    schema: &OptionsConfig,
    options: &ParseOptions,
    values: &mut OptionValues,
) -> Result<usize, UsageError> {
    let (raw_key, inline) = match body.split_once('=') {
        Some((key, value)) => (key, Some(value.to_string())),
        None => (body, None),
    };

    // `--no-key` negates a declared boolean.
    if inline.is_none() {
        if let Some(stripped) = raw_key.strip_prefix("no-") {
            if let Some(canonical) = schema.resolve(stripped) {
                if schema.get(canonical).map(|d| d.kind) == Some(OptionKind::Bool) {
                    values.insert(canonical.to_string(), Value::Bool(false));
                    return Ok(i + 1);
                }
            }
        }
    }

    let Some(canonical) = schema.resolve(raw_key) else {
        if options.allow_unknown {
            // Unknown long flags never consume the next token.
            return Ok(i + 1);
        }
        return Err(UsageError::UnknownOption {
            flag: format!("--{}", raw_key),
        });
    };
    let canonical = canonical.to_string();
    let decl = schema.get(&canonical).expect("resolved key must exist");

    if decl.kind == OptionKind::Bool {
        let value = match inline {
            Some(text) => Value::Bool(parse_bool(&text)),
            None => Value::Bool(true),
        };
        values.insert(canonical, value);
        return Ok(i + 1);
    }

    let (text, advance) = match inline {
        Some(text) => (text, 1),
        None => match tokens.get(i + 1) {
            Some(next) if !is_flag(next) => (next.clone(), 2),
            _ => return Err(UsageError::MissingValue { key: canonical }),
        },
    };
    store_value(&canonical, decl, &text, values)?;
    Ok(i + advance)
}

fn parse_short_cluster(
    body: &str,
    tokens: &[String],
    i: usize,
    schema: &OptionsConfig,
    options: &ParseOptions,
    values: &mut OptionValues,
) -> Result<usize, UsageError> {
    let chars: Vec<char> = body.chars().collect();
    let mut pos = 0;

    while pos < chars.len() {
        let flag = chars[pos].to_string();
        let Some(canonical) = schema.resolve(&flag) else {
            if options.allow_unknown {
                pos += 1;
                continue;
            }
            return Err(UsageError::UnknownOption {
                flag: format!("-{}", chars[pos]),
            });
        };
        let canonical = canonical.to_string();
        let decl = schema.get(&canonical).expect("resolved key must exist");

        if decl.kind == OptionKind::Bool {
            values.insert(canonical, Value::Bool(true));
            pos += 1;
            continue;
        }

        // A value-taking short flag takes the rest of the cluster ("-n5",
        // "-n=5") or, when the cluster ends with it, the next token.
        let rest: String = chars[pos + 1..].iter().collect();
        if !rest.is_empty() {
            let text = rest.strip_prefix('=').unwrap_or(&rest);
            store_value(&canonical, decl, text, values)?;
            return Ok(i + 1);
        }
        return match tokens.get(i + 1) {
            Some(next) if !is_flag(next) => {
                store_value(&canonical, decl, next, values)?;
                Ok(i + 2)
            }
            _ => Err(UsageError::MissingValue { key: canonical }),
        };
    }
    Ok(i + 1)
}

fn store_value(
    key: &str,
    decl: &OptionDecl,
    text: &str,
    values: &mut OptionValues,
) -> Result<(), UsageError> {
    match decl.kind {
        OptionKind::Bool => {
            values.insert(key.to_string(), Value::Bool(parse_bool(text)));
        }
        OptionKind::String => {
            values.insert(key.to_string(), Value::String(text.to_string()));
        }
        OptionKind::Number => {
            values.insert(key.to_string(), Value::Number(parse_number(key, text)?));
        }
        OptionKind::StringList => {
            let items = split_list(text).map(Value::String).collect();
            append_list(key, items, values);
        }
        OptionKind::NumberList => {
            let mut items = Vec::new();
            for part in split_list(text) {
                items.push(Value::Number(parse_number(key, &part)?));
            }
            append_list(key, items, values);
        }
    }
    Ok(())
}

fn split_list(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(',')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
}

fn append_list(key: &str, items: Vec<Value>, values: &mut OptionValues) {
    let mut list = match values.get(key) {
        Some(Value::List(existing)) => existing.clone(),
        _ => Vec::new(),
    };
    list.extend(items);
    values.insert(key.to_string(), Value::List(list));
}

fn parse_bool(text: &str) -> bool {
    !matches!(
        text.to_ascii_lowercase().as_str(),
        "false" | "0" | "no" | "off"
    )
}

fn parse_number(key: &str, text: &str) -> Result<f64, UsageError> {
    text.parse::<f64>().map_err(|_| UsageError::NotANumber {
        key: key.to_string(),
        value: text.to_string(),
    })
}

/// End-of-parse validation over the values that are present: choices,
/// conflicts, requires and custom predicates. Required-but-absent options
/// are deliberately not an error here.
pub fn validate_values(schema: &OptionsConfig, values: &OptionValues) -> Result<(), UsageError> {
    for (key, decl) in schema.iter() {
        let Some(value) = values.get(key) else {
            continue;
        };
        check_choices(key, decl, value)?;
        for other in &decl.conflicts {
            if values.contains(other) {
                return Err(UsageError::Conflict {
                    key: key.to_string(),
                    other: other.clone(),
                });
            }
        }
        for other in &decl.requires {
            if !values.contains(other) {
                return Err(UsageError::MissingPeer {
                    key: key.to_string(),
                    other: other.clone(),
                });
            }
        }
        if let Some(validator) = &decl.validate {
            validator.check(value).map_err(|message| UsageError::Invalid {
                key: key.to_string(),
                message,
            })?;
        }
    }
    Ok(())
}

/// Validates a single value against one declaration; used both here and by
/// the interactive option reader.
pub(crate) fn check_choices(key: &str, decl: &OptionDecl, value: &Value) -> Result<(), UsageError> {
    if decl.choices.is_empty() {
        return Ok(());
    }
    let allowed = |candidate: &Value| decl.choices.contains(candidate);
    let ok = match value {
        Value::List(items) => items.iter().all(allowed),
        other => allowed(other),
    };
    if ok {
        return Ok(());
    }
    Err(UsageError::InvalidChoice {
        key: key.to_string(),
        value: value.to_string(),
        allowed: decl
            .choices
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    })
}
