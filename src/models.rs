//! # Data Models
//!
//! This module defines the core data structures used throughout the engine,
//! organized into four main categories:
//!
//! 1.  **Dynamic Values**: `Value` is the single dynamic type threaded through
//!     the middleware chain and produced by the option parser. Handlers pass
//!     it forward with `next`/`end`; the parser coerces raw flag text into it.
//!
//! 2.  **Option Schema Models**: `OptionDecl` describes one option the way a
//!     command author declares it (kind, aliases, default, constraints);
//!     `OptionsConfig` is the insertion-ordered schema a Context merges
//!     declarations into; `OptionValues` holds what the parser produced.
//!
//! 3.  **Command & Routing Models**: `CommandModule` is the unit of executable
//!     behavior; `ResolvedCommand` is one routing step the resolver emitted,
//!     including captured route parameters and the continuation cursor.
//!
//! 4.  **Prompt Transport Models**: `PromptRequest`/`PromptKind` describe an
//!     interactive question for the abstract [`Client`](crate::system::client::Client)
//!     without committing to a rendering backend.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::state::Step;

// =========================================================================
// === 1. DYNAMIC VALUES
// =========================================================================

/// The dynamic value type of the engine: option values, route data and the
/// payload threaded through the middleware chain all use it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// `true` when the value reads as affirmative: `true`, a non-zero
    /// number, a non-empty string or a non-empty list.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            // Whole numbers print without the trailing ".0" so that option
            // values round-trip the way the user typed them.
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => {
                write!(f, "{}", *n as i64)
            }
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(Value::to_string).collect();
                write!(f, "{}", rendered.join(","))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items.into_iter().map(Value::String).collect())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

// =========================================================================
// === 2. OPTION SCHEMA MODELS
// =========================================================================

/// The declared type of an option, driving coercion during parse and the
/// prompt shape used for interactive fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionKind {
    String,
    Number,
    Bool,
    StringList,
    NumberList,
}

impl OptionKind {
    /// Whether a flag of this kind consumes a value token.
    pub fn takes_value(&self) -> bool {
        !matches!(self, OptionKind::Bool)
    }

    /// Whether repeated flags accumulate instead of replacing.
    pub fn is_list(&self) -> bool {
        matches!(self, OptionKind::StringList | OptionKind::NumberList)
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptionKind::String => "string",
            OptionKind::Number => "number",
            OptionKind::Bool => "boolean",
            OptionKind::StringList => "string list",
            OptionKind::NumberList => "number list",
        };
        write!(f, "{}", name)
    }
}

/// A user-supplied validation predicate over a parsed or prompted value.
#[derive(Clone)]
pub struct Validator(Rc<dyn Fn(&Value) -> Result<(), String>>);

impl Validator {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + 'static,
    {
        Self(Rc::new(f))
    }

    pub fn check(&self, value: &Value) -> Result<(), String> {
        (self.0)(value)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator(..)")
    }
}

/// One option declaration, as a command module (or plugin) authors it.
#[derive(Debug, Clone)]
pub struct OptionDecl {
    pub kind: OptionKind,
    pub aliases: Vec<String>,
    pub description: Option<String>,
    pub default: Option<Value>,
    pub required: bool,
    pub choices: Vec<Value>,
    pub conflicts: Vec<String>,
    pub requires: Vec<String>,
    pub validate: Option<Validator>,
}

impl OptionDecl {
    fn of_kind(kind: OptionKind) -> Self {
        Self {
            kind,
            aliases: Vec::new(),
            description: None,
            default: None,
            required: false,
            choices: Vec::new(),
            conflicts: Vec::new(),
            requires: Vec::new(),
            validate: None,
        }
    }

    pub fn string() -> Self {
        Self::of_kind(OptionKind::String)
    }

    pub fn number() -> Self {
        Self::of_kind(OptionKind::Number)
    }

    pub fn bool() -> Self {
        Self::of_kind(OptionKind::Bool)
    }

    pub fn string_list() -> Self {
        Self::of_kind(OptionKind::StringList)
    }

    pub fn number_list() -> Self {
        Self::of_kind(OptionKind::NumberList)
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn choices<I, V>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn conflicts_with(mut self, key: impl Into<String>) -> Self {
        self.conflicts.push(key.into());
        self
    }

    pub fn requires(mut self, key: impl Into<String>) -> Self {
        self.requires.push(key.into());
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

/// An insertion-ordered option schema: canonical key -> declaration.
///
/// Order is preserved because help rendering iterates the schema and must be
/// deterministic. Merging an existing key replaces the declaration in place
/// (later wins) without disturbing its original position.
#[derive(Debug, Clone, Default)]
pub struct OptionsConfig {
    entries: Vec<(String, OptionDecl)>,
}

impl OptionsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, decl: OptionDecl) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = decl,
            None => self.entries.push((key, decl)),
        }
    }

    /// Builder-style insert for inline schema construction.
    pub fn with(mut self, key: impl Into<String>, decl: OptionDecl) -> Self {
        self.insert(key, decl);
        self
    }

    pub fn merge(&mut self, other: OptionsConfig) {
        for (key, decl) in other.entries {
            self.insert(key, decl);
        }
    }

    pub fn get(&self, key: &str) -> Option<&OptionDecl> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, d)| d)
    }

    /// Resolves a canonical key or any alias to the canonical key.
    pub fn resolve(&self, key_or_alias: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, d)| k == key_or_alias || d.aliases.iter().any(|a| a == key_or_alias))
            .map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionDecl)> {
        self.entries.iter().map(|(k, d)| (k.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parsed option values keyed by canonical option name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptionValues {
    values: HashMap<String, Value>,
}

impl OptionValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// `true` when the key parsed to an affirmative boolean.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).map(Value::is_truthy).unwrap_or(false)
    }

    pub fn merge(&mut self, other: OptionValues) {
        self.values.extend(other.values);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What a full parse of the command string produced: the positional tokens
/// and the typed option values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedInput {
    pub tokens: Vec<String>,
    pub options: OptionValues,
}

// =========================================================================
// === 3. COMMAND & ROUTING MODELS
// =========================================================================

/// A value captured by a route-parameter segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Captured by `[name]`: exactly one token.
    Single(String),
    /// Captured by `[...name]`: the token and everything after it.
    Rest(Vec<String>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Single(s) => Some(s),
            ParamValue::Rest(_) => None,
        }
    }

    pub fn as_tokens(&self) -> Option<&[String]> {
        match self {
            ParamValue::Single(_) => None,
            ParamValue::Rest(tokens) => Some(tokens),
        }
    }
}

/// Route parameters captured while resolving one command, in capture order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Params {
    entries: Vec<(String, ParamValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Overlays `other` on top of these params. Used while resolving so
    /// that a parameter captured by an ancestor segment stays visible to
    /// every later command in the chain.
    pub fn merge(&mut self, other: &Params) {
        for (name, value) in other.iter() {
            self.insert(name, value.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The executable body of a command module.
///
/// Handlers receive a [`Step`] and may read options (with interactive
/// fallback), pass data forward with `next`, or finish the chain with `end`.
/// A handler that returns without calling either advances automatically
/// with the data unchanged.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(&mut Step<'_>) -> anyhow::Result<()>>);

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Step<'_>) -> anyhow::Result<()> + 'static,
    {
        Self(Rc::new(f))
    }

    /// The synthetic forwarding handler used for traversed directories and
    /// non-middleware commands in non-terminal position.
    pub fn pass_through() -> Self {
        Self::new(|step| {
            step.next()?;
            Ok(())
        })
    }

    pub fn call(&self, step: &mut Step<'_>) -> anyhow::Result<()> {
        (self.0)(step)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

/// A unit of executable behavior: description, option schema, handler.
#[derive(Debug, Clone)]
pub struct CommandModule {
    pub description: Option<String>,
    pub options: OptionsConfig,
    pub requires_subcommand: bool,
    pub is_middleware: bool,
    pub handler: Handler,
}

impl CommandModule {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&mut Step<'_>) -> anyhow::Result<()> + 'static,
    {
        Self {
            description: None,
            options: OptionsConfig::new(),
            requires_subcommand: false,
            is_middleware: true,
            handler: Handler::new(handler),
        }
    }

    /// A module that only forwards data to its continuation. The resolver
    /// inserts these for directories traversed without an executable module.
    pub fn pass_through() -> Self {
        Self {
            description: None,
            options: OptionsConfig::new(),
            requires_subcommand: false,
            is_middleware: true,
            handler: Handler::pass_through(),
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, decl: OptionDecl) -> Self {
        self.options.insert(key, decl);
        self
    }

    pub fn options(mut self, options: OptionsConfig) -> Self {
        self.options = options;
        self
    }

    pub fn requires_subcommand(mut self) -> Self {
        self.requires_subcommand = true;
        self
    }

    /// Marks the module as non-middleware: in non-terminal position its
    /// handler is replaced by the pass-through handler.
    pub fn non_middleware(mut self) -> Self {
        self.is_middleware = false;
        self
    }
}

/// One step the resolver matched: the module plus everything the engine
/// needs to invoke it and to continue routing.
///
/// The continuation is represented as data: a non-empty
/// `remaining_command_string` together with `subcommands_dir` tells the
/// Context where the next resolution step starts.
#[derive(Debug, Clone)]
pub struct ResolvedCommand {
    pub command: CommandModule,
    pub command_name: String,
    /// Logical identifier of the matched module inside the tree.
    pub command_path: PathBuf,
    /// The input tokens this step consumed.
    pub command_tokens: Vec<String>,
    pub remaining_command_string: String,
    /// Where the loader should look for this command's children.
    pub subcommands_dir: PathBuf,
    pub params: Params,
}

impl ResolvedCommand {
    /// Whether another resolution step follows this one.
    pub fn has_continuation(&self) -> bool {
        !self.remaining_command_string.trim().is_empty()
    }
}

// =========================================================================
// === 4. PROMPT TRANSPORT MODELS
// =========================================================================

/// The shape of an interactive question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptKind {
    Text,
    Number,
    Confirm,
    Select,
    MultiSelect,
    /// Free text parsed as a comma-separated list.
    List,
    Password,
    Date,
    Autocomplete,
    Toggle,
    Invisible,
}

/// A question for the abstract client, independent of any rendering backend.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub kind: PromptKind,
    pub message: String,
    pub initial: Option<Value>,
    pub choices: Vec<String>,
    pub validate: Option<Validator>,
}

impl PromptRequest {
    pub fn new(kind: PromptKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            initial: None,
            choices: Vec::new(),
            validate: None,
        }
    }

    pub fn initial(mut self, value: impl Into<Value>) -> Self {
        self.initial = Some(value.into());
        self
    }

    pub fn choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validate = Some(validator);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display_trims_whole_numbers() {
        assert_eq!(Value::Number(8080.0).to_string(), "8080");
        assert_eq!(Value::Number(0.5).to_string(), "0.5");
        assert_eq!(Value::String("abc".into()).to_string(), "abc");
    }

    #[test]
    fn test_options_config_merge_later_wins_keeps_position() {
        let mut schema = OptionsConfig::new()
            .with("alpha", OptionDecl::string())
            .with("beta", OptionDecl::bool());

        let mut incoming = OptionsConfig::new();
        incoming.insert("alpha", OptionDecl::number());
        schema.merge(incoming);

        let keys: Vec<&str> = schema.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["alpha", "beta"]);
        assert_eq!(schema.get("alpha").unwrap().kind, OptionKind::Number);
    }

    #[test]
    fn test_options_config_resolves_aliases() {
        let schema = OptionsConfig::new().with("force", OptionDecl::bool().alias("f"));
        assert_eq!(schema.resolve("f"), Some("force"));
        assert_eq!(schema.resolve("force"), Some("force"));
        assert_eq!(schema.resolve("x"), None);
    }

    #[test]
    fn test_params_capture_order_is_preserved() {
        let mut params = Params::new();
        params.insert("id", ParamValue::Single("123".into()));
        params.insert("rest", ParamValue::Rest(vec!["a".into(), "b".into()]));

        let names: Vec<&str> = params.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["id", "rest"]);
        assert_eq!(params.get("id").unwrap().as_str(), Some("123"));
    }
}
