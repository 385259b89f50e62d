// src/core/tokens.rs
//
// Shell-like tokenization of command strings. A token opened with an
// unescaped `"` swallows delimiters until the closing quote; inner quotes
// are stripped and `\"` becomes a literal quote.

use crate::constants::DEFAULT_DELIMITER;

/// Splits `input` on `delimiter`, honoring quoted spans.
///
/// Empty segments (consecutive delimiters) are dropped; empty input yields
/// an empty list. An unterminated quote extends to the end of the input.
pub fn split_tokens(input: &str, delimiter: char) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Splits on the default delimiter (a single space).
pub fn split(input: &str) -> Vec<String> {
    split_tokens(input, DEFAULT_DELIMITER)
}

/// Input to [`join_tokens`]: a single token or an arbitrarily nested list.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    One(String),
    Many(Vec<Token>),
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token::One(s.to_string())
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Token::One(s)
    }
}

impl From<Vec<Token>> for Token {
    fn from(tokens: Vec<Token>) -> Self {
        Token::Many(tokens)
    }
}

impl From<Vec<String>> for Token {
    fn from(tokens: Vec<String>) -> Self {
        Token::Many(tokens.into_iter().map(Token::One).collect())
    }
}

/// Options for [`join_tokens`].
#[derive(Debug, Clone)]
pub struct JoinOptions {
    pub delimiter: char,
    /// Wrap tokens containing the delimiter in quotes (escaping inner
    /// quotes) when joining more than one token.
    pub wrap_in_quotes: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            wrap_in_quotes: true,
        }
    }
}

/// Joins tokens into a single command string, flattening nested lists and
/// dropping empty entries.
pub fn join_tokens(tokens: &[Token], options: &JoinOptions) -> String {
    let mut flat = Vec::new();
    flatten(tokens, &mut flat);
    flat.retain(|t| !t.is_empty());

    let wrap = options.wrap_in_quotes && flat.len() > 1;
    let rendered: Vec<String> = flat
        .into_iter()
        .map(|token| {
            if wrap && token.contains(options.delimiter) {
                format!("\"{}\"", token.replace('"', "\\\""))
            } else {
                token
            }
        })
        .collect();
    rendered.join(&options.delimiter.to_string())
}

/// Joins plain string tokens with the default options.
pub fn join(tokens: &[String]) -> String {
    let wrapped: Vec<Token> = tokens.iter().map(|t| Token::One(t.clone())).collect();
    join_tokens(&wrapped, &JoinOptions::default())
}

fn flatten(tokens: &[Token], out: &mut Vec<String>) {
    for token in tokens {
        match token {
            Token::One(s) => out.push(s.clone()),
            Token::Many(inner) => flatten(inner, out),
        }
    }
}
