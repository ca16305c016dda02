//! Search query parsing for the bundled backends.
//!
//! Queries are whitespace-separated `field:pattern` terms, all of which must
//! match. Patterns support `*` and `?` wildcards; any other query
//! metacharacter must be backslash-escaped to be taken literally.

use crate::{Error, Result};
use regex::Regex;
use serde_json::Value;

/// Characters that carry meaning in a query and are escaped by [`escape_query`].
/// Wildcards are not in the list: `*` and `?` stay live around escaped literals.
const METACHARACTERS: &[char] = &[
    '\\', '+', '-', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', ':', '/', '&', '|', ' ',
];

/// Escape a literal value for use inside a query term.
pub fn escape_query(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if METACHARACTERS.contains(&c) || c.is_whitespace() {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// A parsed search query.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    terms: Vec<(String, Regex)>,
}

impl SearchQuery {
    /// Parse a query string.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut terms = Vec::new();
        for token in split_terms(raw) {
            let (field, pattern) = split_field(&token).ok_or_else(|| {
                Error::InvalidInput(format!("search term must be field:pattern, got {}", token))
            })?;
            if field.is_empty() {
                return Err(Error::InvalidInput(format!("search term has no field: {}", token)));
            }
            terms.push((field, compile_pattern(&pattern)?));
        }
        Ok(Self { terms })
    }

    /// Check whether a raw record matches every term.
    ///
    /// Only string-valued top-level fields can match.
    pub fn matches(&self, record: &Value) -> bool {
        self.terms.iter().all(|(field, pattern)| {
            record
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|value| pattern.is_match(value))
        })
    }

    /// Whether the query has no terms (matches everything).
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Split on unescaped whitespace, keeping escapes inside each token.
fn split_terms(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Split a token at its first unescaped `:`. The field is unescaped, the
/// pattern keeps its escapes for [`compile_pattern`].
fn split_field(token: &str) -> Option<(String, String)> {
    let mut field = String::new();
    let mut chars = token.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some((_, next)) = chars.next() {
                    field.push(next);
                }
            }
            ':' => return Some((field, token[idx + 1..].to_string())),
            _ => field.push(c),
        }
    }
    None
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    let mut expr = String::from("^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let literal = chars.next().unwrap_or('\\');
                expr.push_str(&regex::escape(&literal.to_string()));
            }
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            _ => expr.push_str(&regex::escape(&c.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| Error::InvalidInput(format!("bad search pattern {}: {}", pattern, e)))
}
