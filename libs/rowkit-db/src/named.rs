//! Named parameters (`:name`) rewritten into engine placeholders.
//!
//! The scanner leaves these untouched:
//! - single-quoted literals, double-quoted and backtick-quoted identifiers;
//! - `-- line` and `/* block */` comments;
//! - Postgres `$tag$ ... $tag$` bodies and `::type` casts.
//!
//! Every occurrence of a name gets its own placeholder, so a name used twice
//! is bound twice. This keeps one code path for `$n` and `?` dialects.

use std::collections::HashMap;

use rowkit::{CustomConversions, Value};

use crate::dialect::Dialect;
use crate::{DbError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Part {
    Text(String),
    Param(String),
}

/// SQL text split around its named parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedParameterSql {
    parts: Vec<Part>,
}

impl NamedParameterSql {
    #[must_use]
    pub fn parse(sql: &str) -> Self {
        let bytes = sql.as_bytes();
        let mut parts = Vec::new();
        let mut text_start = 0;
        let mut i = 0;

        while let Some(&b) = bytes.get(i) {
            let next = bytes.get(i + 1).copied();
            match (b, next) {
                (b'\'' | b'"' | b'`', _) => i = skip_quoted(bytes, i),
                (b'-', Some(b'-')) => i = skip_line_comment(bytes, i),
                (b'/', Some(b'*')) => i = skip_block_comment(bytes, i),
                (b'$', _) => i = skip_dollar_quoted(bytes, i).unwrap_or(i + 1),
                (b':', Some(b':')) => i += 2,
                (b':', Some(n)) if is_ident_start(n) => {
                    let start = i + 1;
                    let end = bytes[start..]
                        .iter()
                        .position(|c| !is_ident_char(*c))
                        .map_or(bytes.len(), |p| start + p);
                    if text_start < i {
                        parts.push(Part::Text(sql[text_start..i].to_owned()));
                    }
                    parts.push(Part::Param(sql[start..end].to_owned()));
                    i = end;
                    text_start = end;
                }
                _ => i += 1,
            }
        }
        if text_start < sql.len() {
            parts.push(Part::Text(sql[text_start..].to_owned()));
        }
        Self { parts }
    }

    /// Parameter names in order of occurrence, repeats included.
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            Part::Param(name) => Some(name.as_str()),
            Part::Text(_) => None,
        })
    }

    #[must_use]
    pub fn has_parameters(&self) -> bool {
        self.parameter_names().next().is_some()
    }

    /// Render the SQL with the dialect's positional placeholders.
    #[must_use]
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let mut out = String::new();
        let mut index = 0;
        for part in &self.parts {
            match part {
                Part::Text(t) => out.push_str(t),
                Part::Param(_) => {
                    index += 1;
                    dialect.write_placeholder(&mut out, index);
                }
            }
        }
        out
    }

    /// Values in placeholder order.
    ///
    /// Statements without named parameters use the positional values of `params`.
    ///
    /// # Errors
    /// Returns `DbError::MissingParameter` for a name with no bound value.
    pub fn bind_values(&self, params: &Params) -> Result<Vec<Value>> {
        if !self.has_parameters() {
            return Ok(params.positional.clone());
        }
        self.parameter_names()
            .map(|name| {
                params
                    .named
                    .get(name)
                    .cloned()
                    .ok_or_else(|| DbError::MissingParameter(name.to_owned()))
            })
            .collect()
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Index just past the closing quote; a doubled quote is an escaped quote.
pub(crate) fn skip_quoted(bytes: &[u8], open: usize) -> usize {
    let quote = bytes[open];
    let mut j = open + 1;
    while let Some(&b) = bytes.get(j) {
        if b == quote {
            if bytes.get(j + 1) == Some(&quote) {
                j += 2;
                continue;
            }
            return j + 1;
        }
        j += 1;
    }
    bytes.len()
}

/// Index just past a `$tag$ ... $tag$` body (the tag may be empty), or
/// `None` when the `$` at `open` starts no dollar quote, as in `$1`.
pub(crate) fn skip_dollar_quoted(bytes: &[u8], open: usize) -> Option<usize> {
    let prev = open.checked_sub(1).and_then(|p| bytes.get(p));
    if prev.is_some_and(|b| is_ident_char(*b) || *b == b'$') {
        return None;
    }
    if bytes.get(open + 1).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    let tag_len = bytes[open + 1..]
        .iter()
        .take_while(|b| is_ident_char(**b))
        .count();
    let close = open + 1 + tag_len;
    if bytes.get(close) != Some(&b'$') {
        return None;
    }
    let delimiter = &bytes[open..=close];
    let body = close + 1;
    Some(
        bytes[body..]
            .windows(delimiter.len())
            .position(|w| w == delimiter)
            .map_or(bytes.len(), |p| body + p + delimiter.len()),
    )
}

/// Index of the newline ending the comment (kept as text), or the end.
pub(crate) fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(bytes.len(), |p| start + p)
}

/// Index just past `*/`, or the end for an unterminated comment.
pub(crate) fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |p| start + 2 + p + 2)
}

/// Query parameters, by name or by position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    named: HashMap<String, Value>,
    positional: Vec<Value>,
}

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional values for SQL that already uses engine placeholders.
    #[must_use]
    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            named: HashMap::new(),
            positional: values,
        }
    }

    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Bind a domain value through its registered writing converter.
    ///
    /// # Errors
    /// Returns `DbError::Conversion` if no writer exists or the value is rejected.
    pub fn bind_converted<S: 'static>(
        self,
        conversions: &CustomConversions,
        name: impl Into<String>,
        value: &S,
    ) -> Result<Self> {
        let v = conversions.write(value)?;
        Ok(self.bind(name, v))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.positional.is_empty()
    }
}
