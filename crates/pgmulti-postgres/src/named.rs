//! Named parameter rewriting.
//!
//! PostgreSQL only understands positional placeholders (`$1`, `$2`, ...).
//! Queries in a batch may instead use `$name` tokens bound from a map.
//! [`to_positional`] rewrites the SQL so that every distinct name gets one
//! placeholder number, in order of first appearance, and returns the
//! values in matching order. A name used several times reuses its number,
//! so it binds the same value everywhere.
//!
//! Quoted strings (including `E'...'` strings with backslash escapes),
//! quoted identifiers, comments and dollar-quoted bodies are copied
//! verbatim.

use serde_json::{Map, Value};

use pgmulti_core::{QueryParams, StatementError};

/// SQL with positional placeholders and the values to bind, in order
#[derive(Debug, Clone, PartialEq)]
pub struct PositionalQuery {
    /// Rewritten SQL text
    pub sql: String,
    /// Values for `$1..$n`
    pub values: Vec<Value>,
}

/// Rewrite `sql` for the given parameters
///
/// Positional parameters pass through unchanged. Named parameters are
/// substituted; a token with no matching entry fails the statement and
/// entries the SQL never mentions are ignored.
pub fn to_positional(sql: &str, params: &QueryParams) -> Result<PositionalQuery, StatementError> {
    match params {
        QueryParams::Positional(values) => Ok(PositionalQuery {
            sql: sql.to_string(),
            values: values.clone(),
        }),
        QueryParams::Named(map) => rewrite_named(sql, map),
    }
}

fn rewrite_named(sql: &str, params: &Map<String, Value>) -> Result<PositionalQuery, StatementError> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<&str> = Vec::new();
    let mut missing: Vec<&str> = Vec::new();
    // start of the not-yet-copied region
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' if is_escape_string(bytes, i) => {
                i = skip_escaped(bytes, i);
            }
            b'\'' | b'"' => {
                i = skip_quoted(bytes, i);
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = bytes[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(bytes.len(), |p| i + p + 1);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_block_comment(bytes, i);
            }
            b'$' => {
                let ident_end = scan_ident(bytes, i + 1);
                if bytes.get(ident_end) == Some(&b'$') && !starts_with_digit(bytes, i + 1) {
                    // `$$` or `$tag$` opens a dollar-quoted body
                    let tag = &sql[i..=ident_end];
                    i = match sql[ident_end + 1..].find(tag) {
                        Some(p) => ident_end + 1 + p + tag.len(),
                        None => bytes.len(),
                    };
                } else if ident_end > i + 1 && bytes[i + 1].is_ascii_alphabetic() {
                    let name = &sql[i + 1..ident_end];
                    let position = match names.iter().position(|n| *n == name) {
                        Some(p) => p,
                        None => {
                            if !params.contains_key(name) {
                                missing.push(name);
                            }
                            names.push(name);
                            names.len() - 1
                        }
                    };
                    out.push_str(&sql[copied..i]);
                    out.push('$');
                    out.push_str(&(position + 1).to_string());
                    copied = ident_end;
                    i = ident_end;
                } else {
                    i = ident_end.max(i + 1);
                }
            }
            _ => i += 1,
        }
    }
    out.push_str(&sql[copied..]);

    if !missing.is_empty() {
        return Err(StatementError::new(format!(
            "Missing parameters: {}",
            missing.join(", ")
        )));
    }

    let values = names
        .iter()
        .map(|name| params.get(*name).cloned().unwrap_or(Value::Null))
        .collect();

    Ok(PositionalQuery { sql: out, values })
}

fn scan_ident(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    end
}

fn starts_with_digit(bytes: &[u8], at: usize) -> bool {
    bytes.get(at).map_or(false, |b| b.is_ascii_digit())
}

// Doubled quotes inside a literal close and reopen it, which this loop
// handles without special casing.
fn skip_quoted(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    bytes[start + 1..]
        .iter()
        .position(|&b| b == quote)
        .map_or(bytes.len(), |p| start + 1 + p + 1)
}

// `E'` or `e'` not preceded by an identifier character
fn is_escape_string(bytes: &[u8], quote: usize) -> bool {
    match quote.checked_sub(1).map(|p| (p, bytes[p])) {
        Some((p, b'E' | b'e')) => p == 0 || !is_ident_byte(bytes[p - 1]),
        _ => false,
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || !b.is_ascii()
}

// A backslash escapes the byte after it, quotes included. Doubled quotes
// are still allowed.
fn skip_escaped(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\'' if bytes.get(i + 1) == Some(&b'\'') => i += 2,
            b'\'' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'/', b'*') => {
                depth += 1;
                i += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}
