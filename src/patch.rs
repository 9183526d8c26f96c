//! JSON-Patch (RFC 6902) application over `serde_json::Value`.
//!
//! [`apply`] never mutates its input: the document is cloned, every operation
//! is applied to the clone, and the clone is only returned when all of them
//! succeed. Callers keep their original document on error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PatchError {
    #[error("operation {index}: invalid JSON pointer '{pointer}'")]
    InvalidPointer { index: usize, pointer: String },
    #[error("operation {index}: path '{pointer}' does not exist")]
    PathNotFound { index: usize, pointer: String },
    #[error("operation {index}: invalid array index '{token}' in '{pointer}'")]
    InvalidIndex {
        index: usize,
        pointer: String,
        token: String,
    },
    #[error("operation {index}: cannot address into a {found} at '{pointer}'")]
    TypeMismatch {
        index: usize,
        pointer: String,
        found: &'static str,
    },
    #[error("operation {index}: test failed at '{pointer}'")]
    TestFailed { index: usize, pointer: String },
    #[error("operation {index}: cannot move '{from}' into its own child '{pointer}'")]
    MoveIntoChild {
        index: usize,
        from: String,
        pointer: String,
    },
    #[error("patched document is invalid: {0}")]
    InvalidDocument(String),
}

/// Applies `ops` in order to a clone of `doc`.
pub fn apply(doc: &Value, ops: &[PatchOperation]) -> Result<Value, PatchError> {
    let mut working = doc.clone();
    for (index, op) in ops.iter().enumerate() {
        apply_one(&mut working, index, op)?;
    }
    Ok(working)
}

/// Patches a typed value through its JSON form. Results that no longer
/// deserialize into `T` are rejected.
pub fn apply_typed<T>(value: &T, ops: &[PatchOperation]) -> Result<T, PatchError>
where
    T: Serialize + DeserializeOwned,
{
    let doc =
        serde_json::to_value(value).map_err(|err| PatchError::InvalidDocument(err.to_string()))?;
    let patched = apply(&doc, ops)?;
    serde_json::from_value(patched).map_err(|err| PatchError::InvalidDocument(err.to_string()))
}

fn apply_one(doc: &mut Value, index: usize, op: &PatchOperation) -> Result<(), PatchError> {
    match op {
        PatchOperation::Add { path, value } => add(doc, index, path, value.clone()),
        PatchOperation::Remove { path } => remove(doc, index, path).map(|_| ()),
        PatchOperation::Replace { path, value } => replace(doc, index, path, value.clone()),
        PatchOperation::Move { from, path } => {
            if from == path {
                return Ok(());
            }
            if path.starts_with(&format!("{from}/")) {
                return Err(PatchError::MoveIntoChild {
                    index,
                    from: from.clone(),
                    pointer: path.clone(),
                });
            }
            let value = remove(doc, index, from)?;
            add(doc, index, path, value)
        }
        PatchOperation::Copy { from, path } => {
            let value = lookup(doc, index, from)?.clone();
            add(doc, index, path, value)
        }
        PatchOperation::Test { path, value } => {
            if lookup(doc, index, path)? == value {
                Ok(())
            } else {
                Err(PatchError::TestFailed {
                    index,
                    pointer: path.clone(),
                })
            }
        }
    }
}

fn add(doc: &mut Value, index: usize, pointer: &str, value: Value) -> Result<(), PatchError> {
    let Some((parent_tokens, last)) = split_pointer(index, pointer)? else {
        *doc = value;
        return Ok(());
    };
    let parent = walk_mut(doc, index, pointer, &parent_tokens)?;
    match parent {
        Value::Object(map) => {
            map.insert(last, value);
            Ok(())
        }
        Value::Array(items) => {
            let position = if last == "-" {
                items.len()
            } else {
                parse_index(index, pointer, &last, items.len() + 1)?
            };
            items.insert(position, value);
            Ok(())
        }
        other => Err(type_mismatch(index, pointer, other)),
    }
}

fn remove(doc: &mut Value, index: usize, pointer: &str) -> Result<Value, PatchError> {
    let Some((parent_tokens, last)) = split_pointer(index, pointer)? else {
        return Ok(std::mem::replace(doc, Value::Null));
    };
    let parent = walk_mut(doc, index, pointer, &parent_tokens)?;
    match parent {
        Value::Object(map) => map.remove(&last).ok_or_else(|| PatchError::PathNotFound {
            index,
            pointer: pointer.to_string(),
        }),
        Value::Array(items) => {
            let position = parse_index(index, pointer, &last, items.len())?;
            Ok(items.remove(position))
        }
        other => Err(type_mismatch(index, pointer, other)),
    }
}

fn replace(doc: &mut Value, index: usize, pointer: &str, value: Value) -> Result<(), PatchError> {
    let target = lookup_mut(doc, index, pointer)?;
    *target = value;
    Ok(())
}

fn lookup<'a>(doc: &'a Value, index: usize, pointer: &str) -> Result<&'a Value, PatchError> {
    let tokens = parse_pointer(index, pointer)?;
    let mut current = doc;
    for token in &tokens {
        current = match current {
            Value::Object(map) => map.get(token).ok_or_else(|| PatchError::PathNotFound {
                index,
                pointer: pointer.to_string(),
            })?,
            Value::Array(items) => {
                let position = parse_index(index, pointer, token, items.len())?;
                &items[position]
            }
            other => return Err(type_mismatch(index, pointer, other)),
        };
    }
    Ok(current)
}

fn lookup_mut<'a>(
    doc: &'a mut Value,
    index: usize,
    pointer: &str,
) -> Result<&'a mut Value, PatchError> {
    let tokens = parse_pointer(index, pointer)?;
    walk_mut(doc, index, pointer, &tokens)
}

fn walk_mut<'a>(
    doc: &'a mut Value,
    index: usize,
    pointer: &str,
    tokens: &[String],
) -> Result<&'a mut Value, PatchError> {
    let mut current = doc;
    for token in tokens {
        current = match current {
            Value::Object(map) => map.get_mut(token).ok_or_else(|| PatchError::PathNotFound {
                index,
                pointer: pointer.to_string(),
            })?,
            Value::Array(items) => {
                let position = parse_index(index, pointer, token, items.len())?;
                &mut items[position]
            }
            other => return Err(type_mismatch(index, pointer, other)),
        };
    }
    Ok(current)
}

/// Splits a pointer into parent tokens and the final token. `None` means the
/// pointer addresses the whole document.
fn split_pointer(index: usize, pointer: &str) -> Result<Option<(Vec<String>, String)>, PatchError> {
    let mut tokens = parse_pointer(index, pointer)?;
    Ok(tokens.pop().map(|last| (tokens, last)))
}

fn parse_pointer(index: usize, pointer: &str) -> Result<Vec<String>, PatchError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(PatchError::InvalidPointer {
            index,
            pointer: pointer.to_string(),
        });
    };
    rest.split('/')
        .map(|raw| unescape_token(raw).ok_or_else(|| PatchError::InvalidPointer {
            index,
            pointer: pointer.to_string(),
        }))
        .collect()
}

fn unescape_token(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '~' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return None,
        }
    }
    Some(out)
}

/// Parses an array index token, rejecting leading zeros and anything `>= bound`.
fn parse_index(index: usize, pointer: &str, token: &str, bound: usize) -> Result<usize, PatchError> {
    let invalid = || PatchError::InvalidIndex {
        index,
        pointer: pointer.to_string(),
        token: token.to_string(),
    };
    if token.is_empty()
        || !token.bytes().all(|b| b.is_ascii_digit())
        || (token.len() > 1 && token.starts_with('0'))
    {
        return Err(invalid());
    }
    let position: usize = token.parse().map_err(|_| invalid())?;
    if position >= bound {
        return Err(PatchError::PathNotFound {
            index,
            pointer: pointer.to_string(),
        });
    }
    Ok(position)
}

fn type_mismatch(index: usize, pointer: &str, found: &Value) -> PatchError {
    PatchError::TypeMismatch {
        index,
        pointer: pointer.to_string(),
        found: value_kind(found),
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
