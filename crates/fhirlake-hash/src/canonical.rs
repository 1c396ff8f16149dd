//! Canonical string forms for hashable input.

use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::{HashError, Result};

/// Input classified into one of the two hashable kinds.
#[derive(Debug, Clone, Copy)]
pub enum CanonicalInput<'a> {
    /// Free text, hashed unchanged.
    Text(&'a str),
    /// A structured record, hashed in its key-sorted serialization.
    Record(&'a Map<String, Value>),
}

impl<'a> CanonicalInput<'a> {
    /// Classify a JSON value. Only strings and objects are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::InvalidInputKind`] for null, booleans, numbers
    /// and arrays.
    pub fn classify(value: &'a Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(Self::Text(s)),
            Value::Object(map) => Ok(Self::Record(map)),
            other => Err(HashError::InvalidInputKind(kind_name(other))),
        }
    }

    /// Produce the canonical string for this input.
    pub fn canonical(&self) -> Result<Cow<'a, str>> {
        match *self {
            Self::Text(s) => Ok(Cow::Borrowed(s)),
            Self::Record(map) => {
                let mut out = String::new();
                write_object(map, &mut out)?;
                Ok(Cow::Owned(out))
            }
        }
    }
}

/// Anything that can be reduced to a canonical string before hashing.
pub trait Hashable {
    /// The canonical string form of `self`.
    fn canonical_form(&self) -> Result<Cow<'_, str>>;
}

impl Hashable for str {
    fn canonical_form(&self) -> Result<Cow<'_, str>> {
        Ok(Cow::Borrowed(self))
    }
}

impl Hashable for String {
    fn canonical_form(&self) -> Result<Cow<'_, str>> {
        Ok(Cow::Borrowed(self.as_str()))
    }
}

impl Hashable for Map<String, Value> {
    fn canonical_form(&self) -> Result<Cow<'_, str>> {
        CanonicalInput::Record(self).canonical()
    }
}

impl Hashable for Value {
    fn canonical_form(&self) -> Result<Cow<'_, str>> {
        CanonicalInput::classify(self)?.canonical()
    }
}

impl Hashable for CanonicalInput<'_> {
    fn canonical_form(&self) -> Result<Cow<'_, str>> {
        self.canonical()
    }
}

/// Reduce `input` to its canonical string.
///
/// Text is returned unchanged. Records are serialized with keys sorted in
/// ascending lexicographic order at every nesting level and no whitespace
/// between tokens. Array order is preserved.
///
/// # Errors
///
/// Returns [`HashError::InvalidInputKind`] when given a JSON value that is
/// neither a string nor an object.
pub fn canonicalize<T: Hashable + ?Sized>(input: &T) -> Result<Cow<'_, str>> {
    input.canonical_form()
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn write_value(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&serde_json::to_string(s)?),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => write_object(map, out)?,
    }
    Ok(())
}

// Keys are sorted explicitly; `Map` iteration order depends on whether
// serde_json's `preserve_order` feature is enabled anywhere in the build.
fn write_object(map: &Map<String, Value>, out: &mut String) -> Result<()> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_unstable();

    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&serde_json::to_string(key)?);
        out.push(':');
        write_value(&map[key], out)?;
    }
    out.push('}');
    Ok(())
}
