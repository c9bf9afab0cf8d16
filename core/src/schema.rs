//! Shape descriptors and structural validation.
//!
//! This module provides the [`Shape`] type: a declarative description of the
//! structure a dynamic [`Value`] must have at a boundary. Shapes gate three
//! boundaries in the architecture:
//!
//! - event payloads, validated at the emit boundary by the event bus
//! - fetch-time initial state, validated against a store's declared shape
//! - dependency values, validated against a store's declared dep shapes
//!
//! Validating at the boundary (rather than inside each consumer) centralizes
//! the contract and fails fast with a single error regardless of how many
//! handlers or stores consume the value.
//!
//! # Strictness
//!
//! [`Shape::Object`] is strict: a field present in the value but absent from
//! the shape is an error, as is a declared field missing from the value. Use
//! [`Shape::Optional`] for fields that may be omitted and [`Shape::MapOf`]
//! for open-ended string-keyed mappings.
//!
//! # Example
//!
//! ```
//! use statebus_core::shape;
//! use serde_json::json;
//!
//! let item_added = shape! {
//!     "sku": String,
//!     "quantity": Integer,
//! };
//!
//! assert!(item_added.check(&json!({ "sku": "A-1", "quantity": 2 })).is_ok());
//! assert!(item_added.check(&json!({ "sku": "A-1", "quantity": "2" })).is_err());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors produced by structural validation.
///
/// Every variant carries the dot-separated path from the root of the checked
/// value to the offending field (`$` denotes the root itself), so callers can
/// report exactly which part of a payload or configuration was malformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A value did not have the declared type.
    #[error("shape mismatch at {path}: expected {expected}, found {found}")]
    Mismatch {
        /// Path to the offending value (`$` for the root).
        path: String,
        /// The declared shape, rendered for display.
        expected: String,
        /// The JSON type actually found.
        found: String,
    },

    /// A field declared by an object shape was absent from the value.
    #[error("missing field at {path}")]
    MissingField {
        /// Path to the missing field.
        path: String,
    },

    /// The value carried a field the object shape does not declare.
    #[error("unexpected field at {path}")]
    UnexpectedField {
        /// Path to the undeclared field.
        path: String,
    },
}

/// A structural shape descriptor.
///
/// One tagged variant per recognized field type, evaluated against a
/// [`Value`] by [`Shape::check`]. Shapes are plain data: they can be built
/// programmatically, via the [`shape!`](crate::shape) macro, or deserialized
/// from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// Any JSON string.
    String,
    /// A JSON number with no fractional part (fits `i64`/`u64`).
    Integer,
    /// Any JSON number.
    Float,
    /// A JSON boolean.
    Boolean,
    /// Any value at all, including `null`.
    Any,
    /// Either `null`/absent or a value matching the inner shape.
    Optional(Box<Shape>),
    /// A JSON array whose every element matches the inner shape.
    Array(Box<Shape>),
    /// A string-keyed mapping whose every value matches the inner shape;
    /// keys are unconstrained.
    MapOf(Box<Shape>),
    /// A fixed set of named fields. Strict: undeclared fields are rejected.
    Object(BTreeMap<String, Shape>),
}

impl Shape {
    /// Build an [`Shape::Object`] from `(name, shape)` pairs.
    #[must_use]
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Shape)>,
        K: Into<String>,
    {
        Shape::Object(
            fields
                .into_iter()
                .map(|(name, shape)| (name.into(), shape))
                .collect(),
        )
    }

    /// Wrap a shape so that `null` or absence also conforms.
    #[must_use]
    pub fn optional(inner: Shape) -> Self {
        Shape::Optional(Box::new(inner))
    }

    /// A homogeneous array of the inner shape.
    #[must_use]
    pub fn array(inner: Shape) -> Self {
        Shape::Array(Box::new(inner))
    }

    /// An open string-keyed mapping of the inner shape.
    #[must_use]
    pub fn map_of(inner: Shape) -> Self {
        Shape::MapOf(Box::new(inner))
    }

    /// Check a value against this shape.
    ///
    /// Returns on the first violation encountered, depth-first in field
    /// order. Conforming values yield `Ok(())`; the value is never modified.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] describing the first violation, with the
    /// path to the offending field.
    pub fn check(&self, value: &Value) -> Result<(), SchemaError> {
        let mut path = Vec::new();
        self.check_at(value, &mut path)
    }

    fn check_at(&self, value: &Value, path: &mut Vec<String>) -> Result<(), SchemaError> {
        match self {
            Shape::Any => Ok(()),
            Shape::String => match value {
                Value::String(_) => Ok(()),
                other => Err(self.mismatch(other, path)),
            },
            Shape::Integer => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(()),
                other => Err(self.mismatch(other, path)),
            },
            Shape::Float => match value {
                Value::Number(_) => Ok(()),
                other => Err(self.mismatch(other, path)),
            },
            Shape::Boolean => match value {
                Value::Bool(_) => Ok(()),
                other => Err(self.mismatch(other, path)),
            },
            Shape::Optional(inner) => match value {
                Value::Null => Ok(()),
                other => inner.check_at(other, path),
            },
            Shape::Array(inner) => match value {
                Value::Array(items) => {
                    for (index, item) in items.iter().enumerate() {
                        path.push(index.to_string());
                        inner.check_at(item, path)?;
                        path.pop();
                    }
                    Ok(())
                },
                other => Err(self.mismatch(other, path)),
            },
            Shape::MapOf(inner) => match value {
                Value::Object(entries) => {
                    for (key, entry) in entries {
                        path.push(key.clone());
                        inner.check_at(entry, path)?;
                        path.pop();
                    }
                    Ok(())
                },
                other => Err(self.mismatch(other, path)),
            },
            Shape::Object(fields) => match value {
                Value::Object(entries) => {
                    for (name, shape) in fields {
                        path.push(name.clone());
                        match entries.get(name) {
                            Some(entry) => shape.check_at(entry, path)?,
                            None if matches!(shape, Shape::Optional(_)) => {},
                            None => {
                                return Err(SchemaError::MissingField {
                                    path: render_path(path),
                                });
                            },
                        }
                        path.pop();
                    }
                    for name in entries.keys() {
                        if !fields.contains_key(name) {
                            path.push(name.clone());
                            return Err(SchemaError::UnexpectedField {
                                path: render_path(path),
                            });
                        }
                    }
                    Ok(())
                },
                other => Err(self.mismatch(other, path)),
            },
        }
    }

    fn mismatch(&self, found: &Value, path: &[String]) -> SchemaError {
        SchemaError::Mismatch {
            path: render_path(path),
            expected: self.to_string(),
            found: json_type_name(found).to_string(),
        }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shape::String => write!(f, "string"),
            Shape::Integer => write!(f, "integer"),
            Shape::Float => write!(f, "float"),
            Shape::Boolean => write!(f, "boolean"),
            Shape::Any => write!(f, "any"),
            Shape::Optional(inner) => write!(f, "optional {inner}"),
            Shape::Array(inner) => write!(f, "array of {inner}"),
            Shape::MapOf(inner) => write!(f, "map of {inner}"),
            Shape::Object(fields) => {
                write!(f, "object {{")?;
                let mut first = true;
                for (name, shape) in fields {
                    if !first {
                        write!(f, ",")?;
                    }
                    write!(f, " {name}: {shape}")?;
                    first = false;
                }
                write!(f, " }}")
            },
        }
    }
}

/// The declared event universe: event name to payload shape.
///
/// Used by the event bus to decide which events exist at all and what their
/// payloads must look like. Declaration is wholesale: installing a schema on
/// the bus replaces the previous one entirely, there is no incremental merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSchema {
    events: BTreeMap<String, Shape>,
}

impl EventSchema {
    /// An empty schema declaring no events.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            events: BTreeMap::new(),
        }
    }

    /// Declare an event, replacing any previous shape under the same name.
    #[must_use]
    pub fn declare(mut self, event: impl Into<String>, shape: Shape) -> Self {
        self.events.insert(event.into(), shape);
        self
    }

    /// Whether `event` is declared.
    #[must_use]
    pub fn contains(&self, event: &str) -> bool {
        self.events.contains_key(event)
    }

    /// The declared payload shape for `event`, if any.
    #[must_use]
    pub fn shape(&self, event: &str) -> Option<&Shape> {
        self.events.get(event)
    }

    /// Iterate over declared event names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    /// Number of declared events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Shape)> for EventSchema {
    fn from_iter<I: IntoIterator<Item = (K, Shape)>>(iter: I) -> Self {
        Self {
            events: iter
                .into_iter()
                .map(|(event, shape)| (event.into(), shape))
                .collect(),
        }
    }
}

/// Render the JSON type of a value for error messages.
#[must_use]
pub const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn render_path(path: &[String]) -> String {
    if path.is_empty() {
        "$".to_string()
    } else {
        format!("$.{}", path.join("."))
    }
}
