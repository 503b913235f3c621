//! Dynamic value model.
//!
//! User data enters the engine as arbitrary maps and becomes a tagged
//! variant [`Value`] with a finite kind set. Coercion toward a declared
//! [`ValueType`] happens at encode time; contexts without a declared type
//! (extra fields, array elements, untyped nested documents) normalize
//! integers to doubles.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::Document;

/// The declared type of a field, or [`ValueType::Any`] when undeclared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// No declared type; values are stored with untyped normalization.
    Any,
    /// Boolean.
    Boolean,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit IEEE-754 float.
    Double,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Blob,
    /// Ordered list of values.
    Array,
    /// Nested document.
    Document,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::Any => "any",
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::Double => "double",
            ValueType::Text => "text",
            ValueType::Blob => "blob",
            ValueType::Array => "array",
            ValueType::Document => "document",
        };
        write!(f, "{s}")
    }
}

/// A dynamically typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL. Sorts before every non-null value of its column.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// Nested document.
    Document(Document),
}

impl Value {
    /// Returns the kind of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Any,
            Value::Bool(_) => ValueType::Boolean,
            Value::Int(_) => ValueType::Integer,
            Value::Double(_) => ValueType::Double,
            Value::Text(_) => ValueType::Text,
            Value::Blob(_) => ValueType::Blob,
            Value::Array(_) => ValueType::Array,
            Value::Document(_) => ValueType::Document,
        }
    }

    /// Returns true if this value is NULL.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean interpretation used by CHECK constraints.
    ///
    /// NULL yields `None`; every non-boolean value is an error at the
    /// caller, so only `Bool` maps to `Some`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to coerce this value to the declared `target` type.
    ///
    /// Returns `None` when the value's kind is incompatible. NULL passes
    /// through every target unchanged; `NOT NULL` enforcement happens at
    /// the caller. Integers widen to doubles; no other implicit
    /// conversion is performed.
    #[must_use]
    pub fn coerce_to(self, target: ValueType) -> Option<Value> {
        if self.is_null() {
            return Some(self);
        }
        match (target, self) {
            (ValueType::Any, v) => Some(v.normalize_untyped()),
            (ValueType::Boolean, v @ Value::Bool(_)) => Some(v),
            (ValueType::Integer, v @ Value::Int(_)) => Some(v),
            (ValueType::Double, Value::Int(i)) => Some(Value::Double(i as f64)),
            (ValueType::Double, v @ Value::Double(_)) => Some(v),
            (ValueType::Text, v @ Value::Text(_)) => Some(v),
            (ValueType::Blob, v @ Value::Blob(_)) => Some(v),
            (ValueType::Array, Value::Array(items)) => Some(Value::Array(
                items.into_iter().map(Value::normalize_untyped).collect(),
            )),
            (ValueType::Document, v @ Value::Document(_)) => Some(v),
            _ => None,
        }
    }

    /// Applies untyped normalization: integers widen to doubles,
    /// recursively through arrays and documents.
    #[must_use]
    pub fn normalize_untyped(self) -> Value {
        match self {
            Value::Int(i) => Value::Double(i as f64),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::normalize_untyped).collect())
            }
            Value::Document(doc) => Value::Document(
                doc.into_iter()
                    .map(|(name, value)| (name, value.normalize_untyped()))
                    .collect(),
            ),
            other => other,
        }
    }

    /// Compares two values of comparable kinds.
    ///
    /// Integers and doubles compare numerically across kinds; NULL
    /// compares only against NULL. Incomparable kinds yield `None`.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Blob(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Document(doc) => write!(f, "{doc}"),
        }
    }
}
