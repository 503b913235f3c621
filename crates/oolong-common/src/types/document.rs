//! Ordered field maps.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Value;

/// A logical map from field name to value.
///
/// Field order is preserved as inserted; equality compares documents as
/// maps, ignoring field order. Duplicate field names are rejected by
/// [`Document::insert`] overwriting the previous value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Creates an empty document with room for `capacity` fields.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the value of `field`, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Returns a mutable reference to the value of `field`, if present.
    #[must_use]
    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Returns true if `field` is present.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Sets `field` to `value`, overwriting any previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        let field = field.into();
        if let Some(slot) = self.fields.iter_mut().find(|(name, _)| *name == field) {
            slot.1 = value;
        } else {
            self.fields.push((field, value));
        }
    }

    /// Removes `field`, returning its value if it was present.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(name, _)| name == field)?;
        Some(self.fields.remove(pos).1)
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Sorts the fields lexicographically by name.
    pub fn sort_fields(&mut self) {
        self.fields.sort_by(|(a, _), (b, _)| a.cmp(b));
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        if self.fields.len() != other.fields.len() {
            return false;
        }
        self.fields
            .iter()
            .all(|(name, value)| other.get(name) == Some(value))
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut doc = Document::new();
        for (name, value) in iter {
            doc.insert(name, value);
        }
        doc
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// Builds a [`Document`] from `name => value` pairs.
///
/// ```rust
/// use oolong_common::doc;
/// use oolong_common::types::Value;
///
/// let d = doc! { "a" => Value::Int(1), "b" => Value::Text("x".into()) };
/// assert_eq!(d.get("a"), Some(&Value::Int(1)));
/// ```
#[macro_export]
macro_rules! doc {
    () => { $crate::types::Document::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut d = $crate::types::Document::new();
        $(d.insert($name, $value);)+
        d
    }};
}
