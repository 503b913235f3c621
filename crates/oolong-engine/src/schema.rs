//! Schema metadata: tables, fields, constraints, indexes, sequences.

use serde::{Deserialize, Serialize};

use oolong_common::namespace::Namespace;
use oolong_common::types::ValueType;
use oolong_common::{Error, Result};

use crate::expr::Expr;

/// An inline record type attached to a document field.
///
/// Carries its own field constraints for nested records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnonymousType {
    /// Constraints of the nested document's fields.
    pub field_constraints: FieldConstraints,
}

/// A single field declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConstraint {
    /// Dense position of the field in the declaration order.
    pub position: usize,
    /// Field name.
    pub field: String,
    /// Declared type; [`ValueType::Any`] leaves values untyped.
    pub ty: ValueType,
    /// Rejects NULL at encode time.
    pub is_not_null: bool,
    /// Expression producing the value when the field is missing.
    pub default_value: Option<Expr>,
    /// Nested record type for document fields.
    pub anonymous_type: Option<AnonymousType>,
}

impl FieldConstraint {
    /// Creates a plain field constraint at `position`.
    #[must_use]
    pub fn new(position: usize, field: impl Into<String>, ty: ValueType) -> Self {
        Self {
            position,
            field: field.into(),
            ty,
            is_not_null: false,
            default_value: None,
            anonymous_type: None,
        }
    }

    /// Marks the field `NOT NULL`.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.is_not_null = true;
        self
    }

    /// Attaches a default-value expression.
    #[must_use]
    pub fn with_default(mut self, expr: Expr) -> Self {
        self.default_value = Some(expr);
        self
    }

    /// Attaches a nested record type.
    #[must_use]
    pub fn with_anonymous_type(mut self, anon: AnonymousType) -> Self {
        self.anonymous_type = Some(anon);
        self
    }
}

/// The ordered field declarations of a table or nested record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConstraints {
    /// Declarations, dense by position.
    pub fields: Vec<FieldConstraint>,
    /// Accepts fields beyond the declared set.
    pub allow_extra_fields: bool,
}

impl FieldConstraints {
    /// Appends a declaration, enforcing dense positions and unique names.
    pub fn add(&mut self, fc: FieldConstraint) -> Result<()> {
        if fc.field.is_empty() {
            return Err(Error::invalid("empty field name"));
        }
        if fc.position != self.fields.len() {
            return Err(Error::invalid(format!(
                "field '{}' declared at position {}, expected {}",
                fc.field,
                fc.position,
                self.fields.len()
            )));
        }
        if self.get(&fc.field).is_some() {
            return Err(Error::AlreadyExists {
                name: fc.field.clone(),
            });
        }
        self.fields.push(fc);
        Ok(())
    }

    /// Returns the declaration of `field`, if any.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldConstraint> {
        self.fields.iter().find(|fc| fc.field == field)
    }

    /// Number of declared fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns true if the first segment of `path` resolves to a
    /// declared field, or extras are allowed.
    #[must_use]
    pub fn resolves(&self, path: &str) -> bool {
        let head = path.split('.').next().unwrap_or(path);
        self.allow_extra_fields || self.get(head).is_some()
    }
}

/// A composite table-level predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableConstraint {
    /// The fields whose values form the storage key.
    PrimaryKey {
        /// Constraint name.
        name: String,
        /// Field paths, in key order.
        paths: Vec<String>,
    },
    /// A uniqueness predicate backed by a unique index.
    Unique {
        /// Constraint name.
        name: String,
        /// Field paths, in tuple order.
        paths: Vec<String>,
    },
    /// An arbitrary boolean predicate over each row.
    Check {
        /// Constraint name.
        name: String,
        /// The predicate.
        expr: Expr,
    },
}

impl TableConstraint {
    /// The constraint's name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            TableConstraint::PrimaryKey { name, .. }
            | TableConstraint::Unique { name, .. }
            | TableConstraint::Check { name, .. } => name,
        }
    }
}

/// The table constraints, in declaration order.
pub type TableConstraints = Vec<TableConstraint>;

/// A table's schema and storage location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Namespace holding the table's rows.
    pub store_namespace: Namespace,
    /// Ordered field declarations.
    pub field_constraints: FieldConstraints,
    /// Composite predicates.
    pub table_constraints: TableConstraints,
}

impl TableInfo {
    /// Creates an empty table schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Appends a field declaration.
    pub fn add_field_constraint(&mut self, fc: FieldConstraint) -> Result<()> {
        self.field_constraints.add(fc)
    }

    /// Appends table constraints, enforcing primary-key uniqueness and
    /// path resolution.
    pub fn add_table_constraints(&mut self, tcs: TableConstraints) -> Result<()> {
        for tc in tcs {
            if let TableConstraint::PrimaryKey { .. } = &tc {
                if self.primary_key().is_some() {
                    return Err(Error::invalid(format!(
                        "table '{}' already has a primary key",
                        self.name
                    )));
                }
            }
            let paths: &[String] = match &tc {
                TableConstraint::PrimaryKey { paths, .. }
                | TableConstraint::Unique { paths, .. } => paths,
                TableConstraint::Check { .. } => &[],
            };
            for path in paths {
                if !self.field_constraints.resolves(path) {
                    return Err(Error::FieldNotFound { name: path.clone() });
                }
            }
            self.table_constraints.push(tc);
        }
        Ok(())
    }

    /// Returns the primary-key paths, if a primary key is declared.
    #[must_use]
    pub fn primary_key(&self) -> Option<&[String]> {
        self.table_constraints.iter().find_map(|tc| match tc {
            TableConstraint::PrimaryKey { paths, .. } => Some(paths.as_slice()),
            _ => None,
        })
    }

    /// Validates the whole schema; used before registering in the
    /// catalog.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid("empty table name"));
        }
        let mut pk_seen = false;
        for tc in &self.table_constraints {
            if let TableConstraint::PrimaryKey { .. } = tc {
                if pk_seen {
                    return Err(Error::invalid(format!(
                        "table '{}' declares more than one primary key",
                        self.name
                    )));
                }
                pk_seen = true;
            }
            let paths: &[String] = match tc {
                TableConstraint::PrimaryKey { paths, .. }
                | TableConstraint::Unique { paths, .. } => paths,
                TableConstraint::Check { .. } => &[],
            };
            for path in paths {
                if !self.field_constraints.resolves(path) {
                    return Err(Error::FieldNotFound { name: path.clone() });
                }
            }
        }
        Ok(())
    }
}

/// The table (and paths) whose lifecycle an index is coupled to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    /// Owning table.
    pub table: String,
    /// The paths the index mirrors.
    pub paths: Vec<String>,
}

/// An index's schema and storage location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Indexed table.
    pub table_name: String,
    /// Indexed field paths, in tuple order.
    pub paths: Vec<String>,
    /// Rejects duplicate tuples.
    pub unique: bool,
    /// Namespace holding the index entries.
    pub store_namespace: Namespace,
    /// Lifecycle owner.
    pub owner: Owner,
}

/// A sequence's persistent description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceInfo {
    /// Sequence name.
    pub name: String,
    /// First value vended.
    pub start: i64,
    /// Step between values.
    pub increment_by: i64,
    /// Watermark lease size; larger leases mean fewer writes.
    pub lease: i64,
}

impl SequenceInfo {
    /// Creates a sequence starting at 1 with the default lease.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: 1,
            increment_by: 1,
            lease: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oolong_common::types::Value;

    #[test]
    fn test_field_constraints_dense_positions() {
        let mut fcs = FieldConstraints::default();
        fcs.add(FieldConstraint::new(0, "a", ValueType::Integer))
            .unwrap();
        let err = fcs
            .add(FieldConstraint::new(2, "b", ValueType::Text))
            .unwrap_err();
        assert_eq!(err.kind(), oolong_common::ErrorKind::Invalid);
    }

    #[test]
    fn test_field_constraints_unique_names() {
        let mut fcs = FieldConstraints::default();
        fcs.add(FieldConstraint::new(0, "a", ValueType::Integer))
            .unwrap();
        let err = fcs
            .add(FieldConstraint::new(1, "a", ValueType::Text))
            .unwrap_err();
        assert_eq!(err.kind(), oolong_common::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_single_primary_key() {
        let mut info = TableInfo::new("t");
        info.add_field_constraint(FieldConstraint::new(0, "a", ValueType::Integer))
            .unwrap();
        info.add_field_constraint(FieldConstraint::new(1, "b", ValueType::Integer))
            .unwrap();
        info.add_table_constraints(vec![TableConstraint::PrimaryKey {
            name: "pk_t".into(),
            paths: vec!["a".into()],
        }])
        .unwrap();

        let err = info
            .add_table_constraints(vec![TableConstraint::PrimaryKey {
                name: "pk_t2".into(),
                paths: vec!["b".into()],
            }])
            .unwrap_err();
        assert_eq!(err.kind(), oolong_common::ErrorKind::Invalid);
        assert_eq!(info.primary_key(), Some(&["a".to_string()][..]));
    }

    #[test]
    fn test_constraint_paths_must_resolve() {
        let mut info = TableInfo::new("t");
        info.add_field_constraint(FieldConstraint::new(0, "a", ValueType::Integer))
            .unwrap();
        let err = info
            .add_table_constraints(vec![TableConstraint::Unique {
                name: "u".into(),
                paths: vec!["missing".into()],
            }])
            .unwrap_err();
        assert_eq!(err.kind(), oolong_common::ErrorKind::NotFound);

        // Extra fields relax the resolution requirement.
        info.field_constraints.allow_extra_fields = true;
        info.add_table_constraints(vec![TableConstraint::Unique {
            name: "u".into(),
            paths: vec!["missing".into()],
        }])
        .unwrap();
    }

    #[test]
    fn test_table_info_serde_round_trip() {
        let mut info = TableInfo::new("t");
        info.add_field_constraint(
            FieldConstraint::new(0, "a", ValueType::Double)
                .not_null()
                .with_default(Expr::literal(Value::Int(10))),
        )
        .unwrap();
        let json = serde_json::to_string(&info).unwrap();
        let back: TableInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
