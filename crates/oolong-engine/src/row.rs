//! Row codec: documents against field constraints.
//!
//! Encoding applies the declared schema: `NOT NULL` checks, default
//! expressions, and type coercion happen here, so a stored row always
//! conforms to the constraints it was written under. Declared fields are
//! stored positionally; extra fields, when allowed, follow as a single
//! untyped trailer document sorted by name.

use oolong_common::error::ConstraintKind;
use oolong_common::types::{Document, Value};
use oolong_common::{Error, Result};

use crate::expr::{resolve_path, Env};
use crate::schema::{FieldConstraints, TableConstraint, TableInfo};

/// Applies the constraints to `doc`, producing the conforming document.
///
/// Declared fields come first in declaration order (missing fields take
/// their default, or NULL), followed by the extra fields sorted by name
/// with untyped normalization applied.
pub fn validate_document(fcs: &FieldConstraints, doc: &Document) -> Result<Document> {
    let mut out = Document::with_capacity(doc.len().max(fcs.len()));

    for fc in &fcs.fields {
        let value = match doc.get(&fc.field) {
            Some(value) => value.clone(),
            None => match &fc.default_value {
                Some(expr) => expr.eval(&Env::new(doc))?,
                None => Value::Null,
            },
        };

        if value.is_null() {
            if fc.is_not_null {
                return Err(Error::ConstraintViolation {
                    field: fc.field.clone(),
                    constraint: ConstraintKind::NotNull,
                });
            }
            out.insert(fc.field.clone(), Value::Null);
            continue;
        }

        let value = match (&fc.anonymous_type, value) {
            (Some(anon), Value::Document(sub)) => {
                Value::Document(validate_document(&anon.field_constraints, &sub)?)
            }
            (Some(_), _) => {
                return Err(Error::ConstraintViolation {
                    field: fc.field.clone(),
                    constraint: ConstraintKind::Type,
                });
            }
            (None, value) => value.coerce_to(fc.ty).ok_or_else(|| Error::ConstraintViolation {
                field: fc.field.clone(),
                constraint: ConstraintKind::Type,
            })?,
        };
        out.insert(fc.field.clone(), value);
    }

    let mut extras: Vec<(String, Value)> = doc
        .iter()
        .filter(|(name, _)| fcs.get(name).is_none())
        .map(|(name, value)| (name.to_string(), value.clone().normalize_untyped()))
        .collect();
    if !extras.is_empty() {
        if !fcs.allow_extra_fields {
            let (name, _) = &extras[0];
            return Err(Error::invalid(format!(
                "field '{name}' is not declared in the schema"
            )));
        }
        extras.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (name, value) in extras {
            out.insert(name, value);
        }
    }

    Ok(out)
}

/// Evaluates the table's CHECK constraints against a conforming document.
pub fn check_constraints(info: &TableInfo, doc: &Document) -> Result<()> {
    for tc in &info.table_constraints {
        if let TableConstraint::Check { name, expr } = tc {
            match expr.eval(&Env::new(doc))? {
                Value::Bool(true) | Value::Null => {}
                _ => {
                    return Err(Error::ConstraintViolation {
                        field: name.clone(),
                        constraint: ConstraintKind::Check,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Encodes `doc` under the constraints, validating it first.
pub fn encode_document(fcs: &FieldConstraints, doc: &Document) -> Result<Vec<u8>> {
    let validated = validate_document(fcs, doc)?;
    let mut buf = Vec::new();
    for fc in &fcs.fields {
        let value = validated.get(&fc.field).unwrap_or(&Value::Null);
        oolong_encoding::encode_value(&mut buf, value);
    }

    let extras: Document = validated
        .iter()
        .filter(|(name, _)| fcs.get(name).is_none())
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect();
    if !extras.is_empty() {
        oolong_encoding::encode_value(&mut buf, &Value::Document(extras));
    }
    Ok(buf)
}

/// Decodes a row previously produced by [`encode_document`].
pub fn decode_document(fcs: &FieldConstraints, buf: &[u8]) -> Result<Document> {
    let mut doc = Document::with_capacity(fcs.len());
    let mut offset = 0;
    for fc in &fcs.fields {
        let (value, read) = oolong_encoding::decode_value(&buf[offset..])?;
        offset += read;
        doc.insert(fc.field.clone(), value);
    }
    if offset < buf.len() {
        let (extras, read) = oolong_encoding::decode_value(&buf[offset..])?;
        offset += read;
        match extras {
            Value::Document(extras) => {
                for (name, value) in extras {
                    doc.insert(name, value);
                }
            }
            _ => return Err(Error::corruption("row trailer is not a document")),
        }
    }
    if offset != buf.len() {
        return Err(Error::corruption("trailing bytes after encoded row"));
    }
    Ok(doc)
}

/// Encodes the primary-key tuple of a conforming document.
///
/// Returns `None` when the table has no primary key; key fields are
/// implicitly `NOT NULL`.
pub fn encode_primary_key(info: &TableInfo, doc: &Document) -> Result<Option<Vec<u8>>> {
    let Some(paths) = info.primary_key() else {
        return Ok(None);
    };
    let mut buf = Vec::new();
    for path in paths {
        let value = resolve_path(doc, path);
        match value {
            None | Some(Value::Null) => {
                return Err(Error::ConstraintViolation {
                    field: path.clone(),
                    constraint: ConstraintKind::NotNull,
                });
            }
            Some(value) => oolong_encoding::encode_value(&mut buf, value),
        }
    }
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::schema::{AnonymousType, FieldConstraint};
    use oolong_common::doc;
    use oolong_common::types::ValueType;

    /// a INT, b TEXT, c DOUBLE NOT NULL, d DOUBLE DEFAULT 10, e DOUBLE,
    /// with extra fields allowed.
    fn seed_constraints() -> FieldConstraints {
        let mut fcs = FieldConstraints::default();
        fcs.add(FieldConstraint::new(0, "a", ValueType::Integer))
            .unwrap();
        fcs.add(FieldConstraint::new(1, "b", ValueType::Text))
            .unwrap();
        fcs.add(FieldConstraint::new(2, "c", ValueType::Double).not_null())
            .unwrap();
        fcs.add(
            FieldConstraint::new(3, "d", ValueType::Double)
                .with_default(Expr::literal(Value::Int(10))),
        )
        .unwrap();
        fcs.add(FieldConstraint::new(4, "e", ValueType::Double))
            .unwrap();
        fcs.allow_extra_fields = true;
        fcs
    }

    #[test]
    fn test_encode_decode_with_defaults_and_extras() {
        let fcs = seed_constraints();
        let input = doc! {
            "a" => Value::Int(1),
            "b" => Value::Text("hello".into()),
            "c" => Value::Double(3.14),
            "e" => Value::Int(100),
            "f" => Value::Int(1000),
            "g" => Value::Double(2000.0),
            "array" => Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            "doc" => Value::Document(doc! { "a" => Value::Int(10) }),
        };

        let buf = encode_document(&fcs, &input).unwrap();
        let decoded = decode_document(&fcs, &buf).unwrap();

        let want = doc! {
            "a" => Value::Int(1),
            "b" => Value::Text("hello".into()),
            "c" => Value::Double(3.14),
            "d" => Value::Double(10.0),
            "e" => Value::Double(100.0),
            "f" => Value::Double(1000.0),
            "g" => Value::Double(2000.0),
            "array" => Value::Array(vec![
                Value::Double(1.0),
                Value::Double(2.0),
                Value::Double(3.0),
            ]),
            "doc" => Value::Document(doc! { "a" => Value::Double(10.0) }),
        };
        assert_eq!(decoded, want);
    }

    #[test]
    fn test_encode_decode_nested_documents() {
        // a DOCUMENT(*), b DOCUMENT(d TEXT, *), c INT
        let mut fcs = FieldConstraints::default();
        fcs.add(
            FieldConstraint::new(0, "a", ValueType::Document).with_anonymous_type(AnonymousType {
                field_constraints: FieldConstraints {
                    allow_extra_fields: true,
                    ..FieldConstraints::default()
                },
            }),
        )
        .unwrap();

        let mut sub = FieldConstraints::default();
        sub.add(FieldConstraint::new(0, "d", ValueType::Text))
            .unwrap();
        sub.allow_extra_fields = true;
        fcs.add(
            FieldConstraint::new(1, "b", ValueType::Document).with_anonymous_type(AnonymousType {
                field_constraints: sub,
            }),
        )
        .unwrap();
        fcs.add(FieldConstraint::new(2, "c", ValueType::Integer))
            .unwrap();

        let input = doc! {
            "a" => Value::Document(doc! {
                "w" => Value::Text("hello".into()),
                "x" => Value::Int(1),
            }),
            "b" => Value::Document(doc! {
                "d" => Value::Text("bye".into()),
                "e" => Value::Int(2),
            }),
            "c" => Value::Int(100),
        };

        let buf = encode_document(&fcs, &input).unwrap();
        let decoded = decode_document(&fcs, &buf).unwrap();

        let want = doc! {
            "a" => Value::Document(doc! {
                "w" => Value::Text("hello".into()),
                "x" => Value::Double(1.0),
            }),
            "b" => Value::Document(doc! {
                "d" => Value::Text("bye".into()),
                "e" => Value::Double(2.0),
            }),
            "c" => Value::Int(100),
        };
        assert_eq!(decoded, want);
    }

    #[test]
    fn test_not_null_violation() {
        let fcs = seed_constraints();
        let input = doc! { "a" => Value::Int(1) };
        let err = encode_document(&fcs, &input).unwrap_err();
        assert!(matches!(
            err,
            Error::ConstraintViolation {
                ref field,
                constraint: ConstraintKind::NotNull,
            } if field == "c"
        ));
    }

    #[test]
    fn test_type_violation() {
        let fcs = seed_constraints();
        let input = doc! {
            "a" => Value::Text("not an int".into()),
            "c" => Value::Double(1.0),
        };
        let err = encode_document(&fcs, &input).unwrap_err();
        assert!(matches!(
            err,
            Error::ConstraintViolation {
                ref field,
                constraint: ConstraintKind::Type,
            } if field == "a"
        ));
    }

    #[test]
    fn test_unknown_field_rejected_without_extras() {
        let mut fcs = FieldConstraints::default();
        fcs.add(FieldConstraint::new(0, "a", ValueType::Integer))
            .unwrap();
        let input = doc! { "a" => Value::Int(1), "zz" => Value::Int(2) };
        let err = encode_document(&fcs, &input).unwrap_err();
        assert_eq!(err.kind(), oolong_common::ErrorKind::Invalid);
    }

    #[test]
    fn test_check_constraint() {
        let mut info = TableInfo::new("t");
        info.add_field_constraint(FieldConstraint::new(0, "a", ValueType::Integer))
            .unwrap();
        info.add_table_constraints(vec![TableConstraint::Check {
            name: "a_positive".into(),
            expr: Expr::compare(
                crate::expr::CompareOp::Gt,
                Expr::field("a"),
                Expr::literal(Value::Int(0)),
            ),
        }])
        .unwrap();

        check_constraints(&info, &doc! { "a" => Value::Int(1) }).unwrap();
        let err = check_constraints(&info, &doc! { "a" => Value::Int(-1) }).unwrap_err();
        assert!(matches!(
            err,
            Error::ConstraintViolation {
                constraint: ConstraintKind::Check,
                ..
            }
        ));
        // NULL passes CHECK.
        check_constraints(&info, &doc! { "a" => Value::Null }).unwrap();
    }

    #[test]
    fn test_encode_primary_key() {
        let mut info = TableInfo::new("t");
        info.add_field_constraint(FieldConstraint::new(0, "a", ValueType::Integer))
            .unwrap();
        info.add_table_constraints(vec![TableConstraint::PrimaryKey {
            name: "pk".into(),
            paths: vec!["a".into()],
        }])
        .unwrap();

        let pk = encode_primary_key(&info, &doc! { "a" => Value::Int(7) })
            .unwrap()
            .unwrap();
        assert_eq!(pk, oolong_encoding::encoded_value(&Value::Int(7)));

        let err = encode_primary_key(&info, &doc! { "b" => Value::Int(7) }).unwrap_err();
        assert_eq!(err.kind(), oolong_common::ErrorKind::ConstraintViolation);
    }
}
