//! Index storage, scoped to a transaction.
//!
//! An index maps the indexed path tuple to the row's storage key. Unique
//! indexes key entries by the tuple alone and store the row key as the
//! value; non-unique indexes append the row key to the entry key and
//! store nothing.

use std::sync::Arc;

use oolong_common::types::{Document, Key, Value};
use oolong_common::{Error, Result};

use crate::expr::resolve_path;
use crate::schema::IndexInfo;
use crate::transaction::Transaction;

pub(crate) struct Index<'a> {
    tx: &'a Transaction,
    info: Arc<IndexInfo>,
}

impl<'a> Index<'a> {
    pub fn new(tx: &'a Transaction, info: Arc<IndexInfo>) -> Self {
        Self { tx, info }
    }

    /// Resolves the indexed tuple in `doc`; missing paths index as NULL.
    fn tuple(&self, doc: &Document) -> Vec<Value> {
        self.info
            .paths
            .iter()
            .map(|p| resolve_path(doc, p).cloned().unwrap_or(Value::Null))
            .collect()
    }

    fn tuple_key(&self, values: &[Value]) -> Vec<u8> {
        let mut key = oolong_encoding::namespace_prefix(self.info.store_namespace);
        for value in values {
            oolong_encoding::encode_value(&mut key, value);
        }
        key
    }

    fn describe(values: &[Value]) -> String {
        let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
        format!("({})", rendered.join(", "))
    }

    /// Adds the entry mapping `doc`'s tuple to `row_key`.
    pub fn set(&self, doc: &Document, row_key: &Key) -> Result<()> {
        let values = self.tuple(doc);
        let mut key = self.tuple_key(&values);
        if self.info.unique {
            self.tx.session_put(key, row_key.to_vec())
        } else {
            key.extend_from_slice(row_key);
            self.tx.session_put(key, Vec::new())
        }
    }

    /// Removes the entry mapping `doc`'s tuple to `row_key`.
    pub fn delete(&self, doc: &Document, row_key: &Key) -> Result<()> {
        let values = self.tuple(doc);
        let mut key = self.tuple_key(&values);
        if !self.info.unique {
            key.extend_from_slice(row_key);
        }
        self.tx.session_delete(key)
    }

    /// For unique indexes, fails when `doc`'s tuple is already present
    /// under a different row key.
    pub fn validate_unique(&self, doc: &Document, row_key: Option<&Key>) -> Result<()> {
        if !self.info.unique {
            return Ok(());
        }
        let values = self.tuple(doc);
        let key = self.tuple_key(&values);
        if let Some(existing) = self.tx.session_get(&key)? {
            let same_row = row_key.is_some_and(|k| k.as_slice() == existing.as_slice());
            if !same_row {
                return Err(Error::UniqueViolation {
                    index: self.info.name.clone(),
                    tuple: Self::describe(&values),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, Options};
    use crate::schema::{FieldConstraint, Owner, TableInfo};
    use oolong_common::doc;
    use oolong_common::types::ValueType;

    fn setup() -> (Database, Arc<IndexInfo>) {
        let db = Database::open(":memory:", Options::default()).unwrap();
        let tx = db.begin(true).unwrap();
        let mut info = TableInfo::new("t");
        info.add_field_constraint(FieldConstraint::new(0, "a", ValueType::Integer))
            .unwrap();
        tx.catalog_writer().create_table(info).unwrap();
        let ix = tx
            .catalog_writer()
            .create_index(IndexInfo {
                name: "ix".into(),
                table_name: "t".into(),
                paths: vec!["a".into()],
                unique: true,
                store_namespace: 0,
                owner: Owner {
                    table: "t".into(),
                    paths: vec!["a".into()],
                },
            })
            .unwrap();
        tx.commit().unwrap();
        (db, ix)
    }

    #[test]
    fn test_unique_index_conflict() {
        let (db, ix_info) = setup();
        let tx = db.begin(true).unwrap();
        let ix = Index::new(&tx, ix_info);

        let row1 = Key::from_bytes(b"row1");
        let row2 = Key::from_bytes(b"row2");
        let d = doc! { "a" => Value::Int(7) };

        ix.validate_unique(&d, Some(&row1)).unwrap();
        ix.set(&d, &row1).unwrap();

        // Same tuple, same row: fine (replace path).
        ix.validate_unique(&d, Some(&row1)).unwrap();

        // Same tuple, different row: violation.
        let err = ix.validate_unique(&d, Some(&row2)).unwrap_err();
        assert!(matches!(err, Error::UniqueViolation { ref index, .. } if index == "ix"));

        ix.delete(&d, &row1).unwrap();
        ix.validate_unique(&d, Some(&row2)).unwrap();
    }
}
