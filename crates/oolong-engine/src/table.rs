//! Row storage for one table, scoped to a transaction.

use std::sync::Arc;

use oolong_common::types::{Document, Key, Value};
use oolong_common::{Error, Result};
use oolong_kv::KeyRange;

use crate::expr::resolve_path;
use crate::row;
use crate::schema::TableInfo;
use crate::transaction::Transaction;

/// Row-level operations against one table.
///
/// The schema is captured at construction; callers that need the
/// pre-mutation schema (table rebuilds) bind it explicitly.
pub(crate) struct Table<'a> {
    tx: &'a Transaction,
    info: Arc<TableInfo>,
}

impl<'a> Table<'a> {
    pub fn new(tx: &'a Transaction, info: Arc<TableInfo>) -> Self {
        Self { tx, info }
    }

    fn namespace_range(&self) -> KeyRange {
        KeyRange::for_namespace(self.info.store_namespace)
    }

    fn full_key(&self, pk: &[u8]) -> Vec<u8> {
        let mut key = oolong_encoding::namespace_prefix(self.info.store_namespace);
        key.extend_from_slice(pk);
        key
    }

    /// Computes the storage key of a conforming document: the declared
    /// primary key, or the next monotonic rowid for keyless tables.
    pub fn generate_key(&self, doc: &Document) -> Result<Vec<u8>> {
        if let Some(pk) = row::encode_primary_key(&self.info, doc)? {
            return Ok(self.full_key(&pk));
        }
        let prefix_len = oolong_encoding::namespace_prefix(self.info.store_namespace).len();
        let next = match self.tx.session_last_in_range(&self.namespace_range())? {
            Some((key, _)) => match oolong_encoding::decode_value(&key[prefix_len..])? {
                (Value::Int(rowid), _) => rowid + 1,
                _ => {
                    return Err(Error::corruption(format!(
                        "table '{}' has a non-integer rowid",
                        self.info.name
                    )))
                }
            },
            None => 1,
        };
        Ok(self.full_key(&oolong_encoding::encoded_value(&Value::Int(next))))
    }

    /// Validates and writes a document under a freshly computed key.
    pub fn insert(&self, doc: &Document) -> Result<(Key, Document)> {
        let validated = row::validate_document(&self.info.field_constraints, doc)?;
        row::check_constraints(&self.info, &validated)?;

        let key = self.generate_key(&validated)?;
        if self.tx.session_get(&key)?.is_some() {
            return Err(Error::AlreadyExists {
                name: self.describe_key(&validated),
            });
        }
        let value = row::encode_document(&self.info.field_constraints, &validated)?;
        self.tx.session_put(key.clone(), value)?;
        Ok((Key::from_vec(key), validated))
    }

    /// Validates and writes a document under its existing key.
    pub fn replace(&self, key: &Key, doc: &Document) -> Result<Document> {
        let validated = row::validate_document(&self.info.field_constraints, doc)?;
        row::check_constraints(&self.info, &validated)?;
        let value = row::encode_document(&self.info.field_constraints, &validated)?;
        self.tx.session_put(key.to_vec(), value)?;
        Ok(validated)
    }

    /// Deletes the row stored under `key`.
    pub fn delete(&self, key: &Key) -> Result<()> {
        self.tx.session_delete(key.to_vec())
    }

    /// Reads and decodes the row stored under `key`.
    pub fn get(&self, key: &Key) -> Result<Option<Document>> {
        let Some(value) = self.tx.session_get(key)? else {
            return Ok(None);
        };
        Ok(Some(row::decode_document(
            &self.info.field_constraints,
            &value,
        )?))
    }

    fn describe_key(&self, doc: &Document) -> String {
        match self.info.primary_key() {
            Some(paths) => {
                let values: Vec<String> = paths
                    .iter()
                    .map(|p| {
                        resolve_path(doc, p)
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "NULL".to_string())
                    })
                    .collect();
                format!("{}({})", self.info.name, values.join(", "))
            }
            None => self.info.name.clone(),
        }
    }
}
