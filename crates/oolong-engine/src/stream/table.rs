//! Table operators.

use std::sync::Arc;

use oolong_common::Result;
use oolong_kv::KvIter;

use crate::row;
use crate::schema::TableInfo;
use crate::stream::{ExecContext, Operator, Record, Source};
use crate::table::Table;

/// Source iterating a table's namespace in primary-key order.
///
/// The schema is bound at construction so rows decode with the
/// pre-mutation layout regardless of later catalog changes in the same
/// transaction.
pub struct ScanSource {
    info: Arc<TableInfo>,
    iter: Option<KvIter>,
}

impl ScanSource {
    /// Creates a scan decoding with `info`.
    #[must_use]
    pub fn new(info: Arc<TableInfo>) -> Self {
        Self { info, iter: None }
    }
}

impl Source for ScanSource {
    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<Record>> {
        if self.iter.is_none() {
            let range = oolong_kv::KeyRange::for_namespace(self.info.store_namespace);
            self.iter = Some(ctx.tx.session_iterate(&range)?);
        }
        let Some(iter) = self.iter.as_mut() else {
            return Ok(None);
        };
        let Some((key, value)) = iter.next() else {
            return Ok(None);
        };
        let doc = row::decode_document(&self.info.field_constraints, &value)?;
        Ok(Some(Record::with_key(doc, key)))
    }
}

/// Applies the table's current constraints to each record.
pub struct ValidateOp {
    table_name: String,
}

impl ValidateOp {
    /// Validates against the transaction's current schema of `table`.
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }
}

impl Operator for ValidateOp {
    fn apply(&mut self, ctx: &ExecContext<'_>, mut record: Record) -> Result<Option<Record>> {
        let info = ctx.tx.catalog().get_table(&self.table_name)?;
        let validated = row::validate_document(&info.field_constraints, &record.doc)?;
        row::check_constraints(&info, &validated)?;
        record.doc = validated;
        Ok(Some(record))
    }
}

/// Writes each record under a freshly computed primary key.
pub struct InsertOp {
    table_name: String,
}

impl InsertOp {
    /// Inserts into `table` with its current schema.
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }
}

impl Operator for InsertOp {
    fn apply(&mut self, ctx: &ExecContext<'_>, mut record: Record) -> Result<Option<Record>> {
        let info = ctx.tx.catalog().get_table(&self.table_name)?;
        let table = Table::new(ctx.tx, info);
        let (key, doc) = table.insert(&record.doc)?;
        record.doc = doc;
        record.key = Some(key);
        Ok(Some(record))
    }
}

/// Overwrites each record under its existing primary key.
pub struct ReplaceOp {
    table_name: String,
}

impl ReplaceOp {
    /// Replaces rows of `table` in place.
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }
}

impl Operator for ReplaceOp {
    fn apply(&mut self, ctx: &ExecContext<'_>, mut record: Record) -> Result<Option<Record>> {
        let info = ctx.tx.catalog().get_table(&self.table_name)?;
        let table = Table::new(ctx.tx, info);
        let key = record.require_key()?.clone();
        record.doc = table.replace(&key, &record.doc)?;
        Ok(Some(record))
    }
}

/// Deletes each record's row.
pub struct DeleteOp {
    table_name: String,
}

impl DeleteOp {
    /// Deletes from `table`.
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }
}

impl Operator for DeleteOp {
    fn apply(&mut self, ctx: &ExecContext<'_>, record: Record) -> Result<Option<Record>> {
        let info = ctx.tx.catalog().get_table(&self.table_name)?;
        let table = Table::new(ctx.tx, info);
        table.delete(record.require_key()?)?;
        Ok(Some(record))
    }
}
