//! Index maintenance operators.

use oolong_common::Result;

use crate::index::Index;
use crate::stream::{ExecContext, Operator, Record};

/// Adds each record to the index, mapping its tuple to its row key.
pub struct InsertOp {
    index_name: String,
}

impl InsertOp {
    /// Inserts into index `name`.
    #[must_use]
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
        }
    }
}

impl Operator for InsertOp {
    fn apply(&mut self, ctx: &ExecContext<'_>, record: Record) -> Result<Option<Record>> {
        let info = ctx.tx.catalog().get_index_info(&self.index_name)?;
        let index = Index::new(ctx.tx, info);
        index.set(&record.doc, record.require_key()?)?;
        Ok(Some(record))
    }
}

/// Removes each record's entry from the index.
pub struct DeleteOp {
    index_name: String,
}

impl DeleteOp {
    /// Deletes from index `name`.
    #[must_use]
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
        }
    }
}

impl Operator for DeleteOp {
    fn apply(&mut self, ctx: &ExecContext<'_>, record: Record) -> Result<Option<Record>> {
        let info = ctx.tx.catalog().get_index_info(&self.index_name)?;
        let index = Index::new(ctx.tx, info);
        index.delete(&record.doc, record.require_key()?)?;
        Ok(Some(record))
    }
}

/// For unique indexes, rejects records whose tuple is already present
/// under a different row.
pub struct ValidateOp {
    index_name: String,
}

impl ValidateOp {
    /// Validates uniqueness against index `name`.
    #[must_use]
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
        }
    }
}

impl Operator for ValidateOp {
    fn apply(&mut self, ctx: &ExecContext<'_>, record: Record) -> Result<Option<Record>> {
        let info = ctx.tx.catalog().get_index_info(&self.index_name)?;
        let index = Index::new(ctx.tx, info);
        index.validate_unique(&record.doc, record.key.as_ref())?;
        Ok(Some(record))
    }
}
