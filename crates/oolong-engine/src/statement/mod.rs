//! Statement runners.
//!
//! Runners translate parsed statements into pipelines and catalog
//! mutations, then consume the pipeline inside the caller's transaction:
//! either the whole statement commits with the transaction, or the
//! rollback path restores the pre-statement state.

mod alter;
mod create;
mod delete;
mod drop;
mod insert;
mod update;

pub use alter::{AlterTableAddFieldStmt, AlterTableRenameStmt};
pub use create::{CreateIndexStmt, CreateSequenceStmt, CreateTableStmt};
pub use delete::DeleteStmt;
pub use drop::{DropIndexStmt, DropSequenceStmt, DropTableStmt};
pub use insert::InsertStmt;
pub use update::UpdateStmt;

use oolong_common::{Error, Result};

use crate::stream::ExecContext;

/// The result of running a statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Output {
    /// Number of records that reached the pipeline sink.
    pub rows_affected: u64,
}

impl Output {
    pub(crate) fn rows(rows_affected: u64) -> Self {
        Self { rows_affected }
    }
}

/// A runnable statement.
pub trait Statement {
    /// Returns true if the statement never mutates the database.
    fn is_read_only(&self) -> bool;

    /// Runs the statement inside the context's transaction.
    fn run(&self, ctx: &ExecContext<'_>) -> Result<Output>;
}

/// Guards mutating statements against read-only transactions.
pub(crate) fn require_writable(ctx: &ExecContext<'_>) -> Result<()> {
    if !ctx.tx.is_writable() {
        return Err(Error::tx_conflict(
            "cannot run a mutation in a read-only transaction",
        ));
    }
    Ok(())
}

/// Rejects names reserved for internal tables.
pub(crate) fn reject_internal(name: &str) -> Result<()> {
    if name.starts_with(oolong_common::namespace::INTERNAL_PREFIX) {
        return Err(Error::invalid(format!("'{name}' is a reserved name")));
    }
    Ok(())
}
