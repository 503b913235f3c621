//! DROP statements.

use oolong_common::{ErrorKind, Result};
use oolong_kv::KeyRange;

use crate::statement::{reject_internal, require_writable, Output, Statement};
use crate::stream::ExecContext;

/// `DROP TABLE …`
#[derive(Debug, Clone)]
pub struct DropTableStmt {
    /// The table to drop.
    pub table_name: String,
    /// Succeed quietly when the table does not exist.
    pub if_exists: bool,
}

impl Statement for DropTableStmt {
    fn is_read_only(&self) -> bool {
        false
    }

    fn run(&self, ctx: &ExecContext<'_>) -> Result<Output> {
        require_writable(ctx)?;
        reject_internal(&self.table_name)?;

        let dropped = ctx.tx.catalog_writer().drop_table(&self.table_name);
        let (table, indexes) = match dropped {
            Ok(parts) => parts,
            Err(e) if self.if_exists && e.kind() == ErrorKind::NotFound => {
                return Ok(Output::default());
            }
            Err(e) => return Err(e),
        };

        // Purge the rows and every owned index.
        ctx.tx
            .session_delete_range(&KeyRange::for_namespace(table.store_namespace))?;
        for index in indexes {
            ctx.tx
                .session_delete_range(&KeyRange::for_namespace(index.store_namespace))?;
        }
        Ok(Output::default())
    }
}

/// `DROP INDEX …`
#[derive(Debug, Clone)]
pub struct DropIndexStmt {
    /// The index to drop.
    pub index_name: String,
    /// Succeed quietly when the index does not exist.
    pub if_exists: bool,
}

impl Statement for DropIndexStmt {
    fn is_read_only(&self) -> bool {
        false
    }

    fn run(&self, ctx: &ExecContext<'_>) -> Result<Output> {
        require_writable(ctx)?;

        let dropped = ctx.tx.catalog_writer().drop_index(&self.index_name);
        let index = match dropped {
            Ok(info) => info,
            Err(e) if self.if_exists && e.kind() == ErrorKind::NotFound => {
                return Ok(Output::default());
            }
            Err(e) => return Err(e),
        };

        ctx.tx
            .session_delete_range(&KeyRange::for_namespace(index.store_namespace))?;
        Ok(Output::default())
    }
}

/// `DROP SEQUENCE …`
#[derive(Debug, Clone)]
pub struct DropSequenceStmt {
    /// The sequence to drop.
    pub sequence_name: String,
    /// Succeed quietly when the sequence does not exist.
    pub if_exists: bool,
}

impl Statement for DropSequenceStmt {
    fn is_read_only(&self) -> bool {
        false
    }

    fn run(&self, ctx: &ExecContext<'_>) -> Result<Output> {
        require_writable(ctx)?;

        match ctx.tx.catalog_writer().drop_sequence(&self.sequence_name) {
            Ok(()) => Ok(Output::default()),
            Err(e) if self.if_exists && e.kind() == ErrorKind::NotFound => Ok(Output::default()),
            Err(e) => Err(e),
        }
    }
}
