//! DELETE statement.

use oolong_common::Result;

use crate::expr::Expr;
use crate::statement::{require_writable, Output, Statement};
use crate::stream::table::ScanSource;
use crate::stream::{index, table, ExecContext, FilterOp, Stream};

/// `DELETE FROM … [WHERE …]`
#[derive(Debug, Clone)]
pub struct DeleteStmt {
    /// Target table.
    pub table_name: String,
    /// Optional predicate; rows failing it are kept.
    pub filter: Option<Expr>,
}

impl Statement for DeleteStmt {
    fn is_read_only(&self) -> bool {
        false
    }

    fn run(&self, ctx: &ExecContext<'_>) -> Result<Output> {
        require_writable(ctx)?;
        let info = ctx.tx.catalog().get_table(&self.table_name)?;

        let mut stream = Stream::new(ScanSource::new(info));
        if let Some(filter) = &self.filter {
            stream = stream.pipe(FilterOp::new(filter.clone()));
        }
        for name in ctx.tx.catalog().list_indexes(&self.table_name) {
            stream = stream.pipe(index::DeleteOp::new(&name));
        }
        stream = stream.pipe(table::DeleteOp::new(&self.table_name));

        let rows = stream.drain(ctx)?;
        Ok(Output::rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, Options};
    use crate::expr::CompareOp;
    use crate::schema::{FieldConstraint, TableInfo};
    use crate::statement::{CreateTableStmt, InsertStmt};
    use oolong_common::types::{Value, ValueType};
    use oolong_common::doc;
    use oolong_kv::KeyRange;

    fn setup() -> Database {
        let db = Database::open(":memory:", Options::default()).unwrap();
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let mut info = TableInfo::new("t");
        info.add_field_constraint(FieldConstraint::new(0, "a", ValueType::Integer))
            .unwrap();
        CreateTableStmt {
            info,
            if_not_exists: false,
        }
        .run(&ctx)
        .unwrap();

        InsertStmt {
            table_name: "t".into(),
            docs: (1..=4).map(|a| doc! { "a" => Value::Int(a) }).collect(),
        }
        .run(&ctx)
        .unwrap();

        tx.commit().unwrap();
        db
    }

    fn count_rows(db: &Database) -> usize {
        let tx = db.begin(false).unwrap();
        let ns = tx.catalog().get_table("t").unwrap().store_namespace;
        tx.session_iterate(&KeyRange::for_namespace(ns))
            .unwrap()
            .count()
    }

    #[test]
    fn test_delete_all() {
        let db = setup();
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let out = DeleteStmt {
            table_name: "t".into(),
            filter: None,
        }
        .run(&ctx)
        .unwrap();
        assert_eq!(out.rows_affected, 4);
        tx.commit().unwrap();

        assert_eq!(count_rows(&db), 0);
    }

    #[test]
    fn test_delete_with_filter() {
        let db = setup();
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let out = DeleteStmt {
            table_name: "t".into(),
            filter: Some(Expr::compare(
                CompareOp::Gt,
                Expr::field("a"),
                Expr::literal(Value::Int(2)),
            )),
        }
        .run(&ctx)
        .unwrap();
        assert_eq!(out.rows_affected, 2);
        tx.commit().unwrap();

        assert_eq!(count_rows(&db), 2);
    }
}
