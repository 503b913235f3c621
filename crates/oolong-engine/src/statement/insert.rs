//! INSERT statement.

use oolong_common::types::Document;
use oolong_common::Result;

use crate::statement::{require_writable, Output, Statement};
use crate::stream::{index, table, ExecContext, Stream, ValuesSource};

/// `INSERT INTO … VALUES …`
#[derive(Debug, Clone)]
pub struct InsertStmt {
    /// Target table.
    pub table_name: String,
    /// The documents to insert.
    pub docs: Vec<Document>,
}

impl Statement for InsertStmt {
    fn is_read_only(&self) -> bool {
        false
    }

    fn run(&self, ctx: &ExecContext<'_>) -> Result<Output> {
        require_writable(ctx)?;
        // Surface a missing table before building the pipeline.
        ctx.tx.catalog().get_table(&self.table_name)?;

        let mut stream = Stream::new(ValuesSource::new(self.docs.clone()))
            .pipe(table::ValidateOp::new(&self.table_name))
            .pipe(table::InsertOp::new(&self.table_name));

        for name in ctx.tx.catalog().list_indexes(&self.table_name) {
            let info = ctx.tx.catalog().get_index_info(&name)?;
            if info.unique {
                stream = stream.pipe(index::ValidateOp::new(&name));
            }
            stream = stream.pipe(index::InsertOp::new(&name));
        }

        let rows = stream.drain(ctx)?;
        Ok(Output::rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, Options};
    use crate::schema::{FieldConstraint, IndexInfo, Owner, TableConstraint, TableInfo};
    use crate::statement::{CreateIndexStmt, CreateTableStmt};
    use crate::stream::ExecContext;
    use oolong_common::types::{Value, ValueType};
    use oolong_common::{doc, ErrorKind};

    fn setup() -> Database {
        let db = Database::open(":memory:", Options::default()).unwrap();
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let mut info = TableInfo::new("t");
        info.add_field_constraint(FieldConstraint::new(0, "a", ValueType::Integer))
            .unwrap();
        info.add_field_constraint(FieldConstraint::new(1, "b", ValueType::Text))
            .unwrap();
        info.add_table_constraints(vec![TableConstraint::PrimaryKey {
            name: "t_pk".into(),
            paths: vec!["a".into()],
        }])
        .unwrap();
        CreateTableStmt {
            info,
            if_not_exists: false,
        }
        .run(&ctx)
        .unwrap();

        CreateIndexStmt {
            info: IndexInfo {
                name: "t_b_idx".into(),
                table_name: "t".into(),
                paths: vec!["b".into()],
                unique: true,
                store_namespace: 0,
                owner: Owner {
                    table: "t".into(),
                    paths: vec!["b".into()],
                },
            },
            if_not_exists: false,
        }
        .run(&ctx)
        .unwrap();

        tx.commit().unwrap();
        db
    }

    #[test]
    fn test_insert_rows() {
        let db = setup();
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let out = InsertStmt {
            table_name: "t".into(),
            docs: vec![
                doc! { "a" => Value::Int(1), "b" => Value::Text("x".into()) },
                doc! { "a" => Value::Int(2), "b" => Value::Text("y".into()) },
            ],
        }
        .run(&ctx)
        .unwrap();
        assert_eq!(out.rows_affected, 2);
        tx.commit().unwrap();
    }

    #[test]
    fn test_insert_unique_violation() {
        let db = setup();
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let err = InsertStmt {
            table_name: "t".into(),
            docs: vec![
                doc! { "a" => Value::Int(1), "b" => Value::Text("same".into()) },
                doc! { "a" => Value::Int(2), "b" => Value::Text("same".into()) },
            ],
        }
        .run(&ctx)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UniqueViolation);
    }

    #[test]
    fn test_insert_missing_table() {
        let db = setup();
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let err = InsertStmt {
            table_name: "absent".into(),
            docs: vec![doc! { "a" => Value::Int(1) }],
        }
        .run(&ctx)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_insert_requires_writable_tx() {
        let db = setup();
        let tx = db.begin(false).unwrap();
        let ctx = ExecContext::new(&tx);

        let err = InsertStmt {
            table_name: "t".into(),
            docs: vec![doc! { "a" => Value::Int(1) }],
        }
        .run(&ctx)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TxConflict);
    }
}
