//! UPDATE statement.

use oolong_common::{Error, Result};

use crate::expr::Expr;
use crate::statement::{require_writable, Output, Statement};
use crate::stream::table::ScanSource;
use crate::stream::{index, table, ExecContext, FilterOp, SetOp, Stream};

/// `UPDATE … SET … [WHERE …]`
///
/// Rows are rewritten in place under their existing primary key, so SET
/// clauses may not touch a primary-key field. Index entries keyed off
/// the old values are removed before the SET clauses apply and
/// re-inserted afterwards.
#[derive(Debug, Clone)]
pub struct UpdateStmt {
    /// Target table.
    pub table_name: String,
    /// `SET path = expr` clauses, applied in order.
    pub set: Vec<(String, Expr)>,
    /// Optional predicate; rows failing it are left untouched.
    pub filter: Option<Expr>,
}

impl Statement for UpdateStmt {
    fn is_read_only(&self) -> bool {
        false
    }

    fn run(&self, ctx: &ExecContext<'_>) -> Result<Output> {
        require_writable(ctx)?;
        let info = ctx.tx.catalog().get_table(&self.table_name)?;

        // Replacing in place requires the storage key to stay put.
        if let Some(pk) = info.primary_key() {
            for (path, _) in &self.set {
                if pk.contains(path) {
                    return Err(Error::invalid(format!(
                        "cannot update primary key field '{path}'"
                    )));
                }
            }
        }

        let indexes = ctx.tx.catalog().list_indexes(&self.table_name);

        let mut stream = Stream::new(ScanSource::new(info));
        if let Some(filter) = &self.filter {
            stream = stream.pipe(FilterOp::new(filter.clone()));
        }
        // Old index entries key off the pre-update tuples.
        for name in &indexes {
            stream = stream.pipe(index::DeleteOp::new(name));
        }
        for (path, expr) in &self.set {
            stream = stream.pipe(SetOp::new(path.clone(), expr.clone()));
        }
        stream = stream.pipe(table::ValidateOp::new(&self.table_name));
        stream = stream.pipe(table::ReplaceOp::new(&self.table_name));
        for name in &indexes {
            let ix = ctx.tx.catalog().get_index_info(name)?;
            if ix.unique {
                stream = stream.pipe(index::ValidateOp::new(name));
            }
            stream = stream.pipe(index::InsertOp::new(name));
        }

        let rows = stream.drain(ctx)?;
        Ok(Output::rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, Options};
    use crate::expr::CompareOp;
    use crate::schema::{FieldConstraint, IndexInfo, Owner, TableConstraint, TableInfo};
    use crate::statement::{CreateIndexStmt, CreateTableStmt, InsertStmt};
    use crate::transaction::Transaction;
    use oolong_common::doc;
    use oolong_common::types::{Document, Value, ValueType};
    use oolong_common::ErrorKind;
    use oolong_kv::KeyRange;

    fn b_index(unique: bool) -> IndexInfo {
        IndexInfo {
            name: "ix".into(),
            table_name: "t".into(),
            paths: vec!["b".into()],
            unique,
            store_namespace: 0,
            owner: Owner {
                table: "t".into(),
                paths: vec!["b".into()],
            },
        }
    }

    /// Creates `t(a INT PRIMARY KEY, b INT)` with an index `ix` on `b`
    /// and inserts `(a, a * 10)` rows.
    fn setup(unique: bool, rows: &[i64]) -> Database {
        let db = Database::open(":memory:", Options::default()).unwrap();
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let mut info = TableInfo::new("t");
        info.add_field_constraint(FieldConstraint::new(0, "a", ValueType::Integer))
            .unwrap();
        info.add_field_constraint(FieldConstraint::new(1, "b", ValueType::Integer))
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
            info: b_index(unique),
            if_not_exists: false,
        }
        .run(&ctx)
        .unwrap();

        InsertStmt {
            table_name: "t".into(),
            docs: rows
                .iter()
                .map(|&a| doc! { "a" => Value::Int(a), "b" => Value::Int(a * 10) })
                .collect(),
        }
        .run(&ctx)
        .unwrap();

        tx.commit().unwrap();
        db
    }

    fn rows_of(tx: &Transaction) -> Vec<Document> {
        let info = tx.catalog().get_table("t").unwrap();
        tx.session_iterate(&KeyRange::for_namespace(info.store_namespace))
            .unwrap()
            .map(|(_, value)| crate::row::decode_document(&info.field_constraints, &value).unwrap())
            .collect()
    }

    fn index_tuples(tx: &Transaction) -> Vec<Value> {
        let ns = tx.catalog().get_index_info("ix").unwrap().store_namespace;
        let prefix = oolong_encoding::namespace_prefix(ns);
        tx.session_iterate(&KeyRange::for_namespace(ns))
            .unwrap()
            .map(|(key, _)| oolong_encoding::decode_value(&key[prefix.len()..]).unwrap().0)
            .collect()
    }

    #[test]
    fn test_update_all() {
        let db = setup(false, &[1, 2, 3, 4]);
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let out = UpdateStmt {
            table_name: "t".into(),
            set: vec![("b".into(), Expr::literal(Value::Int(7)))],
            filter: None,
        }
        .run(&ctx)
        .unwrap();
        assert_eq!(out.rows_affected, 4);
        tx.commit().unwrap();

        let tx = db.begin(false).unwrap();
        let rows = rows_of(&tx);
        assert_eq!(rows.len(), 4);
        for row in &rows {
            assert_eq!(row.get("b"), Some(&Value::Int(7)));
        }

        // The index holds exactly one entry per row and no entries for
        // the old tuples.
        let tuples = index_tuples(&tx);
        assert_eq!(tuples.len(), 4);
        assert!(tuples.iter().all(|t| *t == Value::Int(7)));
    }

    #[test]
    fn test_update_with_filter() {
        let db = setup(false, &[1, 2, 3, 4]);
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let out = UpdateStmt {
            table_name: "t".into(),
            set: vec![("b".into(), Expr::field("a"))],
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

        let tx = db.begin(false).unwrap();
        let expected = [10i64, 20, 3, 4];
        for (row, want) in rows_of(&tx).iter().zip(expected) {
            assert_eq!(row.get("b"), Some(&Value::Int(want)));
        }
    }

    #[test]
    fn test_update_unique_violation_rolls_back() {
        let db = setup(true, &[1, 2]);
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let err = UpdateStmt {
            table_name: "t".into(),
            set: vec![("b".into(), Expr::literal(Value::Int(99)))],
            filter: None,
        }
        .run(&ctx)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UniqueViolation);
        tx.rollback().unwrap();

        let tx = db.begin(false).unwrap();
        let expected = [10i64, 20];
        for (row, want) in rows_of(&tx).iter().zip(expected) {
            assert_eq!(row.get("b"), Some(&Value::Int(want)));
        }
        let tuples = index_tuples(&tx);
        assert_eq!(tuples, vec![Value::Int(10), Value::Int(20)]);
    }

    #[test]
    fn test_update_primary_key_rejected() {
        let db = setup(false, &[1]);
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let err = UpdateStmt {
            table_name: "t".into(),
            set: vec![("a".into(), Expr::literal(Value::Int(5)))],
            filter: None,
        }
        .run(&ctx)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_update_missing_table() {
        let db = setup(false, &[1]);
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let err = UpdateStmt {
            table_name: "absent".into(),
            set: vec![("b".into(), Expr::literal(Value::Int(1)))],
            filter: None,
        }
        .run(&ctx)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
