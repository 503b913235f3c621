//! ALTER TABLE statements.

use tracing::debug;

use oolong_common::{Error, Result};

use crate::schema::{FieldConstraint, IndexInfo, Owner, TableConstraint, TableConstraints};
use crate::statement::{require_writable, Output, Statement};
use crate::stream::table::ScanSource;
use crate::stream::{index, table, ExecContext, Stream};

/// `ALTER TABLE … RENAME TO …`
#[derive(Debug, Clone)]
pub struct AlterTableRenameStmt {
    /// The table to rename.
    pub table_name: String,
    /// Its new name.
    pub new_table_name: String,
}

impl Statement for AlterTableRenameStmt {
    fn is_read_only(&self) -> bool {
        false
    }

    fn run(&self, ctx: &ExecContext<'_>) -> Result<Output> {
        require_writable(ctx)?;
        if self.table_name.is_empty() {
            return Err(Error::invalid("missing table name"));
        }
        if self.new_table_name.is_empty() {
            return Err(Error::invalid("missing new table name"));
        }
        if self.table_name == self.new_table_name {
            return Err(Error::AlreadyExists {
                name: self.new_table_name.clone(),
            });
        }

        ctx.tx
            .catalog_writer()
            .rename_table(&self.table_name, &self.new_table_name)?;
        Ok(Output::default())
    }
}

/// `ALTER TABLE … ADD FIELD …`
///
/// Rebuilds the table: rows are re-validated against the mutated schema
/// and rewritten, and indexes are maintained along the way.
#[derive(Debug, Clone)]
pub struct AlterTableAddFieldStmt {
    /// The table to alter.
    pub table_name: String,
    /// The field to append.
    pub field_constraint: FieldConstraint,
    /// Table constraints introduced together with the field.
    pub table_constraints: TableConstraints,
}

impl Statement for AlterTableAddFieldStmt {
    fn is_read_only(&self) -> bool {
        false
    }

    fn run(&self, ctx: &ExecContext<'_>) -> Result<Output> {
        require_writable(ctx)?;

        // Bind the pre-mutation schema to the scan so existing rows
        // decode with the layout they were written under.
        let old_info = ctx.tx.catalog().get_table(&self.table_name)?;
        let scan = ScanSource::new(old_info.clone());

        // Snapshot the index set before the mutation.
        let old_indexes = ctx.tx.catalog().list_indexes(&self.table_name);

        let mut fc = self.field_constraint.clone();
        fc.position = old_info.field_constraints.len();
        ctx.tx.catalog_writer().add_field_constraint(
            &self.table_name,
            fc,
            self.table_constraints.clone(),
        )?;

        // Every unique constraint gets a unique index owned by the table.
        let mut pk_added = false;
        let mut new_indexes = Vec::new();
        for tc in &self.table_constraints {
            match tc {
                TableConstraint::Unique { paths, .. } => {
                    let index = ctx.tx.catalog_writer().create_index(IndexInfo {
                        name: String::new(),
                        table_name: self.table_name.clone(),
                        paths: paths.clone(),
                        unique: true,
                        store_namespace: 0,
                        owner: Owner {
                            table: self.table_name.clone(),
                            paths: paths.clone(),
                        },
                    })?;
                    new_indexes.push(index);
                }
                TableConstraint::PrimaryKey { .. } => pk_added = true,
                TableConstraint::Check { .. } => {}
            }
        }

        let mut stream = Stream::new(scan);
        if pk_added {
            // The storage key changes, so old rows and their index
            // entries are deleted and everything is re-inserted.
            for name in &old_indexes {
                stream = stream.pipe(index::DeleteOp::new(name));
            }
            stream = stream.pipe(table::DeleteOp::new(&self.table_name));
            stream = stream.pipe(table::ValidateOp::new(&self.table_name));
            stream = stream.pipe(table::InsertOp::new(&self.table_name));

            // The post-mutation index set, including the ones just
            // created.
            for name in ctx.tx.catalog().list_indexes(&self.table_name) {
                let info = ctx.tx.catalog().get_index_info(&name)?;
                if info.unique {
                    stream = stream.pipe(index::ValidateOp::new(&name));
                }
                stream = stream.pipe(index::InsertOp::new(&name));
            }
        } else {
            // The storage key is unchanged: rewrite rows in place and
            // maintain only the freshly created indexes.
            stream = stream.pipe(table::ValidateOp::new(&self.table_name));
            stream = stream.pipe(table::ReplaceOp::new(&self.table_name));
            for info in &new_indexes {
                if info.unique {
                    stream = stream.pipe(index::ValidateOp::new(&info.name));
                }
                stream = stream.pipe(index::InsertOp::new(&info.name));
            }
        }

        // The operator order above is load-bearing; the stream is never
        // reordered or optimized.
        let rows = stream.drain(ctx)?;
        debug!(
            table = %self.table_name,
            rows,
            pk_added,
            "table rebuilt"
        );
        Ok(Output::rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, Options};
    use crate::expr::Expr;
    use crate::schema::{FieldConstraint, TableInfo};
    use crate::statement::{CreateIndexStmt, CreateTableStmt, InsertStmt, Statement};
    use crate::transaction::Transaction;
    use oolong_common::types::{Key, Value, ValueType};
    use oolong_common::{doc, ErrorKind};
    use oolong_kv::KeyRange;

    fn open_db() -> Database {
        Database::open(":memory:", Options::default()).unwrap()
    }

    /// Creates `t(a INT)` with a secondary index `ix` on `a` and inserts
    /// the given rows.
    fn seed_table(db: &Database, rows: &[i64]) {
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

        CreateIndexStmt {
            info: IndexInfo {
                name: "ix".into(),
                table_name: "t".into(),
                paths: vec!["a".into()],
                unique: false,
                store_namespace: 0,
                owner: Owner {
                    table: "t".into(),
                    paths: vec!["a".into()],
                },
            },
            if_not_exists: false,
        }
        .run(&ctx)
        .unwrap();

        InsertStmt {
            table_name: "t".into(),
            docs: rows.iter().map(|&a| doc! { "a" => Value::Int(a) }).collect(),
        }
        .run(&ctx)
        .unwrap();

        tx.commit().unwrap();
    }

    fn table_entries(tx: &Transaction, table: &str) -> Vec<(Key, Vec<u8>)> {
        let ns = tx.catalog().get_table(table).unwrap().store_namespace;
        tx.session_iterate(&KeyRange::for_namespace(ns))
            .unwrap()
            .collect()
    }

    fn index_entries(tx: &Transaction, index: &str) -> Vec<(Key, Vec<u8>)> {
        let ns = tx.catalog().get_index_info(index).unwrap().store_namespace;
        tx.session_iterate(&KeyRange::for_namespace(ns))
            .unwrap()
            .collect()
    }

    #[test]
    fn test_rename_missing_names() {
        let db = open_db();
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let err = AlterTableRenameStmt {
            table_name: String::new(),
            new_table_name: "u".into(),
        }
        .run(&ctx)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);

        let err = AlterTableRenameStmt {
            table_name: "t".into(),
            new_table_name: String::new(),
        }
        .run(&ctx)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_rename_to_same_name() {
        let db = open_db();
        seed_table(&db, &[1]);

        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);
        let err = AlterTableRenameStmt {
            table_name: "t".into(),
            new_table_name: "t".into(),
        }
        .run(&ctx)
        .unwrap_err();
        assert!(matches!(err, oolong_common::Error::AlreadyExists { ref name } if name == "t"));
        tx.rollback().unwrap();

        // The catalog is unchanged.
        assert!(db.catalog().get_table("t").is_ok());
    }

    #[test]
    fn test_rename_carries_indexes() {
        let db = open_db();
        seed_table(&db, &[1]);

        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);
        AlterTableRenameStmt {
            table_name: "t".into(),
            new_table_name: "u".into(),
        }
        .run(&ctx)
        .unwrap();
        tx.commit().unwrap();

        let catalog = db.catalog();
        assert!(catalog.get_table("t").is_err());
        assert!(catalog.get_table("u").is_ok());
        assert_eq!(catalog.list_indexes("u"), vec!["ix".to_string()]);
        assert_eq!(catalog.get_index_info("ix").unwrap().owner.table, "u");
    }

    #[test]
    fn test_add_field_with_new_primary_key() {
        let db = open_db();
        seed_table(&db, &[10, 20]);

        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);
        let out = AlterTableAddFieldStmt {
            table_name: "t".into(),
            field_constraint: FieldConstraint::new(0, "b", ValueType::Integer)
                .with_default(Expr::field("a")),
            table_constraints: vec![TableConstraint::PrimaryKey {
                name: "t_pk".into(),
                paths: vec!["b".into()],
            }],
        }
        .run(&ctx)
        .unwrap();
        assert_eq!(out.rows_affected, 2);
        tx.commit().unwrap();

        let tx = db.begin(false).unwrap();

        // Every original row is present exactly once under its new
        // primary key; no rowid-keyed rows remain.
        let rows = table_entries(&tx, "t");
        assert_eq!(rows.len(), 2);
        let info = tx.catalog().get_table("t").unwrap();
        let prefix = oolong_encoding::namespace_prefix(info.store_namespace);
        for ((key, value), expected) in rows.iter().zip([10i64, 20]) {
            let (pk, _) = oolong_encoding::decode_value(&key[prefix.len()..]).unwrap();
            assert_eq!(pk, Value::Int(expected));
            let doc = crate::row::decode_document(&info.field_constraints, value).unwrap();
            assert_eq!(doc.get("b"), Some(&Value::Int(expected)));
        }

        // The index holds exactly one entry per row, pointing at the new
        // primary keys.
        let row_keys: Vec<&Key> = rows.iter().map(|(k, _)| k).collect();
        let entries = index_entries(&tx, "ix");
        assert_eq!(entries.len(), 2);
        let ix_ns = tx.catalog().get_index_info("ix").unwrap().store_namespace;
        let ix_prefix = oolong_encoding::namespace_prefix(ix_ns);
        for ((key, _), row_key) in entries.iter().zip(&row_keys) {
            let rest = &key[ix_prefix.len()..];
            let (tuple, read) = oolong_encoding::decode_value(rest).unwrap();
            assert!(matches!(tuple, Value::Int(_)));
            assert_eq!(&rest[read..], row_key.as_slice());
        }
    }

    #[test]
    fn test_add_field_duplicate_primary_key_fails() {
        let db = open_db();
        seed_table(&db, &[10, 20]);

        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);
        // A constant default collapses both rows onto one storage key.
        let err = AlterTableAddFieldStmt {
            table_name: "t".into(),
            field_constraint: FieldConstraint::new(0, "b", ValueType::Integer)
                .with_default(Expr::literal(Value::Int(0))),
            table_constraints: vec![TableConstraint::PrimaryKey {
                name: "t_pk".into(),
                paths: vec!["b".into()],
            }],
        }
        .run(&ctx)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        tx.rollback().unwrap();

        // The table retains both original rows under their rowids.
        let tx = db.begin(false).unwrap();
        assert_eq!(table_entries(&tx, "t").len(), 2);
        assert!(db.catalog().get_table("t").unwrap().primary_key().is_none());
    }

    #[test]
    fn test_add_field_unique_collision_rolls_back() {
        let db = open_db();
        seed_table(&db, &[1, 1]);

        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);
        let err = AlterTableAddFieldStmt {
            table_name: "t".into(),
            field_constraint: FieldConstraint::new(0, "b", ValueType::Integer)
                .with_default(Expr::literal(Value::Int(7))),
            table_constraints: vec![TableConstraint::Unique {
                name: "t_b_unique".into(),
                paths: vec!["b".into()],
            }],
        }
        .run(&ctx)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UniqueViolation);
        tx.rollback().unwrap();

        // Both original rows survive and no new index persists.
        let tx = db.begin(false).unwrap();
        let info = tx.catalog().get_table("t").unwrap();
        let rows = table_entries(&tx, "t");
        assert_eq!(rows.len(), 2);
        for (_, value) in &rows {
            let doc = crate::row::decode_document(&info.field_constraints, value).unwrap();
            assert_eq!(doc.get("a"), Some(&Value::Int(1)));
            assert_eq!(doc.get("b"), None);
        }
        assert_eq!(db.catalog().list_indexes("t"), vec!["ix".to_string()]);
    }

    #[test]
    fn test_add_field_in_place() {
        let db = open_db();
        seed_table(&db, &[1, 2]);

        let tx = db.begin(false).unwrap();
        let keys_before: Vec<Key> = table_entries(&tx, "t").into_iter().map(|(k, _)| k).collect();
        drop(tx);

        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);
        AlterTableAddFieldStmt {
            table_name: "t".into(),
            field_constraint: FieldConstraint::new(0, "c", ValueType::Double)
                .with_default(Expr::literal(Value::Int(10))),
            table_constraints: Vec::new(),
        }
        .run(&ctx)
        .unwrap();
        tx.commit().unwrap();

        // Same storage keys, rewritten values.
        let tx = db.begin(false).unwrap();
        let info = tx.catalog().get_table("t").unwrap();
        let rows = table_entries(&tx, "t");
        let keys_after: Vec<&Key> = rows.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys_after,
            keys_before.iter().collect::<Vec<&Key>>()
        );
        for (_, value) in &rows {
            let doc = crate::row::decode_document(&info.field_constraints, value).unwrap();
            assert_eq!(doc.get("c"), Some(&Value::Double(10.0)));
        }
    }
}
