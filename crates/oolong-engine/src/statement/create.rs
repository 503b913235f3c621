//! CREATE statements.

use oolong_common::Result;

use crate::schema::{IndexInfo, Owner, SequenceInfo, TableConstraint, TableInfo};
use crate::statement::{reject_internal, require_writable, Output, Statement};
use crate::stream::table::ScanSource;
use crate::stream::{index, ExecContext, Stream};

/// `CREATE TABLE …`
#[derive(Debug, Clone)]
pub struct CreateTableStmt {
    /// The table schema, including its constraints.
    pub info: TableInfo,
    /// Succeed quietly when the table already exists.
    pub if_not_exists: bool,
}

impl Statement for CreateTableStmt {
    fn is_read_only(&self) -> bool {
        false
    }

    fn run(&self, ctx: &ExecContext<'_>) -> Result<Output> {
        require_writable(ctx)?;
        reject_internal(&self.info.name)?;
        if self.if_not_exists && ctx.tx.catalog().get_table(&self.info.name).is_ok() {
            return Ok(Output::default());
        }

        let info = ctx.tx.catalog_writer().create_table(self.info.clone())?;

        // Unique constraints are backed by owned unique indexes.
        for tc in &info.table_constraints {
            if let TableConstraint::Unique { paths, .. } = tc {
                ctx.tx.catalog_writer().create_index(IndexInfo {
                    name: String::new(),
                    table_name: info.name.clone(),
                    paths: paths.clone(),
                    unique: true,
                    store_namespace: 0,
                    owner: Owner {
                        table: info.name.clone(),
                        paths: paths.clone(),
                    },
                })?;
            }
        }
        Ok(Output::default())
    }
}

/// `CREATE INDEX … ON …`
#[derive(Debug, Clone)]
pub struct CreateIndexStmt {
    /// The index schema; an empty name is auto-generated.
    pub info: IndexInfo,
    /// Succeed quietly when the index already exists.
    pub if_not_exists: bool,
}

impl Statement for CreateIndexStmt {
    fn is_read_only(&self) -> bool {
        false
    }

    fn run(&self, ctx: &ExecContext<'_>) -> Result<Output> {
        require_writable(ctx)?;
        if self.if_not_exists
            && !self.info.name.is_empty()
            && ctx.tx.catalog().get_index_info(&self.info.name).is_ok()
        {
            return Ok(Output::default());
        }

        let table_info = ctx.tx.catalog().get_table(&self.info.table_name)?;
        let created = ctx.tx.catalog_writer().create_index(self.info.clone())?;

        // Backfill from the existing rows.
        let mut stream = Stream::new(ScanSource::new(table_info));
        if created.unique {
            stream = stream.pipe(index::ValidateOp::new(&created.name));
        }
        stream = stream.pipe(index::InsertOp::new(&created.name));

        let rows = stream.drain(ctx)?;
        Ok(Output::rows(rows))
    }
}

/// `CREATE SEQUENCE …`
#[derive(Debug, Clone)]
pub struct CreateSequenceStmt {
    /// The sequence description.
    pub info: SequenceInfo,
    /// Succeed quietly when the sequence already exists.
    pub if_not_exists: bool,
}

impl Statement for CreateSequenceStmt {
    fn is_read_only(&self) -> bool {
        false
    }

    fn run(&self, ctx: &ExecContext<'_>) -> Result<Output> {
        require_writable(ctx)?;
        reject_internal(&self.info.name)?;
        if self.if_not_exists && ctx.tx.catalog().get_sequence(&self.info.name).is_ok() {
            return Ok(Output::default());
        }
        ctx.tx.catalog_writer().create_sequence(self.info.clone())?;
        Ok(Output::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, Options};
    use crate::schema::{FieldConstraint, TableConstraint, TableInfo};
    use crate::statement::InsertStmt;
    use oolong_common::types::{Value, ValueType};
    use oolong_common::{doc, ErrorKind};

    fn open_db() -> Database {
        Database::open(":memory:", Options::default()).unwrap()
    }

    fn table_info(name: &str) -> TableInfo {
        let mut info = TableInfo::new(name);
        info.add_field_constraint(FieldConstraint::new(0, "a", ValueType::Integer))
            .unwrap();
        info
    }

    #[test]
    fn test_create_table_with_unique_constraint() {
        let db = open_db();
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let mut info = table_info("t");
        info.add_table_constraints(vec![TableConstraint::Unique {
            name: "t_a_unique".into(),
            paths: vec!["a".into()],
        }])
        .unwrap();
        CreateTableStmt {
            info,
            if_not_exists: false,
        }
        .run(&ctx)
        .unwrap();
        tx.commit().unwrap();

        // The unique constraint is backed by an owned unique index.
        let indexes = db.catalog().list_indexes("t");
        assert_eq!(indexes.len(), 1);
        let ix = db.catalog().get_index_info(&indexes[0]).unwrap();
        assert!(ix.unique);
        assert_eq!(ix.owner.table, "t");
    }

    #[test]
    fn test_create_table_if_not_exists() {
        let db = open_db();
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let stmt = CreateTableStmt {
            info: table_info("t"),
            if_not_exists: false,
        };
        stmt.run(&ctx).unwrap();
        let err = stmt.run(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        CreateTableStmt {
            info: table_info("t"),
            if_not_exists: true,
        }
        .run(&ctx)
        .unwrap();
    }

    #[test]
    fn test_create_table_rejects_internal_prefix() {
        let db = open_db();
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        let err = CreateTableStmt {
            info: table_info("__chai_mine"),
            if_not_exists: false,
        }
        .run(&ctx)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_create_index_backfills_existing_rows() {
        let db = open_db();
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        CreateTableStmt {
            info: table_info("t"),
            if_not_exists: false,
        }
        .run(&ctx)
        .unwrap();
        InsertStmt {
            table_name: "t".into(),
            docs: vec![doc! { "a" => Value::Int(1) }, doc! { "a" => Value::Int(2) }],
        }
        .run(&ctx)
        .unwrap();

        let out = CreateIndexStmt {
            info: IndexInfo {
                name: "ix".into(),
                table_name: "t".into(),
                paths: vec!["a".into()],
                unique: true,
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
        assert_eq!(out.rows_affected, 2);
        tx.commit().unwrap();
    }

    #[test]
    fn test_create_unique_index_detects_existing_duplicates() {
        let db = open_db();
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        CreateTableStmt {
            info: table_info("t"),
            if_not_exists: false,
        }
        .run(&ctx)
        .unwrap();
        InsertStmt {
            table_name: "t".into(),
            docs: vec![doc! { "a" => Value::Int(1) }, doc! { "a" => Value::Int(1) }],
        }
        .run(&ctx)
        .unwrap();

        let err = CreateIndexStmt {
            info: IndexInfo {
                name: "ix".into(),
                table_name: "t".into(),
                paths: vec!["a".into()],
                unique: true,
                store_namespace: 0,
                owner: Owner {
                    table: "t".into(),
                    paths: vec!["a".into()],
                },
            },
            if_not_exists: false,
        }
        .run(&ctx)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UniqueViolation);
    }

    #[test]
    fn test_create_sequence() {
        let db = open_db();
        let tx = db.begin(true).unwrap();
        let ctx = ExecContext::new(&tx);

        CreateSequenceStmt {
            info: SequenceInfo::new("ids"),
            if_not_exists: false,
        }
        .run(&ctx)
        .unwrap();
        tx.commit().unwrap();

        assert!(db.catalog().get_sequence("ids").is_ok());
    }
}
