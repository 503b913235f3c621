//! The schema registry.
//!
//! A [`Catalog`] is an immutable snapshot of every table, index, and
//! sequence. Reads go through the transaction's catalog view; mutations
//! go through a [`CatalogWriter`], which stages a clone of the view,
//! writes the persistent mirror through the transaction's session, and
//! registers a publish hook that swaps the database catalog pointer at
//! commit. Rollback simply discards the staged clone.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use oolong_common::namespace::{
    Namespace, CATALOG_STORE_NAMESPACE, CATALOG_TABLE_NAME, MIN_TRANSIENT_NAMESPACE,
    MIN_USER_NAMESPACE, SEQUENCE_STORE_NAMESPACE, SEQUENCE_TABLE_NAME,
};
use oolong_common::types::{Value, ValueType};
use oolong_common::{Error, Result};
use oolong_kv::{KeyRange, Session};

use crate::schema::{
    FieldConstraint, IndexInfo, SequenceInfo, TableConstraint, TableConstraints, TableInfo,
};
use crate::sequence::Sequence;
use crate::transaction::{stage_publish_hook, Transaction, TxState};

/// An immutable snapshot of all schemas visible to a transaction.
#[derive(Debug, Clone)]
pub struct Catalog {
    tables: BTreeMap<String, Arc<TableInfo>>,
    indexes: BTreeMap<String, Arc<IndexInfo>>,
    sequences: BTreeMap<String, Sequence>,
    next_namespace: Namespace,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
            indexes: BTreeMap::new(),
            sequences: BTreeMap::new(),
            next_namespace: MIN_USER_NAMESPACE,
        }
    }

    /// Returns the schema of `name`.
    pub fn get_table(&self, name: &str) -> Result<Arc<TableInfo>> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TableNotFound {
                name: name.to_string(),
            })
    }

    /// Lists every table name.
    #[must_use]
    pub fn list_tables(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Lists the indexes of `table`, lexicographically by index name.
    #[must_use]
    pub fn list_indexes(&self, table: &str) -> Vec<String> {
        self.indexes
            .values()
            .filter(|info| info.table_name == table)
            .map(|info| info.name.clone())
            .collect()
    }

    /// Returns the schema of index `name`.
    pub fn get_index_info(&self, name: &str) -> Result<Arc<IndexInfo>> {
        self.indexes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::IndexNotFound {
                name: name.to_string(),
            })
    }

    /// Lists every sequence name.
    #[must_use]
    pub fn list_sequences(&self) -> Vec<String> {
        self.sequences.keys().cloned().collect()
    }

    /// Returns the sequence `name`.
    pub fn get_sequence(&self, name: &str) -> Result<Sequence> {
        self.sequences
            .get(name)
            .cloned()
            .ok_or_else(|| Error::SequenceNotFound {
                name: name.to_string(),
            })
    }

    fn ensure_name_free(&self, name: &str) -> Result<()> {
        if self.tables.contains_key(name) || self.indexes.contains_key(name) {
            return Err(Error::AlreadyExists {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn alloc_namespace(&mut self) -> Namespace {
        let ns = self.next_namespace;
        self.next_namespace += 1;
        ns
    }
}

/// A persisted catalog entry, one JSON row per named object.
#[derive(Debug, Serialize, Deserialize)]
enum CatalogEntry {
    Table(TableInfo),
    Index(IndexInfo),
    Sequence(SequenceInfo),
}

fn mirror_key(name: &str) -> Vec<u8> {
    let mut key = oolong_encoding::namespace_prefix(CATALOG_STORE_NAMESPACE);
    oolong_encoding::encode_value(&mut key, &Value::Text(name.to_string()));
    key
}

fn write_mirror(session: &mut Session, name: &str, entry: &CatalogEntry) -> Result<()> {
    let value = serde_json::to_vec(entry)
        .map_err(|e| Error::corruption(format!("cannot serialize catalog entry: {e}")))?;
    session.put(mirror_key(name), value)
}

fn delete_mirror(session: &mut Session, name: &str) -> Result<()> {
    session.delete(mirror_key(name))
}

/// Mutating access to the catalog, scoped to a writable transaction.
pub struct CatalogWriter<'a> {
    tx: &'a Transaction,
}

impl<'a> CatalogWriter<'a> {
    pub(crate) fn new(tx: &'a Transaction) -> Self {
        Self { tx }
    }

    /// Stages a catalog clone, applies `f` to it together with the
    /// session, and registers the publish hook.
    fn mutate<R>(&self, f: impl FnOnce(&mut Catalog, &mut Session) -> Result<R>) -> Result<R> {
        self.tx.with_state(|state: &mut TxState| {
            let mut staged = (*state.catalog).clone();
            let out = f(&mut staged, &mut state.session)?;
            let staged = Arc::new(staged);
            state.catalog = staged.clone();
            stage_publish_hook(state, staged);
            Ok(out)
        })
    }

    /// Ensures the internal tables exist. Idempotent.
    pub fn init(&self) -> Result<()> {
        self.mutate(|catalog, session| {
            if catalog.tables.contains_key(CATALOG_TABLE_NAME) {
                return Ok(());
            }
            debug!("initializing catalog internal tables");
            for info in [internal_catalog_table(), internal_sequence_table()] {
                write_mirror(session, &info.name, &CatalogEntry::Table(info.clone()))?;
                catalog.tables.insert(info.name.clone(), Arc::new(info));
            }
            Ok(())
        })
    }

    /// Registers a new table, allocating its store namespace when unset.
    pub fn create_table(&self, mut info: TableInfo) -> Result<Arc<TableInfo>> {
        self.mutate(|catalog, session| {
            info.validate()?;
            catalog.ensure_name_free(&info.name)?;
            if info.store_namespace == 0 {
                info.store_namespace = catalog.alloc_namespace();
            }
            write_mirror(session, &info.name, &CatalogEntry::Table(info.clone()))?;
            let info = Arc::new(info);
            catalog.tables.insert(info.name.clone(), info.clone());
            Ok(info)
        })
    }

    /// Renames a table, carrying its indexes along.
    pub fn rename_table(&self, old: &str, new: &str) -> Result<()> {
        if new.is_empty() {
            return Err(Error::invalid("empty table name"));
        }
        if old == new {
            return Err(Error::AlreadyExists {
                name: new.to_string(),
            });
        }
        self.mutate(|catalog, session| {
            let info = catalog
                .tables
                .remove(old)
                .ok_or_else(|| Error::TableNotFound {
                    name: old.to_string(),
                })?;
            if let Err(e) = catalog.ensure_name_free(new) {
                catalog.tables.insert(old.to_string(), info);
                return Err(e);
            }

            let mut renamed = (*info).clone();
            renamed.name = new.to_string();
            delete_mirror(session, old)?;
            write_mirror(session, new, &CatalogEntry::Table(renamed.clone()))?;
            catalog.tables.insert(new.to_string(), Arc::new(renamed));

            let owned: Vec<String> = catalog
                .indexes
                .values()
                .filter(|ix| ix.table_name == old)
                .map(|ix| ix.name.clone())
                .collect();
            for name in owned {
                let mut ix = (*catalog.indexes[&name]).clone();
                ix.table_name = new.to_string();
                if ix.owner.table == old {
                    ix.owner.table = new.to_string();
                }
                write_mirror(session, &name, &CatalogEntry::Index(ix.clone()))?;
                catalog.indexes.insert(name, Arc::new(ix));
            }
            Ok(())
        })
    }

    /// Appends a field and table constraints to an existing table.
    ///
    /// The caller is responsible for rebuilding the table's rows when the
    /// change affects their physical layout.
    pub fn add_field_constraint(
        &self,
        table: &str,
        fc: FieldConstraint,
        tcs: TableConstraints,
    ) -> Result<Arc<TableInfo>> {
        self.mutate(|catalog, session| {
            let info = catalog.get_table(table)?;
            let mut updated = (*info).clone();
            updated.add_field_constraint(fc)?;
            updated.add_table_constraints(tcs)?;
            write_mirror(session, table, &CatalogEntry::Table(updated.clone()))?;
            let updated = Arc::new(updated);
            catalog.tables.insert(table.to_string(), updated.clone());
            Ok(updated)
        })
    }

    /// Registers a new index. An empty name is auto-generated from the
    /// table and paths.
    pub fn create_index(&self, mut info: IndexInfo) -> Result<Arc<IndexInfo>> {
        self.mutate(|catalog, session| {
            let table = catalog.get_table(&info.table_name)?;
            for path in &info.paths {
                if !table.field_constraints.resolves(path) {
                    return Err(Error::FieldNotFound { name: path.clone() });
                }
            }
            if info.name.is_empty() {
                info.name = generate_index_name(catalog, &info.table_name, &info.paths);
            }
            catalog.ensure_name_free(&info.name)?;
            if info.store_namespace == 0 {
                info.store_namespace = catalog.alloc_namespace();
            }
            write_mirror(session, &info.name, &CatalogEntry::Index(info.clone()))?;
            let info = Arc::new(info);
            catalog.indexes.insert(info.name.clone(), info.clone());
            Ok(info)
        })
    }

    /// Unregisters an index, returning its schema so the caller can purge
    /// its namespace.
    pub fn drop_index(&self, name: &str) -> Result<Arc<IndexInfo>> {
        self.mutate(|catalog, session| {
            let info = catalog
                .indexes
                .remove(name)
                .ok_or_else(|| Error::IndexNotFound {
                    name: name.to_string(),
                })?;
            delete_mirror(session, name)?;
            Ok(info)
        })
    }

    /// Unregisters a table and its owned indexes, returning their schemas
    /// so the caller can purge the namespaces.
    pub fn drop_table(&self, name: &str) -> Result<(Arc<TableInfo>, Vec<Arc<IndexInfo>>)> {
        self.mutate(|catalog, session| {
            let info = catalog
                .tables
                .remove(name)
                .ok_or_else(|| Error::TableNotFound {
                    name: name.to_string(),
                })?;
            delete_mirror(session, name)?;

            let owned: Vec<String> = catalog
                .indexes
                .values()
                .filter(|ix| ix.table_name == name)
                .map(|ix| ix.name.clone())
                .collect();
            let mut dropped = Vec::with_capacity(owned.len());
            for ix_name in owned {
                if let Some(ix) = catalog.indexes.remove(&ix_name) {
                    delete_mirror(session, &ix_name)?;
                    dropped.push(ix);
                }
            }
            Ok((info, dropped))
        })
    }

    /// Registers a new sequence.
    pub fn create_sequence(&self, info: SequenceInfo) -> Result<Sequence> {
        self.mutate(|catalog, session| {
            if catalog.sequences.contains_key(&info.name) {
                return Err(Error::AlreadyExists {
                    name: info.name.clone(),
                });
            }
            if info.name.is_empty() {
                return Err(Error::invalid("empty sequence name"));
            }
            write_mirror(session, &info.name, &CatalogEntry::Sequence(info.clone()))?;
            let seq = Sequence::new(info);
            catalog.sequences.insert(seq.info().name.clone(), seq.clone());
            Ok(seq)
        })
    }

    /// Unregisters a sequence, deleting its persistent watermark.
    pub fn drop_sequence(&self, name: &str) -> Result<()> {
        self.mutate(|catalog, session| {
            let seq = catalog
                .sequences
                .remove(name)
                .ok_or_else(|| Error::SequenceNotFound {
                    name: name.to_string(),
                })?;
            delete_mirror(session, name)?;
            session.delete(crate::sequence::watermark_key(seq.info().name.as_str()))?;
            Ok(())
        })
    }
}

fn generate_index_name(catalog: &Catalog, table: &str, paths: &[String]) -> String {
    let base = format!("{}_{}_idx", table, paths.join("_"));
    if catalog.ensure_name_free(&base).is_ok() {
        return base;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{base}{n}");
        if catalog.ensure_name_free(&candidate).is_ok() {
            return candidate;
        }
        n += 1;
    }
}

fn internal_catalog_table() -> TableInfo {
    let mut info = TableInfo::new(CATALOG_TABLE_NAME);
    info.store_namespace = CATALOG_STORE_NAMESPACE;
    info.field_constraints.fields = vec![
        FieldConstraint::new(0, "name", ValueType::Text).not_null(),
        FieldConstraint::new(1, "kind", ValueType::Text),
        FieldConstraint::new(2, "data", ValueType::Text),
    ];
    info.table_constraints = vec![TableConstraint::PrimaryKey {
        name: format!("{CATALOG_TABLE_NAME}_pk"),
        paths: vec!["name".to_string()],
    }];
    info
}

fn internal_sequence_table() -> TableInfo {
    let mut info = TableInfo::new(SEQUENCE_TABLE_NAME);
    info.store_namespace = SEQUENCE_STORE_NAMESPACE;
    info.field_constraints.fields = vec![
        FieldConstraint::new(0, "name", ValueType::Text).not_null(),
        FieldConstraint::new(1, "seq", ValueType::Integer),
    ];
    info.table_constraints = vec![TableConstraint::PrimaryKey {
        name: format!("{SEQUENCE_TABLE_NAME}_pk"),
        paths: vec!["name".to_string()],
    }];
    info
}

/// Default catalog loader: parses the persisted mirror into a fresh
/// catalog and installs it in the transaction, or initializes a new
/// catalog when the store is empty.
pub fn load_catalog(tx: &Transaction) -> Result<()> {
    let entries: Vec<_> = tx
        .session_iterate(&KeyRange::for_namespace(CATALOG_STORE_NAMESPACE))?
        .collect();
    if entries.is_empty() {
        return tx.catalog_writer().init();
    }

    let mut catalog = Catalog::new();
    let mut max_ns = MIN_USER_NAMESPACE - 1;
    for (_, value) in entries {
        let entry: CatalogEntry = serde_json::from_slice(&value)
            .map_err(|e| Error::corruption(format!("cannot parse catalog entry: {e}")))?;
        match entry {
            CatalogEntry::Table(info) => {
                if info.store_namespace < MIN_TRANSIENT_NAMESPACE {
                    max_ns = max_ns.max(info.store_namespace);
                }
                catalog.tables.insert(info.name.clone(), Arc::new(info));
            }
            CatalogEntry::Index(info) => {
                if info.store_namespace < MIN_TRANSIENT_NAMESPACE {
                    max_ns = max_ns.max(info.store_namespace);
                }
                catalog.indexes.insert(info.name.clone(), Arc::new(info));
            }
            CatalogEntry::Sequence(info) => {
                let seq = Sequence::new(info);
                catalog.sequences.insert(seq.info().name.clone(), seq);
            }
        }
    }
    catalog.next_namespace = max_ns + 1;
    debug!(
        tables = catalog.tables.len(),
        indexes = catalog.indexes.len(),
        sequences = catalog.sequences.len(),
        "loaded catalog"
    );
    tx.install_catalog(Arc::new(catalog));
    Ok(())
}
