//! Database lifecycle and transaction vending.
//!
//! The database owns the store, the current catalog snapshot, and the
//! mutual-exclusion invariants: a single writer at a time, and at most
//! one attached transaction, which fences out every other `begin` until
//! it terminates.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, info};

use oolong_common::namespace::{MAX_TRANSIENT_NAMESPACE, MIN_TRANSIENT_NAMESPACE};
use oolong_common::{Error, Result};
use oolong_kv::{KeyRange, Session, Store};

use crate::catalog::{load_catalog, Catalog};
use crate::transaction::{Transaction, TransactionInner, TxOptions};

/// Directory, under the database path, holding the key-value engine.
const STORE_DIR: &str = "pebble";

/// A catalog loader parses persisted catalog state into the bootstrap
/// transaction's catalog view.
pub type CatalogLoader = Box<dyn Fn(&Transaction) -> Result<()> + Send + Sync>;

/// Options passed to [`Database::open`].
#[derive(Default)]
pub struct Options {
    /// Custom catalog loader; defaults to the built-in mirror parser.
    pub catalog_loader: Option<CatalogLoader>,
    /// Buffered-write threshold for batch sessions, in bytes.
    pub max_batch_size: Option<usize>,
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("catalog_loader", &self.catalog_loader.is_some())
            .field("max_batch_size", &self.max_batch_size)
            .finish()
    }
}

/// Blocking gate limiting the database to one writable transaction.
///
/// A plain flag and condvar rather than a held mutex guard, so acquire
/// and release can happen on different call paths (begin vs.
/// commit/rollback) and remain symmetric on every failure path.
pub(crate) struct WriteGate {
    locked: Mutex<bool>,
    cond: Condvar,
}

impl WriteGate {
    fn new() -> Self {
        Self {
            locked: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn acquire(&self) {
        let mut locked = self.locked.lock();
        while *locked {
            self.cond.wait(&mut locked);
        }
        *locked = true;
    }

    pub(crate) fn release(&self) {
        let mut locked = self.locked.lock();
        *locked = false;
        self.cond.notify_one();
    }
}

pub(crate) struct DatabaseInner {
    pub store: Store,
    catalog: RwLock<Arc<Catalog>>,
    /// The attached transaction, if the user is running one explicitly.
    /// Any `begin` fails until it is rolled back or committed.
    attached: Mutex<Option<Arc<TransactionInner>>>,
    /// Fences transaction creation out during close.
    txmu: RwLock<()>,
    pub write_gate: WriteGate,
    /// Runtime transaction ids; reset on every restart.
    transaction_ids: AtomicU64,
    closed: AtomicBool,
    /// Keeps the ephemeral directory of a `":memory:"` database alive.
    _temp_dir: Option<tempfile::TempDir>,
}

impl DatabaseInner {
    pub(crate) fn catalog(&self) -> Arc<Catalog> {
        self.catalog.read().clone()
    }

    pub(crate) fn set_catalog(&self, catalog: Arc<Catalog>) {
        *self.catalog.write() = catalog;
    }

    pub(crate) fn release_attached(&self, id: u64) {
        let mut attached = self.attached.lock();
        if attached.as_ref().is_some_and(|tx| tx.id == id) {
            *attached = None;
        }
    }

    fn new_transaction(self: &Arc<Self>, read_only: bool, holds_write_gate: bool) -> Transaction {
        let session = if read_only {
            Session::Snapshot(self.store.snapshot_session())
        } else {
            Session::Batch(self.store.batch_session())
        };
        let id = self.transaction_ids.fetch_add(1, Ordering::SeqCst) + 1;
        Transaction::new(self.clone(), id, session, self.catalog(), holds_write_gate)
    }
}

/// An embedded database over an ordered key-value store.
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Opens (or creates) a database at `path`.
    ///
    /// `":memory:"` selects an ephemeral directory that lives as long as
    /// the database. On open, the rollback segment is reset, transient
    /// namespaces are purged, and a bootstrap transaction loads or
    /// initializes the catalog.
    pub fn open(path: impl AsRef<Path>, opts: Options) -> Result<Database> {
        let path = path.as_ref();
        let (store_path, temp_dir) = if path == Path::new(":memory:") {
            let dir = tempfile::tempdir()?;
            (dir.path().join(STORE_DIR), Some(dir))
        } else {
            if path.exists() && !path.is_dir() {
                return Err(Error::invalid("path must be a directory"));
            }
            std::fs::create_dir_all(path)?;
            (path.join(STORE_DIR), None)
        };

        let mut store_opts = oolong_kv::Options::default();
        if let Some(max) = opts.max_batch_size {
            store_opts.max_batch_size = max;
        }
        let store = Store::open(&store_path, store_opts)?;

        // Undo any half-applied batch left by a crash, then wipe the
        // transient namespaces.
        store.reset_rollback_segment()?;
        store.delete_range(&KeyRange::for_namespaces(
            MIN_TRANSIENT_NAMESPACE,
            MAX_TRANSIENT_NAMESPACE,
        ))?;

        let db = Database {
            inner: Arc::new(DatabaseInner {
                store,
                catalog: RwLock::new(Arc::new(Catalog::new())),
                attached: Mutex::new(None),
                txmu: RwLock::new(()),
                write_gate: WriteGate::new(),
                transaction_ids: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                _temp_dir: temp_dir,
            }),
        };

        let tx = db.begin(true)?;
        match &opts.catalog_loader {
            Some(loader) => loader(&tx)?,
            None => load_catalog(&tx)?,
        }
        tx.commit()?;

        info!(path = %path.display(), "database open");
        Ok(db)
    }

    /// Starts a transaction with default options.
    pub fn begin(&self, writable: bool) -> Result<Transaction> {
        self.begin_tx(TxOptions {
            read_only: !writable,
            attached: false,
        })
    }

    /// Starts a transaction with the given options.
    ///
    /// A writable transaction blocks until the single-writer gate is
    /// free. While an attached transaction is live, every `begin` fails
    /// with a transaction conflict; the conflict is checked again after
    /// the gate is acquired, and the gate is released on that late
    /// failure.
    pub fn begin_tx(&self, opts: TxOptions) -> Result<Transaction> {
        let inner = &self.inner;
        let _fence = inner.txmu.read();

        if inner.closed.load(Ordering::SeqCst) {
            return Err(Error::invalid("database is closed"));
        }
        if inner.attached.lock().is_some() {
            return Err(Error::tx_conflict(
                "cannot open a transaction within a transaction",
            ));
        }

        let writable = !opts.read_only;
        if writable {
            inner.write_gate.acquire();
        }

        let mut attached = inner.attached.lock();
        if attached.is_some() {
            if writable {
                inner.write_gate.release();
            }
            return Err(Error::tx_conflict(
                "cannot open a transaction within a transaction",
            ));
        }

        let tx = inner.new_transaction(opts.read_only, writable);
        if opts.attached {
            *attached = Some(tx.inner.clone());
            tx.register_attached_hooks();
        }
        debug!(id = tx.id(), writable, attached = opts.attached, "transaction begin");
        Ok(tx)
    }

    /// The current catalog snapshot.
    #[must_use]
    pub fn catalog(&self) -> Arc<Catalog> {
        self.inner.catalog()
    }

    /// Replaces the current catalog snapshot.
    pub fn set_catalog(&self, catalog: Arc<Catalog>) {
        self.inner.set_catalog(catalog);
    }

    /// Closes the database. Idempotent.
    ///
    /// Rolls back a live attached transaction, releases every sequence in
    /// a final writable transaction, and flushes the store.
    pub fn close(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Take the pointer before rolling back: the release hook re-locks
        // the attached mutex.
        let attached = inner.attached.lock().take();
        if let Some(attached) = attached {
            let _ = attached.rollback_inner();
        }

        let _fence = inner.txmu.write();
        inner.write_gate.acquire();
        let released = self.release_sequences();
        inner.write_gate.release();
        released?;

        inner.store.persist()?;
        info!("database closed");
        Ok(())
    }

    /// Releases all sequences so their on-disk watermarks cover every
    /// vended value. Runs under the already-held writer gate.
    fn release_sequences(&self) -> Result<()> {
        let tx = self.inner.new_transaction(false, false);
        let catalog = tx.catalog();
        for name in catalog.list_sequences() {
            let seq = catalog.get_sequence(&name)?;
            seq.release(&tx)?;
        }
        tx.commit()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
