//! Transactions.
//!
//! A transaction binds a session, a catalog view, and commit/rollback
//! hook chains; writable transactions additionally hold the database's
//! single-writer gate. Exactly one of `commit` or `rollback` finishes a
//! transaction; dropping an unfinished transaction rolls it back.

use std::mem;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use oolong_common::types::Key;
use oolong_common::{Error, Result};
use oolong_kv::{KeyRange, KvIter, Session};

use crate::catalog::{Catalog, CatalogWriter};
use crate::database::DatabaseInner;

/// Options for [`crate::Database::begin_tx`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TxOptions {
    /// Open a read-only transaction backed by a snapshot session.
    pub read_only: bool,
    /// Attach the transaction to the database. While an attached
    /// transaction is live, every other `begin` fails.
    pub attached: bool,
}

/// Deferred work to run when a transaction finishes.
///
/// Hooks are explicit enum-tagged kinds rather than closures, and run in
/// FIFO registration order after the session outcome.
#[derive(Debug)]
pub(crate) enum Hook {
    /// Publish a staged catalog snapshot to the database.
    PublishCatalog(Arc<Catalog>),
    /// Clear the database's attached-transaction pointer.
    ReleaseAttachedTx,
}

pub(crate) struct TxState {
    pub session: Session,
    /// The catalog view; a staged clone once a writer mutated it.
    pub catalog: Arc<Catalog>,
    pub on_commit: Vec<Hook>,
    pub on_rollback: Vec<Hook>,
    pub done: bool,
}

pub(crate) struct TransactionInner {
    pub id: u64,
    pub writable: bool,
    pub tx_start: Instant,
    /// Whether finishing this transaction releases the writer gate.
    pub holds_write_gate: bool,
    pub db: Arc<DatabaseInner>,
    pub state: Mutex<TxState>,
}

impl TransactionInner {
    pub(crate) fn commit_inner(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.done {
            return Err(Error::invalid("transaction already finished"));
        }
        // A failed session commit leaves the transaction unfinished; the
        // rollback path still runs and releases the writer gate.
        state.session.commit()?;
        state.done = true;
        let hooks = mem::take(&mut state.on_commit);
        drop(state);

        debug!(id = self.id, "transaction committed");
        for hook in hooks {
            self.run_hook(hook);
        }
        if self.holds_write_gate {
            self.db.write_gate.release();
        }
        Ok(())
    }

    pub(crate) fn rollback_inner(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.done {
            return Ok(());
        }
        state.done = true;
        let result = state.session.close();
        let hooks = mem::take(&mut state.on_rollback);
        drop(state);

        debug!(id = self.id, "transaction rolled back");
        for hook in hooks {
            self.run_hook(hook);
        }
        if self.holds_write_gate {
            self.db.write_gate.release();
        }
        result
    }

    fn run_hook(&self, hook: Hook) {
        match hook {
            Hook::PublishCatalog(catalog) => self.db.set_catalog(catalog),
            Hook::ReleaseAttachedTx => self.db.release_attached(self.id),
        }
    }

    fn with_live_state<R>(&self, f: impl FnOnce(&mut TxState) -> Result<R>) -> Result<R> {
        let mut state = self.state.lock();
        if state.done {
            return Err(Error::invalid("transaction already finished"));
        }
        f(&mut state)
    }
}

/// A scoped unit of work over the database.
pub struct Transaction {
    pub(crate) inner: Arc<TransactionInner>,
}

impl Transaction {
    pub(crate) fn new(
        db: Arc<DatabaseInner>,
        id: u64,
        session: Session,
        catalog: Arc<Catalog>,
        holds_write_gate: bool,
    ) -> Self {
        let writable = session.is_writable();
        Self {
            inner: Arc::new(TransactionInner {
                id,
                writable,
                tx_start: Instant::now(),
                holds_write_gate,
                db,
                state: Mutex::new(TxState {
                    session,
                    catalog,
                    on_commit: Vec::new(),
                    on_rollback: Vec::new(),
                    done: false,
                }),
            }),
        }
    }

    /// The runtime transaction id. Monotonic, not persisted.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns true if the transaction accepts writes.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.inner.writable
    }

    /// The instant the transaction started.
    #[must_use]
    pub fn tx_start(&self) -> Instant {
        self.inner.tx_start
    }

    /// The catalog view of this transaction.
    ///
    /// Reflects staged mutations made through [`Transaction::catalog_writer`]
    /// within this transaction, ahead of their publication at commit.
    #[must_use]
    pub fn catalog(&self) -> Arc<Catalog> {
        self.inner.state.lock().catalog.clone()
    }

    /// Returns the catalog writer.
    ///
    /// # Panics
    ///
    /// Panics when called on a read-only transaction.
    #[must_use]
    pub fn catalog_writer(&self) -> CatalogWriter<'_> {
        assert!(
            self.inner.writable,
            "catalog writer requires a writable transaction"
        );
        CatalogWriter::new(self)
    }

    /// Commits the session, then runs the commit hooks in order.
    ///
    /// On a failed session commit the transaction is rolled back (commit
    /// hooks do not run) and the commit error is returned.
    pub fn commit(self) -> Result<()> {
        let result = self.inner.commit_inner();
        if result.is_err() {
            if let Err(e) = self.inner.rollback_inner() {
                warn!(id = self.inner.id, error = %e, "rollback after failed commit also failed");
            }
        }
        result
    }

    /// Discards the session, then runs the rollback hooks in order.
    ///
    /// Safe to call after a failed commit; a no-op on a finished
    /// transaction.
    pub fn rollback(self) -> Result<()> {
        self.inner.rollback_inner()
    }

    /// Installs a freshly loaded catalog as this transaction's view and
    /// stages it for publication at commit.
    pub fn install_catalog(&self, catalog: Arc<Catalog>) {
        let mut state = self.inner.state.lock();
        state.catalog = catalog.clone();
        stage_publish_hook(&mut state, catalog);
    }

    pub(crate) fn register_attached_hooks(&self) {
        let mut state = self.inner.state.lock();
        state.on_commit.push(Hook::ReleaseAttachedTx);
        state.on_rollback.push(Hook::ReleaseAttachedTx);
    }

    // =========================================================================
    // Session access for engine components
    // =========================================================================

    pub(crate) fn session_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.with_live_state(|state| state.session.get(key))
    }

    pub(crate) fn session_put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.inner
            .with_live_state(|state| state.session.put(key, value))
    }

    pub(crate) fn session_delete(&self, key: Vec<u8>) -> Result<()> {
        self.inner
            .with_live_state(|state| state.session.delete(key))
    }

    pub(crate) fn session_delete_range(&self, range: &KeyRange) -> Result<u64> {
        self.inner
            .with_live_state(|state| state.session.delete_range(range))
    }

    pub(crate) fn session_iterate(&self, range: &KeyRange) -> Result<KvIter> {
        self.inner
            .with_live_state(|state| state.session.iterate(range))
    }

    pub(crate) fn session_last_in_range(&self, range: &KeyRange) -> Result<Option<(Key, Vec<u8>)>> {
        self.inner
            .with_live_state(|state| state.session.last_in_range(range))
    }

    /// Runs `f` over the live state; used by the catalog writer to stage
    /// catalog clones and mirror writes atomically with respect to the
    /// state lock.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut TxState) -> Result<R>) -> Result<R> {
        self.inner.with_live_state(f)
    }
}

/// Stages `catalog` as the pending publication, replacing any previously
/// staged snapshot so the commit hook always publishes the latest clone.
pub(crate) fn stage_publish_hook(state: &mut TxState, catalog: Arc<Catalog>) {
    match state
        .on_commit
        .iter_mut()
        .find(|h| matches!(h, Hook::PublishCatalog(_)))
    {
        Some(hook) => *hook = Hook::PublishCatalog(catalog),
        None => state.on_commit.push(Hook::PublishCatalog(catalog)),
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Err(e) = self.inner.rollback_inner() {
            warn!(id = self.inner.id, error = %e, "implicit rollback failed");
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("writable", &self.inner.writable)
            .finish_non_exhaustive()
    }
}
