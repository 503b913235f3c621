//! Snapshot and batch sessions.

use std::collections::BTreeMap;
use std::mem;

use tracing::debug;

use oolong_common::types::Key;
use oolong_common::{Error, Result};

use crate::rollback::{self, UndoRecord};
use crate::store::{from_fjall, KeyRange, Store};

/// A session over the store: either a read-only snapshot or a buffered
/// write batch.
#[derive(Debug)]
pub enum Session {
    /// Consistent read-only view.
    Snapshot(SnapshotSession),
    /// Buffered read-write view.
    Batch(BatchSession),
}

impl Session {
    /// Returns true if the session accepts writes.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        matches!(self, Session::Batch(_))
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self {
            Session::Snapshot(s) => s.get(key),
            Session::Batch(s) => s.get(key),
        }
    }

    /// Iterates `range` in ascending key order.
    pub fn iterate(&self, range: &KeyRange) -> Result<KvIter> {
        match self {
            Session::Snapshot(s) => s.iterate(range),
            Session::Batch(s) => s.iterate(range),
        }
    }

    /// Iterates `range` in descending key order.
    pub fn iterate_rev(&self, range: &KeyRange) -> Result<KvIter> {
        match self {
            Session::Snapshot(s) => s.iterate_rev(range),
            Session::Batch(s) => s.iterate_rev(range),
        }
    }

    /// Returns the greatest entry in `range`, if any.
    pub fn last_in_range(&self, range: &KeyRange) -> Result<Option<(Key, Vec<u8>)>> {
        Ok(self.iterate_rev(range)?.next())
    }

    /// Buffers a write of `value` under `key`.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.batch_mut()?.put(key, value)
    }

    /// Buffers a deletion of `key`.
    pub fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        self.batch_mut()?.delete(key)
    }

    /// Buffers the deletion of every key in `range`.
    pub fn delete_range(&mut self, range: &KeyRange) -> Result<u64> {
        self.batch_mut()?.delete_range(range)
    }

    /// Commits the session. Read-only sessions commit trivially.
    pub fn commit(&mut self) -> Result<()> {
        match self {
            Session::Snapshot(_) => Ok(()),
            Session::Batch(s) => s.commit(),
        }
    }

    /// Discards the session, undoing any early-flushed writes.
    pub fn close(&mut self) -> Result<()> {
        match self {
            Session::Snapshot(_) => Ok(()),
            Session::Batch(s) => s.close(),
        }
    }

    fn batch_mut(&mut self) -> Result<&mut BatchSession> {
        match self {
            Session::Batch(s) => Ok(s),
            Session::Snapshot(_) => Err(Error::tx_conflict(
                "cannot write in a read-only session",
            )),
        }
    }
}

/// Read-only session pinned to a consistent instant.
pub struct SnapshotSession {
    snapshot: fjall::Snapshot,
}

impl SnapshotSession {
    pub(crate) fn new(snapshot: fjall::Snapshot) -> Self {
        Self { snapshot }
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .snapshot
            .get(key)
            .map_err(from_fjall)?
            .map(|slice| slice.to_vec()))
    }

    /// Iterates `range` in ascending key order.
    pub fn iterate(&self, range: &KeyRange) -> Result<KvIter> {
        self.collect(range, false)
    }

    /// Iterates `range` in descending key order.
    pub fn iterate_rev(&self, range: &KeyRange) -> Result<KvIter> {
        self.collect(range, true)
    }

    fn collect(&self, range: &KeyRange, reverse: bool) -> Result<KvIter> {
        let mut entries = Vec::new();
        for item in self.snapshot.range(range.bounds()) {
            let (key, value) = item.map_err(from_fjall)?;
            entries.push((Key::from_vec(key.to_vec()), value.to_vec()));
        }
        if reverse {
            entries.reverse();
        }
        Ok(KvIter::new(entries))
    }
}

impl std::fmt::Debug for SnapshotSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotSession").finish_non_exhaustive()
    }
}

/// Buffered write session with read-your-writes semantics.
///
/// Writes accumulate in an ordered pending map; reads overlay the pending
/// map over the store. When the buffer exceeds the configured threshold
/// the session flushes early, pairing every data write with an undo entry
/// in the rollback segment so `close` (or startup recovery) can restore
/// the pre-session state.
pub struct BatchSession {
    store: Store,
    /// Buffered writes; `None` marks a deletion.
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    pending_bytes: usize,
    undo_seq: u64,
    flushed: bool,
    closed: bool,
}

impl BatchSession {
    pub(crate) fn new(store: Store) -> Self {
        Self {
            store,
            pending: BTreeMap::new(),
            pending_bytes: 0,
            undo_seq: 0,
            flushed: false,
            closed: false,
        }
    }

    /// Returns the value visible to this session under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(buffered) = self.pending.get(key) {
            return Ok(buffered.clone());
        }
        Ok(self
            .store
            .data
            .get(key)
            .map_err(from_fjall)?
            .map(|slice| slice.to_vec()))
    }

    /// Iterates `range` in ascending key order, overlaying buffered
    /// writes over the store.
    pub fn iterate(&self, range: &KeyRange) -> Result<KvIter> {
        self.collect(range, false)
    }

    /// Iterates `range` in descending key order.
    pub fn iterate_rev(&self, range: &KeyRange) -> Result<KvIter> {
        self.collect(range, true)
    }

    /// Buffers a write of `value` under `key`.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        self.pending_bytes += key.len() + value.len();
        self.pending.insert(key, Some(value));
        self.maybe_flush()
    }

    /// Buffers a deletion of `key`.
    pub fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        self.pending_bytes += key.len();
        self.pending.insert(key, None);
        self.maybe_flush()
    }

    /// Buffers the deletion of every key currently visible in `range`.
    pub fn delete_range(&mut self, range: &KeyRange) -> Result<u64> {
        self.ensure_open()?;
        let keys: Vec<Key> = self.iterate(range)?.map(|(key, _)| key).collect();
        let count = keys.len() as u64;
        for key in keys {
            self.delete(key.to_vec())?;
        }
        Ok(count)
    }

    /// Atomically persists every buffered write.
    ///
    /// If the session flushed early, the final flush carries the commit
    /// marker and the rollback segment is erased afterwards; otherwise a
    /// single atomic batch suffices and the segment is never touched.
    /// A failed commit leaves the session unusable; the caller must
    /// treat the transaction as failed and roll back.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.flushed {
            self.flush(true)?;
            self.erase_segment()?;
        } else {
            let pending = mem::take(&mut self.pending);
            let mut batch = self.store.keyspace.batch();
            for (key, value) in pending {
                match value {
                    Some(v) => batch.insert(&self.store.data, key, v),
                    None => batch.remove(&self.store.data, key),
                }
            }
            batch.commit().map_err(from_fjall)?;
        }
        self.closed = true;
        Ok(())
    }

    /// Discards the session. Buffered writes are dropped; early-flushed
    /// writes are undone through the rollback segment.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pending.clear();
        self.pending_bytes = 0;
        if self.flushed {
            debug!("rolling back early-flushed batch session");
            // No commit marker was written, so recovery replays the undo
            // entries and erases the segment.
            self.store.reset_rollback_segment()?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::invalid("session is closed"));
        }
        Ok(())
    }

    fn maybe_flush(&mut self) -> Result<()> {
        if self.pending_bytes > self.store.opts.max_batch_size {
            self.flush(false)?;
        }
        Ok(())
    }

    /// Applies the pending buffer to the store, recording an undo entry
    /// per mutated key. The final flush additionally writes the commit
    /// marker inside the same atomic batch.
    fn flush(&mut self, finalize: bool) -> Result<()> {
        let ns = self.store.opts.rollback_segment_namespace;
        let pending = mem::take(&mut self.pending);
        self.pending_bytes = 0;

        let mut batch = self.store.keyspace.batch();
        for (key, value) in pending {
            let previous = self
                .store
                .data
                .get(&key)
                .map_err(from_fjall)?
                .map(|slice| slice.to_vec());
            let record = UndoRecord {
                key: key.clone(),
                previous,
            };
            batch.insert(
                &self.store.data,
                rollback::undo_key(ns, self.undo_seq),
                record.encode(),
            );
            self.undo_seq += 1;
            match value {
                Some(v) => batch.insert(&self.store.data, key, v),
                None => batch.remove(&self.store.data, key),
            }
        }
        if finalize {
            batch.insert(&self.store.data, rollback::marker_key(ns), Vec::new());
        }
        batch.commit().map_err(from_fjall)?;
        self.flushed = true;
        Ok(())
    }

    fn erase_segment(&self) -> Result<()> {
        let ns = self.store.opts.rollback_segment_namespace;
        self.store.delete_range(&KeyRange::for_namespace(ns))?;
        Ok(())
    }

    fn collect(&self, range: &KeyRange, reverse: bool) -> Result<KvIter> {
        // Overlay the buffered sub-range over the committed range,
        // preferring buffered entries and dropping tombstones.
        let mut merged: Vec<(Key, Vec<u8>)> = Vec::new();
        let mut pending = self
            .pending
            .range::<[u8], _>((
                std::ops::Bound::Included(range.start.as_slice()),
                std::ops::Bound::Excluded(range.end.as_slice()),
            ))
            .map(|(k, v)| (k.clone(), v.clone()))
            .peekable();

        let mut committed = self.store.data.range(range.bounds()).peekable();
        loop {
            let next_committed = match committed.peek() {
                Some(Ok((key, _))) => Some(key.to_vec()),
                Some(Err(_)) => {
                    // Surface the error.
                    let err = committed
                        .next()
                        .expect("peeked item exists")
                        .expect_err("peeked item is an error");
                    return Err(from_fjall(err));
                }
                None => None,
            };
            let next_pending = pending.peek().map(|(k, _)| k.clone());

            match (next_pending, next_committed) {
                (None, None) => break,
                (Some(_), None) => {
                    let (key, value) = pending.next().expect("peeked item exists");
                    if let Some(v) = value {
                        merged.push((Key::from_vec(key), v));
                    }
                }
                (None, Some(_)) => {
                    let (key, value) = committed
                        .next()
                        .expect("peeked item exists")
                        .map_err(from_fjall)?;
                    merged.push((Key::from_vec(key.to_vec()), value.to_vec()));
                }
                (Some(pk), Some(ck)) => {
                    if pk <= ck {
                        if pk == ck {
                            // Buffered entry shadows the committed one.
                            let _ = committed.next();
                        }
                        let (key, value) = pending.next().expect("peeked item exists");
                        if let Some(v) = value {
                            merged.push((Key::from_vec(key), v));
                        }
                    } else {
                        let (key, value) = committed
                            .next()
                            .expect("peeked item exists")
                            .map_err(from_fjall)?;
                        merged.push((Key::from_vec(key.to_vec()), value.to_vec()));
                    }
                }
            }
        }

        if reverse {
            merged.reverse();
        }
        Ok(KvIter::new(merged))
    }
}

impl std::fmt::Debug for BatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSession")
            .field("pending", &self.pending.len())
            .field("flushed", &self.flushed)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Iterator over a session's view of a key range.
#[derive(Debug)]
pub struct KvIter {
    inner: std::vec::IntoIter<(Key, Vec<u8>)>,
}

impl KvIter {
    fn new(entries: Vec<(Key, Vec<u8>)>) -> Self {
        Self {
            inner: entries.into_iter(),
        }
    }

    /// Returns the number of remaining entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if no entries remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}

impl Iterator for KvIter {
    type Item = (Key, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
