//! Store lifecycle and maintenance operations.

use std::ops::Bound;
use std::path::Path;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use tracing::{debug, warn};

use oolong_common::namespace::{Namespace, ROLLBACK_SEGMENT_NAMESPACE};
use oolong_common::{Error, Result};

use crate::rollback::{self, UndoRecord};
use crate::session::{BatchSession, SnapshotSession};

/// Name of the single data partition inside the keyspace.
const DATA_PARTITION: &str = "data";

/// Options controlling store behavior.
#[derive(Debug, Clone)]
pub struct Options {
    /// Namespace holding the rollback segment's undo entries.
    pub rollback_segment_namespace: Namespace,
    /// Buffered-write threshold, in bytes, above which a batch session
    /// flushes early through the rollback segment.
    pub max_batch_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            rollback_segment_namespace: ROLLBACK_SEGMENT_NAMESPACE,
            max_batch_size: 16 << 20,
        }
    }
}

/// A half-open range `[start, end)` over encoded keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Inclusive lower bound.
    pub start: Vec<u8>,
    /// Exclusive upper bound.
    pub end: Vec<u8>,
}

impl KeyRange {
    /// Creates a range from explicit bounds.
    #[must_use]
    pub fn new(start: Vec<u8>, end: Vec<u8>) -> Self {
        Self { start, end }
    }

    /// Returns the range covering every key of namespace `ns`.
    #[must_use]
    pub fn for_namespace(ns: Namespace) -> Self {
        Self {
            start: oolong_encoding::namespace_prefix(ns),
            end: oolong_encoding::namespace_prefix(ns + 1),
        }
    }

    /// Returns the range covering namespaces `[min, max)`.
    #[must_use]
    pub fn for_namespaces(min: Namespace, max: Namespace) -> Self {
        Self {
            start: oolong_encoding::namespace_prefix(min),
            end: oolong_encoding::namespace_prefix(max),
        }
    }

    /// Returns true if `key` falls inside the range.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && key < self.end.as_slice()
    }

    pub(crate) fn bounds(&self) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
        (
            Bound::Included(self.start.clone()),
            Bound::Excluded(self.end.clone()),
        )
    }
}

/// Handle to the on-disk ordered key-value store.
///
/// Cloning is cheap; clones share the same keyspace.
#[derive(Clone)]
pub struct Store {
    pub(crate) keyspace: Keyspace,
    pub(crate) data: PartitionHandle,
    pub(crate) opts: Options,
}

impl Store {
    /// Opens (or creates) the store under `path`.
    pub fn open(path: impl AsRef<Path>, opts: Options) -> Result<Self> {
        let keyspace = Config::new(path.as_ref()).open().map_err(from_fjall)?;
        let data = keyspace
            .open_partition(DATA_PARTITION, PartitionCreateOptions::default())
            .map_err(from_fjall)?;
        debug!(path = %path.as_ref().display(), "opened key-value store");
        Ok(Self {
            keyspace,
            data,
            opts,
        })
    }

    /// Opens a read-only session against a consistent instant.
    #[must_use]
    pub fn snapshot_session(&self) -> SnapshotSession {
        SnapshotSession::new(self.data.snapshot())
    }

    /// Opens a buffered write session.
    ///
    /// Only one batch session may be live at a time; the caller enforces
    /// the single-writer rule.
    #[must_use]
    pub fn batch_session(&self) -> BatchSession {
        BatchSession::new(self.clone())
    }

    /// Restores consistency with the last successful commit.
    ///
    /// Scans the rollback segment: an empty segment means a clean
    /// shutdown; a commit marker means the last batch fully committed and
    /// only the segment itself needs erasing; anything else is an
    /// interrupted flush whose undo entries are replayed, newest first.
    pub fn reset_rollback_segment(&self) -> Result<()> {
        let ns = self.opts.rollback_segment_namespace;
        let range = KeyRange::for_namespace(ns);

        let mut committed = false;
        let mut undo = Vec::new();
        let mut segment_keys = Vec::new();
        for item in self.data.range(range.bounds()) {
            let (key, value) = item.map_err(from_fjall)?;
            segment_keys.push(key.to_vec());
            if rollback::is_marker(ns, &key) {
                committed = true;
            } else {
                undo.push(UndoRecord::decode(&value)?);
            }
        }

        if segment_keys.is_empty() {
            return Ok(());
        }

        let mut batch = self.keyspace.batch();
        if committed {
            debug!(entries = segment_keys.len(), "erasing committed rollback segment");
        } else {
            warn!(entries = undo.len(), "replaying rollback segment after interrupted batch");
            for rec in undo.iter().rev() {
                match &rec.previous {
                    Some(value) => batch.insert(&self.data, rec.key.clone(), value.clone()),
                    None => batch.remove(&self.data, rec.key.clone()),
                }
            }
        }
        for key in segment_keys {
            batch.remove(&self.data, key);
        }
        batch.commit().map_err(from_fjall)?;
        Ok(())
    }

    /// Deletes every key in `range` directly, bypassing sessions.
    ///
    /// Used for startup maintenance (transient namespace purge); returns
    /// the number of keys removed.
    pub fn delete_range(&self, range: &KeyRange) -> Result<u64> {
        let mut batch = self.keyspace.batch();
        let mut count = 0u64;
        for item in self.data.range(range.bounds()) {
            let (key, _) = item.map_err(from_fjall)?;
            batch.remove(&self.data, key);
            count += 1;
        }
        if count > 0 {
            batch.commit().map_err(from_fjall)?;
        }
        Ok(count)
    }

    /// Flushes the keyspace journal to durable storage.
    pub fn persist(&self) -> Result<()> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(from_fjall)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

/// Maps a storage engine error into the engine error space.
pub(crate) fn from_fjall<E: std::fmt::Display>(e: E) -> Error {
    Error::storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_range_contains() {
        let range = KeyRange::for_namespace(10);
        let mut inside = oolong_encoding::namespace_prefix(10);
        inside.push(0x01);
        let outside = oolong_encoding::namespace_prefix(11);
        assert!(range.contains(&inside));
        assert!(range.contains(&range.start.clone()));
        assert!(!range.contains(&outside));
    }

    #[test]
    fn test_store_open_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path(), Options::default()).unwrap();
            let mut session = store.batch_session();
            session.put(b"k".to_vec(), b"v".to_vec()).unwrap();
            session.commit().unwrap();
        }
        let store = Store::open(dir.path(), Options::default()).unwrap();
        let session = store.snapshot_session();
        assert_eq!(session.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_delete_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), Options::default()).unwrap();

        let mut session = store.batch_session();
        for ns in [10i64, 11, 12] {
            let mut key = oolong_encoding::namespace_prefix(ns);
            key.push(0x01);
            session.put(key, b"v".to_vec()).unwrap();
        }
        session.commit().unwrap();

        let removed = store.delete_range(&KeyRange::for_namespace(11)).unwrap();
        assert_eq!(removed, 1);

        let session = store.snapshot_session();
        let mut k10 = oolong_encoding::namespace_prefix(10);
        k10.push(0x01);
        let mut k11 = oolong_encoding::namespace_prefix(11);
        k11.push(0x01);
        assert!(session.get(&k10).unwrap().is_some());
        assert!(session.get(&k11).unwrap().is_none());
    }
}
