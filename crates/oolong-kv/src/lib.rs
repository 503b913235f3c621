//! # oolong-kv
//!
//! Session layer over the ordered key-value engine.
//!
//! A [`Store`] wraps one LSM keyspace. Reads go through sessions:
//!
//! - [`SnapshotSession`]: point gets and range scans against a consistent
//!   instant; no mutations.
//! - [`BatchSession`]: the snapshot operations plus buffered `put`,
//!   `delete`, and `delete_range`; reads reflect buffered writes. `commit`
//!   persists the batch atomically, `close` discards it.
//!
//! A batch session that outgrows its buffer flushes early; every early
//! flush records undo entries in the reserved rollback segment namespace
//! so that a crash, or a close without commit, can restore the state of
//! the last successful commit. [`Store::reset_rollback_segment`] performs
//! that recovery at startup.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod rollback;
pub mod session;
pub mod store;

pub use session::{BatchSession, KvIter, Session, SnapshotSession};
pub use store::{KeyRange, Options, Store};
