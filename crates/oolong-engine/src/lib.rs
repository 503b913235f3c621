//! # oolong-engine
//!
//! The Oolong engine core: a transactional catalog, an ordered row and
//! index layout over the key-value store, and the streaming pipeline
//! that DDL and DML statements use to rebuild tables and maintain
//! indexes.
//!
//! This crate implements:
//! - Database lifecycle with a strict single-writer rule and snapshot
//!   readers
//! - Catalog management (tables, indexes, sequences) with an immutable
//!   snapshot published atomically at commit
//! - Schema-driven document encoding with ordered, prefix-comparable
//!   keys
//! - The pull-based stream pipeline and its table/index operators
//! - Statement runners, including the table-rebuild protocol behind
//!   `ALTER TABLE … ADD FIELD`
//!
//! ## Example
//!
//! ```rust
//! use oolong_engine::{Database, Options, Result};
//!
//! # fn main() -> Result<()> {
//! let db = Database::open(":memory:", Options::default())?;
//! let tx = db.begin(true)?;
//! // … create tables, run statements …
//! tx.commit()?;
//! db.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod database;
pub mod expr;
pub mod row;
pub mod schema;
pub mod sequence;
pub mod statement;
pub mod stream;
pub mod transaction;

mod index;
mod table;

// Re-export commonly used items at the crate root
pub use catalog::{load_catalog, Catalog, CatalogWriter};
pub use database::{CatalogLoader, Database, Options};
pub use sequence::Sequence;
pub use transaction::{Transaction, TxOptions};

pub use oolong_common::{Error, ErrorKind, Result};
