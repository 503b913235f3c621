//! # oolong-common
//!
//! Common types, errors, and keyspace layout for Oolong.
//!
//! This crate provides the foundational types shared by every Oolong
//! component:
//!
//! - **Types**: encoded keys (`Key`), dynamic values (`Value`, `ValueType`)
//!   and ordered field maps (`Document`)
//! - **Errors**: unified error handling with `Error` and its stable
//!   `ErrorKind` discriminator
//! - **Namespaces**: the numeric partitioning of the key-value keyspace
//!
//! ## Example
//!
//! ```rust
//! use oolong_common::types::{Key, Value};
//! use oolong_common::Result;
//!
//! fn example() -> Result<()> {
//!     let key = Key::from_bytes(b"user:1234");
//!     let value = Value::Int(42);
//!     assert_eq!(key.len(), 9);
//!     assert!(!value.is_null());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod namespace;
pub mod types;

// Re-export commonly used items at the crate root
pub use error::{ConstraintKind, Error, ErrorKind, Result};
pub use types::{Document, Key, Value, ValueType};
