//! Core data types for Oolong.
//!
//! This module defines the dynamic value model shared by the encoder, the
//! catalog, and the stream pipeline, plus the byte-string key wrapper used
//! throughout the storage layer.

mod document;
mod key;
mod value;

pub use document::Document;
pub use key::Key;
pub use value::{Value, ValueType};
