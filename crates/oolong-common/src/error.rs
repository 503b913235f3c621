//! Error handling for Oolong.
//!
//! Provides a single error type shared by every component, plus a stable
//! kind discriminator for programmatic matching.

use std::fmt;

use thiserror::Error;

/// Result type alias for Oolong operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The constraint class reported by a constraint violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// A `NOT NULL` field received a null value.
    NotNull,
    /// A value could not be coerced to the declared field type.
    Type,
    /// A `CHECK` expression did not hold.
    Check,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::NotNull => write!(f, "NOT NULL"),
            ConstraintKind::Type => write!(f, "TYPE"),
            ConstraintKind::Check => write!(f, "CHECK"),
        }
    }
}

/// Stable error kinds for categorizing errors.
///
/// These discriminators are stable across versions and are the supported
/// way to pattern-match on failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input (empty name, illegal identifier).
    Invalid,
    /// An absent table, index, sequence, or field.
    NotFound,
    /// Name collision on create, or rename to the same name.
    AlreadyExists,
    /// A field-level constraint did not hold.
    ConstraintViolation,
    /// A unique index rejected a duplicate tuple.
    UniqueViolation,
    /// Transaction state conflict.
    TxConflict,
    /// The enclosing execution context was cancelled.
    Cancelled,
    /// An error propagated from the storage layer.
    Io,
    /// The storage layer reported inconsistent data.
    Corruption,
}

/// The main error type for Oolong.
///
/// Every variant carries enough context to produce a human-readable
/// message naming the offending entity; [`Error::kind`] exposes the
/// stable discriminator.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input.
    #[error("invalid input: {message}")]
    Invalid {
        /// Description of what was malformed.
        message: String,
    },

    /// Table not found.
    #[error("table '{name}' not found")]
    TableNotFound {
        /// The missing table.
        name: String,
    },

    /// Index not found.
    #[error("index '{name}' not found")]
    IndexNotFound {
        /// The missing index.
        name: String,
    },

    /// Sequence not found.
    #[error("sequence '{name}' not found")]
    SequenceNotFound {
        /// The missing sequence.
        name: String,
    },

    /// Field not found.
    #[error("field '{name}' not found")]
    FieldNotFound {
        /// The missing field path.
        name: String,
    },

    /// Name collision on create or rename.
    #[error("'{name}' already exists")]
    AlreadyExists {
        /// The colliding name.
        name: String,
    },

    /// A field-level constraint did not hold.
    #[error("field '{field}' violates {constraint} constraint")]
    ConstraintViolation {
        /// The offending field path.
        field: String,
        /// Which constraint class was violated.
        constraint: ConstraintKind,
    },

    /// A unique index rejected a duplicate tuple.
    #[error("index '{index}' already contains {tuple}")]
    UniqueViolation {
        /// The violated index.
        index: String,
        /// Rendering of the duplicate tuple.
        tuple: String,
    },

    /// Transaction state conflict.
    #[error("{message}")]
    TxConflict {
        /// Description of the conflict.
        message: String,
    },

    /// The enclosing execution context was cancelled.
    #[error("operation was cancelled")]
    Cancelled,

    /// I/O error from the underlying system.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An error propagated from the storage engine.
    #[error("storage error: {message}")]
    Storage {
        /// The storage engine's message.
        message: String,
    },

    /// The storage layer reported inconsistent data.
    #[error("data corruption detected: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },
}

impl Error {
    /// Returns the stable kind discriminator for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Invalid { .. } => ErrorKind::Invalid,
            Self::TableNotFound { .. }
            | Self::IndexNotFound { .. }
            | Self::SequenceNotFound { .. }
            | Self::FieldNotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            Self::UniqueViolation { .. } => ErrorKind::UniqueViolation,
            Self::TxConflict { .. } => ErrorKind::TxConflict,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io { .. } | Self::Storage { .. } => ErrorKind::Io,
            Self::Corruption { .. } => ErrorKind::Corruption,
        }
    }

    /// Returns true if this error means an entity was not found.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound)
    }

    /// Creates an [`Error::Invalid`].
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Creates an [`Error::TxConflict`].
    #[must_use]
    pub fn tx_conflict(message: impl Into<String>) -> Self {
        Self::TxConflict {
            message: message.into(),
        }
    }

    /// Creates an [`Error::Storage`].
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates an [`Error::Corruption`].
    #[must_use]
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }
}
