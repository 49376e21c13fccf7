//! Metadata Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use crate::model::MetadataLevel;
use derive_more::{Display, Error};
use depot_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};
use std::path::PathBuf;

/// A metadata error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No document at the path. Treat the version set as empty and
    /// regenerate.
    #[display("metadata not found: {}", _0.display())]
    MetadataNotFound(#[error(not(source))] PathBuf),
    /// A document exists but cannot be parsed. Abort the operation for this
    /// path only.
    #[display("metadata is corrupt: {}", _0.display())]
    MetadataCorrupt(#[error(not(source))] PathBuf),
    /// Codec-level detail underneath [`MetadataCorrupt`](Self::MetadataCorrupt).
    #[display("malformed metadata document: {_0}")]
    Malformed(#[error(not(source))] String),
    /// Documents of different levels cannot be combined.
    #[display("cannot combine {expected} metadata with {actual} metadata")]
    LevelMismatch { expected: MetadataLevel, actual: MetadataLevel },
    /// The storage backend failed for this path.
    #[display("storage error")]
    Storage,
    /// The storage backend cannot be reached at all.
    #[display("storage unavailable")]
    StorageUnavailable,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::StorageUnavailable)
    }

    /// Returns `true` if the whole backend is unusable, rather than one path.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StorageUnavailable)
    }
}

/// Wrap a storage error, keeping whether the backend as a whole is gone.
pub(crate) fn storage(err: StorageError) -> Error {
    let kind = match &*err {
        StorageErrorKind::Unavailable(_) => ErrorKind::StorageUnavailable,
        _ => ErrorKind::Storage,
    };
    err.raise(kind)
}
