//! Error types for the [`walk`](super) module.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A walk error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for walk operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Per-directory failures are reported and the walk moves on; only
/// [`StorageUnavailable`](ErrorKind::StorageUnavailable) ends it.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A directory listing failed.
    #[display("could not list {}", _0.display())]
    List(#[error(not(source))] PathBuf),
    /// The location operation failed for one artifact directory.
    #[display("operation {operation} failed for {}", path.display())]
    Operation { operation: String, path: PathBuf },
    /// The repository's backend cannot be reached at all.
    #[display("storage unavailable")]
    StorageUnavailable,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable)
    }

    /// Returns `true` if the walk cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StorageUnavailable)
    }
}
