//! Error types for the [`propagate`](super) module.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A propagation error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for propagation runs.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The metadata documents affected by a path could not be determined.
    #[display("cannot determine the metadata affected by {}", _0.display())]
    Scope(#[error(not(source))] PathBuf),
    /// Some groups were updated, others failed. Each failure was logged as
    /// it happened; the successful updates stand.
    #[display("{} of {} groups could not be updated: {}", failed.len(), failed.len() + updated.len(), failed.join(", "))]
    PropagationPartialFailure { failed: Vec<String>, updated: Vec<String> },
    /// Group repositories contain each other. Only ever logged and reported;
    /// the run itself is unaffected.
    #[display("group repositories contain each other: {}", _0.join(", "))]
    CycleDetected(#[error(not(source))] Vec<String>),
    /// The run stopped at a cancellation checkpoint. Updates made before it
    /// stand.
    #[display("propagation cancelled")]
    Cancelled,
    /// A storage backend cannot be reached at all; the run was aborted.
    #[display("storage unavailable")]
    StorageUnavailable,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PropagationPartialFailure { .. } | Self::StorageUnavailable)
    }

    /// Returns `true` if the run was aborted rather than completed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StorageUnavailable)
    }
}
