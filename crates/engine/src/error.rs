//! Engine Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. The walker and the propagator have their own error
//! modules for failures specific to a run.

use derive_more::{Display, Error};
use crate::propagate::error::{Error as PropagationError, ErrorKind as PropagationErrorKind};
use depot_metadata::error::{Error as MetadataError, ErrorKind as MetadataErrorKind};
use depot_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};
use std::path::PathBuf;

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A path would resolve outside its repository.
    #[display("path escapes repository root: {}", _0.display())]
    PathEscape(#[error(not(source))] PathBuf),
    /// The parent of a repository root was requested. Callers use this to
    /// detect the top of the tree.
    #[display("repository root {_0} has no parent")]
    RootHasNoParent(#[error(not(source))] String),
    #[display("unknown repository: {_0}")]
    UnknownRepository(#[error(not(source))] String),
    /// A repository is still listed as a member of a group.
    #[display("repository {repository} is still a member of {group}")]
    MemberInUse { repository: String, group: String },
    #[display("repository added twice: {_0}")]
    DuplicateRepository(#[error(not(source))] String),
    /// Group repositories aggregate their members and hold no artifacts of
    /// their own.
    #[display("group repository {_0} does not accept writes")]
    GroupNotWritable(#[error(not(source))] String),
    /// The path does not name an artifact of the repository's layout.
    #[display("not an artifact: {}", _0.display())]
    NotAnArtifact(#[error(not(source))] PathBuf),
    /// The artifact's version is not allowed by the repository policy.
    #[display("{repository} only accepts {policy} versions, not {version}")]
    PolicyViolation {
        repository: String,
        policy: String,
        version: String,
    },
    #[display("unknown walk operation: {_0}")]
    UnknownOperation(#[error(not(source))] String),
    #[display("walk operation registered twice: {_0}")]
    DuplicateOperation(#[error(not(source))] String),
    #[display("layout error")]
    Layout,
    #[display("configuration error")]
    Config,
    #[display("metadata error")]
    Metadata,
    /// A propagation run finished with failures; see its report.
    #[display("metadata propagation failed")]
    Propagation,
    #[display("storage error")]
    Storage,
    /// The storage backend cannot be reached at all.
    #[display("storage unavailable")]
    StorageUnavailable,
    #[display("cancelled")]
    Cancelled,
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

/// Wrap a metadata error, keeping whether the backend as a whole is gone.
pub(crate) fn metadata(err: MetadataError) -> Error {
    let kind = match &*err {
        MetadataErrorKind::StorageUnavailable => ErrorKind::StorageUnavailable,
        _ => ErrorKind::Metadata,
    };
    err.raise(kind)
}

/// Wrap a propagation error, keeping whether the run was aborted or
/// cancelled.
pub(crate) fn propagation(err: PropagationError) -> Error {
    let kind = match &*err {
        PropagationErrorKind::StorageUnavailable => ErrorKind::StorageUnavailable,
        PropagationErrorKind::Cancelled => ErrorKind::Cancelled,
        _ => ErrorKind::Propagation,
    };
    err.raise(kind)
}
