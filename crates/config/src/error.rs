//! Configuration Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The layered configuration could not be read or extracted.
    #[display("could not load configuration")]
    Load,
    /// A storage or repository id is empty.
    #[display("empty storage or repository id")]
    EmptyId,
    /// A group member reference is not of the form `repo` or `storage:repo`.
    #[display("invalid member reference: {_0:?}")]
    InvalidMember(#[error(not(source))] String),
    /// A group member reference names a repository that does not exist.
    #[display("repository {repository} references unknown member {member}")]
    UnresolvedMember { repository: String, member: String },
    /// Only group repositories may declare members.
    #[display("repository {_0} declares members but is not a group")]
    MembersOnNonGroup(#[error(not(source))] String),
    /// A group and its member use different layouts.
    #[display("group {group} ({group_layout}) cannot contain {member} ({member_layout})")]
    LayoutMismatch {
        group: String,
        group_layout: String,
        member: String,
        member_layout: String,
    },
    /// A configured checksum algorithm is not supported.
    #[display("unsupported checksum algorithm: {_0}")]
    UnsupportedChecksum(#[error(not(source))] String),
}

impl ErrorKind {
    /// Configuration errors need the file fixed; retrying never helps.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
