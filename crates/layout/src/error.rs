//! Layout Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A layout error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for layout operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No provider is registered under the requested alias.
    #[display("unknown layout: {_0}")]
    UnknownLayout(#[error(not(source))] String),
    /// A provider with the same alias was already registered.
    #[display("layout registered twice: {_0}")]
    DuplicateLayout(#[error(not(source))] String),
    /// The path does not follow the layout's coordinate grammar. Callers
    /// should treat the file as non-artifact content.
    #[display("not a {layout} artifact path ({reason}): {}", path.display())]
    Parse {
        layout: &'static str,
        path: PathBuf,
        reason: &'static str,
    },
    /// Coordinates of one layout were handed to another layout's provider.
    #[display("coordinates belong to layout {actual}, not {expected}")]
    WrongLayout { expected: &'static str, actual: &'static str },
}

impl ErrorKind {
    pub(crate) fn parse(layout: &'static str, path: impl Into<PathBuf>, reason: &'static str) -> Self {
        Self::Parse {
            layout,
            path: path.into(),
            reason,
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Layout rules are pure; the same input always fails the same way.
        false
    }
}
