//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface for byte storage underneath one repository. Directories are
//! implicit: they exist while at least one file lives beneath them, which
//! keeps the behaviour identical between the local filesystem and object
//! stores.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::{MockBackend, MockHold};
use crate::error::Result;
use crate::models::{DirEntry, FileInfo};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// All paths are relative to the backend root and are validated using
/// [`validate_path`](crate::validate_path) by the implementation. The empty
/// path refers to the root itself.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use depot_storage::{backend::StorageBackend, error::Result};
///
/// async fn pom_size(backend: &dyn StorageBackend) -> Result<u64> {
///     let path = Path::new("com/acme/lib/1.0/lib-1.0.pom");
///     if backend.exists(path).await? {
///         Ok(backend.stat(path).await?.size)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the backend, used for logging and as a lock namespace. Each
    /// repository gets its own backend, so this is expected to be unique.
    fn name(&self) -> &str;

    /// List all files (recursively) below an optional prefix.
    ///
    /// Default implementation collects [`list_stream()`](Self::list_stream)
    /// into a [`Vec`].
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream file metadata (recursively) below an optional prefix.
    ///
    /// Prefix matching is component-based: `com/acme` matches
    /// `com/acme/lib.jar` but not `com/acmefoo/lib.jar`. A prefix that does
    /// not exist yields an empty stream rather than an error.
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// List the immediate children of a directory, sorted by name.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if `dir` is
    /// not a directory. The root always exists (possibly empty).
    async fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntry>>;

    /// Check if a file or directory exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Check if `path` is a directory.
    async fn is_dir(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents, replacing any existing file.
    ///
    /// # Notes
    /// - Implementations must create parent directories as needed.
    /// - Writes are atomic: readers observe either the previous contents or
    ///   the new contents, never a partially written file.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Delete every file below `dir`, returning how many were removed.
    ///
    /// Deleting a directory that does not exist removes nothing and is not
    /// an error.
    async fn delete_dir(&self, dir: &Path) -> Result<usize> {
        let files = self.list(Some(dir)).await?;
        for file in &files {
            self.delete(&file.path).await?;
        }
        Ok(files.len())
    }

    /// Get file metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;
}
