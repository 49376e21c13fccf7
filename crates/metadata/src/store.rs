//! Reading and atomically writing metadata documents, with per-path locks.

use crate::error::{self, ErrorKind, Result};
use crate::model::{Metadata, MetadataLevel};
use crate::{ops, xml};
use dashmap::DashMap;
use depot_layout::LayoutProvider;
use depot_storage::checksum::CHECKSUM_EXTENSIONS;
use depot_storage::error::ErrorKind as StorageErrorKind;
use depot_storage::{ChecksumAlgorithm, StorageBackend};
use exn::ResultExt;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::UtcDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

type LockKey = (String, PathBuf);
type LockTable = DashMap<LockKey, Arc<Mutex<()>>>;

/// Exclusive hold on one metadata path of one backend.
///
/// Dropping the guard releases the path; the table entry is removed once
/// nobody else holds or waits for it.
#[must_use = "the path is unlocked as soon as the guard is dropped"]
pub struct PathLock {
    guard: Option<OwnedMutexGuard<()>>,
    key: LockKey,
    table: Arc<LockTable>,
}

impl fmt::Debug for PathLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathLock").field("backend", &self.key.0).field("path", &self.key.1).finish()
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.table.remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// Reads, writes and edits metadata documents.
///
/// Writes go through [`StorageBackend::write`], which replaces the document
/// atomically. Read-modify-write sequences must hold [`lock()`](Self::lock)
/// for the document's path; [`read()`](Self::read) and
/// [`store()`](Self::store) do not lock on their own so that callers can
/// compose them inside one critical section.
#[derive(Clone)]
pub struct MetadataStore {
    locks: Arc<LockTable>,
    checksums: Arc<[ChecksumAlgorithm]>,
}

impl fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataStore")
            .field("checksums", &self.checksums)
            .field("held_locks", &self.locks.len())
            .finish()
    }
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new([ChecksumAlgorithm::Sha256])
    }
}

impl MetadataStore {
    /// A store that writes a checksum sibling for each of `checksums` next
    /// to every document it stores.
    pub fn new(checksums: impl IntoIterator<Item = ChecksumAlgorithm>) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            checksums: checksums.into_iter().collect(),
        }
    }

    pub fn checksums(&self) -> &[ChecksumAlgorithm] {
        &self.checksums
    }

    /// Number of paths currently locked or waited on.
    pub fn held_locks(&self) -> usize {
        self.locks.len()
    }

    /// Wait for exclusive access to `path` on `backend`.
    ///
    /// Locks on different paths, or on the same path of different backends,
    /// never contend.
    pub async fn lock(&self, backend: &dyn StorageBackend, path: &Path) -> PathLock {
        let key = (backend.name().to_string(), path.to_path_buf());
        let mutex = Arc::clone(self.locks.entry(key.clone()).or_default().value());
        let guard = mutex.lock_owned().await;
        PathLock {
            guard: Some(guard),
            key,
            table: Arc::clone(&self.locks),
        }
    }

    /// Read and parse the document at `path`.
    pub async fn read(&self, backend: &dyn StorageBackend, path: &Path) -> Result<Metadata> {
        let bytes = match backend.read(path).await {
            Ok(bytes) => bytes,
            Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => {
                exn::bail!(ErrorKind::MetadataNotFound(path.to_path_buf()))
            },
            Err(err) => return Err(error::storage(err)),
        };
        xml::parse(&bytes).or_raise(|| ErrorKind::MetadataCorrupt(path.to_path_buf()))
    }

    /// Like [`read()`](Self::read), but a missing document is `None`.
    pub async fn read_optional(&self, backend: &dyn StorageBackend, path: &Path) -> Result<Option<Metadata>> {
        match self.read(backend, path).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(err) if matches!(&*err, ErrorKind::MetadataNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Atomically replace the document at `path`, then its checksum
    /// siblings.
    ///
    /// Returns `false` without touching storage when the serialised document
    /// is byte-identical to what is already there (missing checksum siblings
    /// are still filled in).
    #[instrument(skip_all, fields(backend = backend.name(), path = %path.display(), level = %level))]
    pub async fn store(
        &self,
        backend: &dyn StorageBackend,
        path: &Path,
        metadata: &Metadata,
        level: MetadataLevel,
    ) -> Result<bool> {
        let actual = metadata.level();
        if actual != level {
            exn::bail!(ErrorKind::LevelMismatch { expected: level, actual });
        }
        let bytes = xml::to_xml(metadata).into_bytes();
        let unchanged = match backend.read(path).await {
            Ok(existing) => existing == bytes,
            Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => false,
            Err(err) => return Err(error::storage(err)),
        };
        if !unchanged {
            backend.write(path, &bytes).await.map_err(error::storage)?;
            tracing::debug!(size = bytes.len(), "stored metadata");
        }
        for algorithm in self.checksums.iter() {
            let checksum_path = sibling(path, algorithm.extension());
            if unchanged && backend.exists(&checksum_path).await.map_err(error::storage)? {
                continue;
            }
            backend.write(&checksum_path, algorithm.digest(&bytes).as_bytes()).await.map_err(error::storage)?;
        }
        Ok(!unchanged)
    }

    /// Remove `version` from the document at `path` under the path lock.
    ///
    /// A missing document has no versions to remove; returns whether the
    /// document changed.
    #[instrument(skip_all, fields(backend = backend.name(), path = %path.display(), version = %version))]
    pub async fn remove_version(
        &self,
        backend: &dyn StorageBackend,
        path: &Path,
        version: &str,
        layout: &dyn LayoutProvider,
        now: UtcDateTime,
    ) -> Result<bool> {
        let _lock = self.lock(backend, path).await;
        let Some(mut metadata) = self.read_optional(backend, path).await? else {
            tracing::debug!("no metadata document, nothing to remove");
            return Ok(false);
        };
        if !ops::remove_version(&mut metadata, version, layout, now) {
            return Ok(false);
        }
        let level = metadata.level();
        self.store(backend, path, &metadata, level).await
    }

    /// Delete the document at `path` and every checksum sibling. Returns
    /// `false` if there was no document.
    #[instrument(skip_all, fields(backend = backend.name(), path = %path.display()))]
    pub async fn delete(&self, backend: &dyn StorageBackend, path: &Path) -> Result<bool> {
        let existed = match backend.delete(path).await {
            Ok(()) => true,
            Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => false,
            Err(err) => return Err(error::storage(err)),
        };
        for extension in CHECKSUM_EXTENSIONS {
            match backend.delete(&sibling(path, extension)).await {
                Err(err) if !matches!(&*err, StorageErrorKind::NotFound(_)) => return Err(error::storage(err)),
                _ => {},
            }
        }
        if existed {
            tracing::debug!("deleted metadata");
        }
        Ok(existed)
    }
}
