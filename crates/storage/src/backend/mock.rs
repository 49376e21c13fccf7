//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::models::{DirEntry, FileInfo};
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use time::UtcDateTime;
use tokio::sync::{Notify, RwLock};

use crate::StorageBackend;

/// In-memory storage backend for testing.
///
/// Files are stored in an ordered map behind a [`RwLock`]; directories are
/// implied by the files beneath them, exactly like an object store. Writes and
/// reads can be made to fail on demand to exercise partial-failure handling.
///
/// # Examples
///
/// ```
/// use depot_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([
///     ("com/acme/lib/1.0/lib-1.0.pom", "<project/>"),
/// ]);
/// assert!(backend.is_dir(Path::new("com/acme/lib")).await?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<BTreeMap<PathBuf, (UtcDateTime, Vec<u8>)>>,
    writes: Mutex<HashMap<PathBuf, usize>>,
    fail_writes: AtomicBool,
    unavailable: AtomicBool,
    hold: Mutex<Option<(PathBuf, Arc<MockHold>)>>,
}

/// A paused read or listing, created by [`MockBackend::hold_next()`].
///
/// The held call has already captured its result when it pauses, so
/// anything written while it waits is not part of what it returns.
#[derive(Debug, Default)]
pub struct MockHold {
    reached: Notify,
    release: Notify,
}

impl MockHold {
    /// Wait until the held call has paused.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    /// Let the held call return.
    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pause(&self) {
        self.reached.notify_one();
        self.release.notified().await;
    }
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = BTreeMap::new();
        let now = UtcDateTime::now();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            writes: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            hold: Mutex::new(None),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every subsequent write/delete fail with a backend error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent operation fail as if the backend was unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// How many times `path` has been written since construction.
    pub fn write_count(&self, path: impl AsRef<Path>) -> usize {
        let Ok(path) = validate_path(path) else {
            return 0;
        };
        self.writes.lock().map(|w| w.get(&path).copied().unwrap_or(0)).unwrap_or(0)
    }

    /// Replace the modification time of an existing file.
    pub async fn touch(&self, path: impl AsRef<Path>, modified: UtcDateTime) {
        if let Ok(path) = validate_path(path)
            && let Some(entry) = self.storage.write().await.get_mut(&path)
        {
            entry.0 = modified;
        }
    }

    /// Pause the next [`read()`](StorageBackend::read) of `path`, or the
    /// next listing with `path` as its prefix, until the returned hold is
    /// released.
    ///
    /// Panics if `path` fails validation.
    pub fn hold_next(&self, path: impl AsRef<Path>) -> Arc<MockHold> {
        let path = path.as_ref();
        let Ok(validated) = validate_path(path) else {
            panic!("MockBackend::hold_next: invalid path {}", path.display());
        };
        let hold = Arc::new(MockHold::default());
        if let Ok(mut slot) = self.hold.lock() {
            *slot = Some((validated, Arc::clone(&hold)));
        }
        hold
    }

    fn take_hold(&self, path: &Path) -> Option<Arc<MockHold>> {
        let mut slot = self.hold.lock().ok()?;
        if !slot.as_ref().is_some_and(|(held, _)| held == path) {
            return None;
        }
        slot.take().map(|(_, hold)| hold)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Unavailable(format!("mock backend `{}` is offline", self.name)));
        }
        Ok(())
    }

    fn check_writable(&self, path: &Path) -> Result<()> {
        self.check_available()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::BackendError(format!("write to {} rejected", path.display())));
        }
        Ok(())
    }

    /// Name of the first component of `path` below `dir`, and whether more
    /// components follow (i.e. it is a directory).
    fn child_of(dir: &Path, path: &Path) -> Option<DirEntry> {
        let rest = path.strip_prefix(dir).ok()?;
        let mut components = rest.components();
        let Some(Component::Normal(first)) = components.next() else {
            return None;
        };
        let name = first.to_str()?.to_string();
        Some(match components.next() {
            Some(_) => DirEntry::directory(name),
            None => DirEntry::file(name),
        })
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match self.check_available().and_then(|()| prefix.map(validate_path).transpose()) {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| match &validated_prefix {
                        Some(pfx) => path.starts_with(pfx),
                        None => true,
                    })
                    .map(|(path, (modified, data))| FileInfo::new(path.clone(), data.len() as u64, *modified))
                    .collect()
            };
            let hold = validated_prefix.as_deref().and_then(|pfx| self.take_hold(pfx));
            if let Some(hold) = hold {
                hold.pause().await;
            }
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntry>> {
        self.check_available()?;
        let dir = validate_path(dir)?;
        let guard = self.storage.read().await;
        if guard.contains_key(&dir) {
            exn::bail!(ErrorKind::NotFound(dir));
        }
        let children: BTreeSet<DirEntry> = guard.keys().filter_map(|path| Self::child_of(&dir, path)).collect();
        if children.is_empty() && !dir.as_os_str().is_empty() {
            exn::bail!(ErrorKind::NotFound(dir));
        }
        Ok(children.into_iter().collect())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.check_available()?;
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        Ok(path.as_os_str().is_empty() || guard.contains_key(&path) || guard.keys().any(|p| p.starts_with(&path)))
    }

    async fn is_dir(&self, path: &Path) -> Result<bool> {
        self.check_available()?;
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        Ok(path.as_os_str().is_empty() || guard.keys().any(|p| p != &path && p.starts_with(&path)))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.check_available()?;
        let path = validate_path(path)?;
        let (_modified, data) =
            self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        if let Some(hold) = self.take_hold(&path) {
            hold.pause().await;
        }
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.check_writable(path)?;
        let path = validate_path(path)?;
        if path.as_os_str().is_empty() {
            exn::bail!(ErrorKind::InvalidPath(path));
        }
        if let Ok(mut writes) = self.writes.lock() {
            *writes.entry(path.clone()).or_default() += 1;
        }
        self.storage.write().await.insert(path, (UtcDateTime::now(), data.to_vec()));
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.check_writable(path)?;
        let path = validate_path(path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        self.check_available()?;
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        let (modified, data) = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(FileInfo::new(path.clone(), data.len() as u64, *modified))
    }
}
