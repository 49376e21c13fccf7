//! Local filesystem storage backend.
//!
//! Files are stored below a configured directory and accessed through
//! `tokio::fs`. Writes go to a temporary file in the destination directory
//! first and are renamed into place, so readers never observe partial files.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::models::{DirEntry, EntryKind};
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry as FsDirEntry};

/// Prefix of in-flight temporary files; never reported by listings.
const TEMP_PREFIX: &str = ".depot-tmp";

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use depot_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("storage0:releases", "/var/lib/depot/storage0/releases")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory of the repository
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend, creating the root directory if
    /// it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists but is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Happens once on configuration load; not worth an async constructor.
            sync_create_dir(&root).map_err(ErrorKind::from)?;
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validates the path and joins it with the root directory.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Convert an absolute path back to a relative storage path.
    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        validate_path(relative)
    }

    fn file_info(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?.into();
        Ok(FileInfo::new(PathBuf::from(path), metadata.len(), modified))
    }

    /// A missing path is only "not found" while the root itself is still
    /// there; once the root vanishes the whole backend is unavailable.
    fn map_io_error(&self, e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound if !self.root.is_dir() => {
                ErrorKind::Unavailable(format!("root `{}` is missing", self.root.display()))
            },
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    fn is_temporary(name: &str) -> bool {
        name.starts_with(TEMP_PREFIX)
    }

    /// Remove now-empty directories between `abs_path` and the root.
    async fn prune_empty_parents(&self, abs_path: &Path) {
        let mut current = abs_path.parent();
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            // `remove_dir` refuses non-empty directories, which is the stop condition.
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }

    async fn process_entry(&self, entry: FsDirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        if entry.file_name().to_str().is_some_and(Self::is_temporary) {
            return Ok(WalkEntry::Skip);
        }
        let metadata = entry.metadata().await.map_err(|e| self.map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::file_info(&relative, metadata)?));
        }
        // Most likely a broken symlink.
        Ok(WalkEntry::Skip)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };
        // Start from the prefix directory itself; a prefix that names a file
        // (or nothing at all) simply produces no directory to read.
        let start_dir = match validated_prefix.as_deref() {
            Some(prefix) if !prefix.as_os_str().is_empty() => self.root.join(prefix),
            _ => self.root.clone(),
        };
        let mut stack = vec![start_dir.clone()];

        Box::pin(stream! {
            if let Some(prefix) = validated_prefix.as_deref()
                && !prefix.as_os_str().is_empty()
                && let Ok(metadata) = fs::metadata(&start_dir).await
                && metadata.is_file()
            {
                match Self::file_info(prefix, metadata) {
                    Ok(info) => yield Ok(info),
                    Err(e) => yield Err(e),
                }
                return;
            }
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // Listing a directory that doesn't exist results in an
                    // empty list, matching object-store semantics.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound && self.root.is_dir() => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(self.map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };
                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(self.map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntry>> {
        let abs_path = self.absolute_path(dir)?;
        let mut entries = fs::read_dir(&abs_path).await.map_err(|e| self.map_io_error(e, dir))?;
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| self.map_io_error(e, dir))? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::debug!(backend = %self.name, dir = %dir.display(), "Skipping non-UTF8 directory entry");
                continue;
            };
            if Self::is_temporary(&name) {
                continue;
            }
            let file_type = entry.file_type().await.map_err(|e| self.map_io_error(e, dir))?;
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                continue;
            };
            children.push(DirEntry { name, kind });
        }
        children.sort();
        Ok(children)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn is_dir(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        match fs::metadata(&abs_path).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(exn::Exn::from(self.map_io_error(e, path))),
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| self.map_io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        if abs_path == self.root {
            exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
        }
        let Some(parent) = abs_path.parent().map(Path::to_path_buf) else {
            exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
        };
        if !self.root.is_dir() {
            exn::bail!(ErrorKind::Unavailable(format!("root `{}` is missing", self.root.display())));
        }
        fs::create_dir_all(&parent).await.map_err(|e| self.map_io_error(e, path))?;
        let data = data.to_vec();
        // tempfile is a sync API; keep it off the async worker threads.
        let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut temp = tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(&parent)?;
            temp.write_all(&data)?;
            temp.as_file().sync_all()?;
            temp.persist(&abs_path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .or_raise(|| ErrorKind::BackendError("atomic write task panicked".to_string()))?;
        Ok(result.map_err(|e| self.map_io_error(e, path))?)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        fs::remove_file(&abs_path).await.map_err(|e| self.map_io_error(e, path))?;
        self.prune_empty_parents(&abs_path).await;
        Ok(())
    }

    async fn delete_dir(&self, dir: &Path) -> Result<usize> {
        let abs_path = self.absolute_path(dir)?;
        if abs_path == self.root {
            exn::bail!(ErrorKind::InvalidPath(dir.to_path_buf()));
        }
        let count = self.list(Some(dir)).await?.len();
        match fs::remove_dir_all(&abs_path).await {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && self.root.is_dir() => return Ok(0),
            Err(e) => exn::bail!(self.map_io_error(e, dir)),
        }
        self.prune_empty_parents(&abs_path).await;
        Ok(count)
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| self.map_io_error(e, path))?;
        Self::file_info(&validate_path(path)?, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("storage0:releases", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("name", "relative/path").is_err());
    }

    #[test]
    fn test_new_creates_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("storage0/releases");
        LocalBackend::new("name", &root).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_absolute_and_relative_paths() {
        let (temp_dir, backend) = backend();
        let expected = temp_dir.path().join("com/acme/lib");
        assert_eq!(backend.absolute_path("com/acme/lib").unwrap(), expected);
        assert_eq!(backend.relative_path(&expected).unwrap(), Path::new("com/acme/lib"));
        assert!(backend.absolute_path("../other").is_err());
        assert!(backend.relative_path("/somewhere/else").is_err());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("com/acme/lib/1.0/lib-1.0.pom"), b"<project/>").await.unwrap();
        let data = backend.read(Path::new("com/acme/lib/1.0/lib-1.0.pom")).await.unwrap();
        assert_eq!(data, b"<project/>");
    }

    #[tokio::test]
    async fn test_write_replaces_and_leaves_no_temp_files() {
        let (temp_dir, backend) = backend();
        backend.write(Path::new("a/file.xml"), b"first").await.unwrap();
        backend.write(Path::new("a/file.xml"), b"second").await.unwrap();
        assert_eq!(backend.read(Path::new("a/file.xml")).await.unwrap(), b"second");
        let names: Vec<_> = std::fs::read_dir(temp_dir.path().join("a"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["file.xml".to_string()]);
    }

    #[tokio::test]
    async fn test_write_root_rejected() {
        let (_temp_dir, backend) = backend();
        assert!(backend.write(Path::new(""), b"data").await.is_err());
    }

    #[tokio::test]
    async fn test_list_dir() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("lib/1.1/lib-1.1.jar"), b"j").await.unwrap();
        backend.write(Path::new("lib/1.0/lib-1.0.jar"), b"j").await.unwrap();
        backend.write(Path::new("lib/maven-metadata.xml"), b"m").await.unwrap();
        let entries = backend.list_dir(Path::new("lib")).await.unwrap();
        assert_eq!(
            entries,
            vec![DirEntry::directory("1.0"), DirEntry::directory("1.1"), DirEntry::file("maven-metadata.xml")]
        );
        let root = backend.list_dir(Path::new("")).await.unwrap();
        assert_eq!(root, vec![DirEntry::directory("lib")]);
    }

    #[tokio::test]
    async fn test_list_dir_missing() {
        let (_temp_dir, backend) = backend();
        let err = backend.list_dir(Path::new("nope")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_is_dir() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("lib/1.0/lib-1.0.jar"), b"j").await.unwrap();
        assert!(backend.is_dir(Path::new("lib/1.0")).await.unwrap());
        assert!(backend.is_dir(Path::new("")).await.unwrap());
        assert!(!backend.is_dir(Path::new("lib/1.0/lib-1.0.jar")).await.unwrap());
        assert!(!backend.is_dir(Path::new("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_with_prefix_is_component_based() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("com/acme/lib.jar"), b"a").await.unwrap();
        backend.write(Path::new("com/acme/sub/lib.jar"), b"b").await.unwrap();
        backend.write(Path::new("com/acmefoo/lib.jar"), b"c").await.unwrap();
        let mut files: Vec<_> =
            backend.list(Some(Path::new("com/acme"))).await.unwrap().into_iter().map(|f| f.path).collect();
        files.sort();
        assert_eq!(files, vec![PathBuf::from("com/acme/lib.jar"), PathBuf::from("com/acme/sub/lib.jar")]);
        assert_eq!(backend.list(None).await.unwrap().len(), 3);
        assert!(backend.list(Some(Path::new("missing"))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_prunes_empty_directories() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("lib/1.0/lib-1.0.jar"), b"j").await.unwrap();
        backend.write(Path::new("lib/maven-metadata.xml"), b"m").await.unwrap();
        backend.delete(Path::new("lib/1.0/lib-1.0.jar")).await.unwrap();
        assert!(!backend.exists(Path::new("lib/1.0")).await.unwrap());
        assert!(backend.exists(Path::new("lib")).await.unwrap());
        let err = backend.delete(Path::new("lib/1.0/lib-1.0.jar")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_dir() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("lib/1.0/lib-1.0.jar"), b"j").await.unwrap();
        backend.write(Path::new("lib/1.0/lib-1.0.pom"), b"p").await.unwrap();
        backend.write(Path::new("lib/1.1/lib-1.1.pom"), b"p").await.unwrap();
        assert_eq!(backend.delete_dir(Path::new("lib/1.0")).await.unwrap(), 2);
        assert!(!backend.exists(Path::new("lib/1.0")).await.unwrap());
        assert!(backend.exists(Path::new("lib/1.1/lib-1.1.pom")).await.unwrap());
        assert_eq!(backend.delete_dir(Path::new("lib/2.0")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stat() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("lib/file.txt"), b"Hello, world!").await.unwrap();
        let info = backend.stat(Path::new("lib/./file.txt")).await.unwrap();
        assert_eq!(info.path, PathBuf::from("lib/file.txt"));
        assert_eq!(info.size, 13);
    }

    #[tokio::test]
    async fn test_missing_root_is_unavailable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("repo");
        let backend = LocalBackend::new("name", &root).unwrap();
        std::fs::remove_dir(&root).unwrap();
        let err = backend.read(Path::new("anything")).await.unwrap_err();
        assert!(err.is_fatal());
        let err = backend.write(Path::new("anything"), b"x").await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_temp_dir, backend) = backend();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../etc/passwd"), b"data").await.is_err());
        assert!(backend.delete(Path::new("../../file")).await.is_err());
        assert!(backend.list_dir(Path::new("..")).await.is_err());
    }
}
