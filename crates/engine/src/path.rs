//! Repository-scoped paths.
//!
//! A [`RepositoryPath`] is a validated relative path plus the repository it
//! belongs to, so that anything above the storage backend can ask for
//! layout-derived attributes without re-implementing format rules. The empty
//! relative path is the repository root.

use crate::error::{self, ErrorKind, Result};
use crate::repository::Repository;
use depot_layout::{ArtifactCoordinates, FileClass};
use depot_storage::error::ErrorKind as StorageErrorKind;
use depot_storage::validate_path;
use exn::ResultExt;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::UtcDateTime;

#[derive(Clone)]
pub struct RepositoryPath {
    repository: Arc<Repository>,
    relative: PathBuf,
}

/// Attributes that [`RepositoryPath::attributes()`] can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Artifact,
    Metadata,
    Checksum,
    Expired,
    Directory,
    Coordinates,
    Size,
    LastModified,
}

impl Attribute {
    pub const ALL: [Attribute; 8] = [
        Self::Artifact,
        Self::Metadata,
        Self::Checksum,
        Self::Expired,
        Self::Directory,
        Self::Coordinates,
        Self::Size,
        Self::LastModified,
    ];
}

/// Requested attributes of one path; anything not requested is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    pub artifact: Option<bool>,
    pub metadata: Option<bool>,
    pub checksum: Option<bool>,
    pub expired: Option<bool>,
    pub directory: Option<bool>,
    pub coordinates: Option<ArtifactCoordinates>,
    pub size: Option<u64>,
    pub last_modified: Option<UtcDateTime>,
}

impl RepositoryPath {
    pub(crate) fn root(repository: Arc<Repository>) -> Self {
        Self {
            repository,
            relative: PathBuf::new(),
        }
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }

    /// Path relative to the repository root.
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn is_root(&self) -> bool {
        self.relative.as_os_str().is_empty()
    }

    /// Final component, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.relative.file_name().and_then(|name| name.to_str())
    }

    /// Resolve `child` below this path. Absolute children are taken from the
    /// repository root; `..` may climb up to, but not past, the root.
    pub fn resolve(&self, child: impl AsRef<Path>) -> Result<RepositoryPath> {
        let joined = self.relative.join(child.as_ref());
        let relative = validate_path(&joined).or_raise(|| ErrorKind::PathEscape(joined.clone()))?;
        Ok(Self {
            repository: Arc::clone(&self.repository),
            relative,
        })
    }

    /// The path of `other` relative to this one. Both must be in the same
    /// repository, with `other` at or below `self`.
    pub fn relativize(&self, other: &RepositoryPath) -> Result<PathBuf> {
        if self.repository.id() != other.repository.id() {
            exn::bail!(ErrorKind::PathEscape(other.relative.clone()));
        }
        match other.relative.strip_prefix(&self.relative) {
            Ok(rest) => Ok(rest.to_path_buf()),
            Err(_) => exn::bail!(ErrorKind::PathEscape(other.relative.clone())),
        }
    }

    pub fn parent(&self) -> Result<RepositoryPath> {
        if self.is_root() {
            exn::bail!(ErrorKind::RootHasNoParent(self.repository.id().to_string()));
        }
        Ok(Self {
            repository: Arc::clone(&self.repository),
            relative: self.relative.parent().map(Path::to_path_buf).unwrap_or_default(),
        })
    }

    /// Whether `self` is `other` or lies below it.
    pub fn starts_with(&self, other: &RepositoryPath) -> bool {
        self.repository.id() == other.repository.id() && self.relative.starts_with(&other.relative)
    }

    pub async fn exists(&self) -> Result<bool> {
        self.repository.backend().exists(&self.relative).await.map_err(error::storage)
    }

    pub async fn is_directory(&self) -> Result<bool> {
        self.repository.backend().is_dir(&self.relative).await.map_err(error::storage)
    }

    /// Layout classification from the path string alone.
    pub fn classify(&self) -> FileClass {
        self.repository.layout().classify(&self.relative)
    }

    pub fn coordinates(&self) -> Result<ArtifactCoordinates> {
        self.repository.layout().parse(&self.relative).or_raise(|| ErrorKind::Layout)
    }

    /// Compute the requested attributes, judging expiry against the current
    /// time.
    pub async fn attributes(&self, kinds: &[Attribute]) -> Result<Attributes> {
        self.attributes_at(kinds, UtcDateTime::now()).await
    }

    /// Compute the requested attributes. Only [`Attribute::Directory`],
    /// [`Attribute::Expired`], [`Attribute::Size`] and
    /// [`Attribute::LastModified`] touch storage.
    pub async fn attributes_at(&self, kinds: &[Attribute], now: UtcDateTime) -> Result<Attributes> {
        let wants = |kind: Attribute| kinds.contains(&kind);
        let mut attributes = Attributes::default();

        if wants(Attribute::Artifact) || wants(Attribute::Metadata) || wants(Attribute::Checksum) {
            let class = self.classify();
            attributes.artifact = wants(Attribute::Artifact).then_some(class.artifact);
            attributes.metadata = wants(Attribute::Metadata).then_some(class.metadata);
            attributes.checksum = wants(Attribute::Checksum).then_some(class.checksum);
        }
        if wants(Attribute::Coordinates) {
            attributes.coordinates = self.repository.layout().parse(&self.relative).ok();
        }
        let directory = if wants(Attribute::Directory) || wants(Attribute::Expired) {
            Some(self.is_directory().await?)
        } else {
            None
        };
        attributes.directory = directory.filter(|_| wants(Attribute::Directory));

        let needs_stat = wants(Attribute::Size) || wants(Attribute::LastModified) || wants(Attribute::Expired);
        if needs_stat && directory != Some(true) && !self.is_root() {
            match self.repository.backend().stat(&self.relative).await {
                Ok(info) => {
                    attributes.size = wants(Attribute::Size).then_some(info.size);
                    attributes.last_modified = wants(Attribute::LastModified).then_some(info.modified);
                    attributes.expired = wants(Attribute::Expired)
                        .then(|| self.repository.layout().is_expired(&self.relative, info.modified, now));
                },
                // A missing file has nothing cached to expire.
                Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => {
                    attributes.expired = wants(Attribute::Expired).then_some(false);
                },
                Err(err) => return Err(error::storage(err)),
            }
        } else if wants(Attribute::Expired) {
            attributes.expired = Some(false);
        }
        Ok(attributes)
    }
}

impl fmt::Debug for RepositoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RepositoryPath").field(&self.to_string()).finish()
    }
}

impl fmt::Display for RepositoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.repository.id(), self.relative.display())
    }
}

impl PartialEq for RepositoryPath {
    fn eq(&self, other: &Self) -> bool {
        self.repository.id() == other.repository.id() && self.relative == other.relative
    }
}

impl Eq for RepositoryPath {}

impl Hash for RepositoryPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.repository.id().hash(state);
        self.relative.hash(state);
    }
}

impl PartialOrd for RepositoryPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RepositoryPath {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.repository.id(), &self.relative).cmp(&(other.repository.id(), &other.relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryId;
    use depot_config::RepositoryKind;
    use depot_layout::maven::MavenLayout;
    use depot_storage::backend::MockBackend;
    use rstest::rstest;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn repository(files: &[(&str, &str)]) -> Arc<Repository> {
        Arc::new(Repository::new(
            RepositoryId::new("storage0", "releases"),
            Arc::new(MavenLayout::new(Duration::from_secs(60))),
            RepositoryKind::Hosted,
            Arc::new(MockBackend::with_files(files.iter().copied()).with_name("storage0:releases")),
        ))
    }

    #[rstest]
    #[case("", "com/acme", "com/acme")]
    #[case("com/acme", "lib/1.0", "com/acme/lib/1.0")]
    #[case("com/acme/lib", "../other", "com/acme/other")]
    #[case("com/acme", "/org/x", "org/x")]
    #[case("com/acme", "..", "com")]
    #[case("com", "..", "")]
    #[case("com/acme", "lib/../../../etc", "etc")]
    fn test_resolve(#[case] base: &str, #[case] child: &str, #[case] expected: &str) {
        let repo = repository(&[]);
        let resolved = repo.path(base).unwrap().resolve(child).unwrap();
        assert_eq!(resolved.relative(), Path::new(expected));
    }

    #[rstest]
    #[case("", "..")]
    #[case("com", "../..")]
    #[case("com/acme", "lib/../../../../etc")]
    #[case("com/acme", "/../etc")]
    fn test_resolve_escape(#[case] base: &str, #[case] child: &str) {
        let err = repository(&[]).path(base).unwrap().resolve(child).unwrap_err();
        assert!(matches!(&*err, ErrorKind::PathEscape(_)));
    }

    #[test]
    fn test_parent_and_root() {
        let repo = repository(&[]);
        let path = repo.path("com/acme/lib").unwrap();
        let parent = path.parent().unwrap();
        assert_eq!(parent.relative(), Path::new("com/acme"));
        let root = parent.parent().unwrap().parent().unwrap();
        assert!(root.is_root());
        let err = root.parent().unwrap_err();
        assert_eq!(*err, ErrorKind::RootHasNoParent("storage0:releases".into()));
    }

    #[test]
    fn test_relativize() {
        let repo = repository(&[]);
        let base = repo.path("com/acme").unwrap();
        let child = repo.path("com/acme/lib/1.0").unwrap();
        assert_eq!(base.relativize(&child).unwrap(), Path::new("lib/1.0"));
        assert_eq!(repo.root().relativize(&child).unwrap(), Path::new("com/acme/lib/1.0"));
        assert!(child.relativize(&base).is_err());

        let other = repository(&[]);
        assert_eq!(base, other.path("com/acme").unwrap(), "same id and path compare equal");
    }

    #[test]
    fn test_ordering_as_set_key() {
        let repo = repository(&[]);
        let set: BTreeSet<RepositoryPath> =
            ["b", "a", "a/b", "a"].into_iter().map(|p| repo.path(p).unwrap()).collect();
        let ordered: Vec<_> = set.iter().map(|p| p.relative().to_path_buf()).collect();
        assert_eq!(ordered, [PathBuf::from("a"), PathBuf::from("a/b"), PathBuf::from("b")]);
    }

    #[tokio::test]
    async fn test_attributes() {
        let repo = repository(&[
            ("com/acme/lib/1.0/lib-1.0.jar", "jar"),
            ("com/acme/lib/1.0/lib-1.0.jar.sha256", "hash"),
            ("com/acme/lib/maven-metadata.xml", "<metadata/>"),
        ]);
        let jar = repo.path("com/acme/lib/1.0/lib-1.0.jar").unwrap();
        let attributes = jar.attributes(&Attribute::ALL).await.unwrap();
        assert_eq!(attributes.artifact, Some(true));
        assert_eq!(attributes.metadata, Some(false));
        assert_eq!(attributes.checksum, Some(false));
        assert_eq!(attributes.directory, Some(false));
        assert_eq!(attributes.expired, Some(false));
        assert_eq!(attributes.size, Some(3));
        assert!(attributes.last_modified.is_some());
        assert_eq!(attributes.coordinates.map(|c| c.id()), Some("com.acme:lib".to_string()));

        let checksum = repo.path("com/acme/lib/1.0/lib-1.0.jar.sha256").unwrap();
        let attributes = checksum.attributes(&[Attribute::Checksum, Attribute::Artifact]).await.unwrap();
        assert_eq!(attributes.checksum, Some(true));
        assert_eq!(attributes.artifact, Some(false));
        assert_eq!(attributes.size, None);

        let dir = repo.path("com/acme/lib").unwrap();
        let attributes = dir.attributes(&[Attribute::Directory, Attribute::Expired]).await.unwrap();
        assert_eq!(attributes.directory, Some(true));
        assert_eq!(attributes.expired, Some(false));
    }

    #[tokio::test]
    async fn test_metadata_expiry() {
        let repo = repository(&[("com/acme/lib/maven-metadata.xml", "<metadata/>")]);
        let metadata = repo.path("com/acme/lib/maven-metadata.xml").unwrap();
        let modified = metadata.attributes(&[Attribute::LastModified]).await.unwrap().last_modified.unwrap();

        let fresh = metadata.attributes_at(&[Attribute::Expired, Attribute::Metadata], modified).await.unwrap();
        assert_eq!(fresh.expired, Some(false));
        assert_eq!(fresh.metadata, Some(true));
        let stale = metadata
            .attributes_at(&[Attribute::Expired], modified + time::Duration::seconds(61))
            .await
            .unwrap();
        assert_eq!(stale.expired, Some(true));
    }

    #[tokio::test]
    async fn test_exists() {
        let repo = repository(&[("com/acme/lib/1.0/lib-1.0.pom", "<project/>")]);
        assert!(repo.path("com/acme/lib").unwrap().exists().await.unwrap());
        assert!(repo.path("com/acme/lib").unwrap().is_directory().await.unwrap());
        assert!(!repo.path("com/acme/lib/1.0/lib-1.0.pom").unwrap().is_directory().await.unwrap());
        assert!(!repo.path("org").unwrap().exists().await.unwrap());
    }
}
