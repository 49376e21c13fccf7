//! Storing and deleting artifacts, keeping metadata consistent as it happens.

use crate::error::{self, ErrorKind, Result};
use crate::notify::{IndexEvent, IndexNotifier, NoopNotifier};
use crate::path::RepositoryPath;
use crate::propagate::{MetadataPropagator, MetadataScope, PropagationReport};
use depot_storage::checksum::CHECKSUM_EXTENSIONS;
use depot_storage::error::ErrorKind as StorageErrorKind;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Writes and removes artifact files in hosted repositories.
///
/// Every successful change regenerates the repository's own metadata,
/// propagates it to the groups containing the repository, and then notifies
/// the index.
#[derive(Clone)]
pub struct ArtifactManager {
    propagator: MetadataPropagator,
    notifier: Arc<dyn IndexNotifier>,
}

impl fmt::Debug for ArtifactManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactManager").field("notifier", &self.notifier).finish_non_exhaustive()
    }
}

impl ArtifactManager {
    pub fn new(propagator: MetadataPropagator) -> Self {
        Self {
            propagator,
            notifier: Arc::new(NoopNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn IndexNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn propagator(&self) -> &MetadataPropagator {
        &self.propagator
    }

    fn check_writable(path: &RepositoryPath) -> Result<()> {
        let repository = path.repository();
        if repository.is_group() {
            exn::bail!(ErrorKind::GroupNotWritable(repository.id().to_string()));
        }
        Ok(())
    }

    /// Write an artifact and its checksum files.
    ///
    /// The path must name an artifact of the repository's layout, with a
    /// version its policy accepts.
    #[instrument(skip_all, fields(repository = %path.repository().id(), path = %path.relative().display(), size = data.len()))]
    pub async fn store(&self, path: &RepositoryPath, data: &[u8], cancel: &CancellationToken) -> Result<PropagationReport> {
        Self::check_writable(path)?;
        if !path.classify().artifact {
            exn::bail!(ErrorKind::NotAnArtifact(path.relative().to_path_buf()));
        }
        let repository = path.repository();
        let coordinates = path.coordinates()?;
        if let Some(version) = coordinates.version()
            && !repository.accepts_version(version)
        {
            exn::bail!(ErrorKind::PolicyViolation {
                repository: repository.id().to_string(),
                policy: repository.policy().to_string(),
                version: version.to_string(),
            });
        }

        let backend = repository.backend();
        backend.write(path.relative(), data).await.map_err(error::storage)?;
        let Some(file_name) = path.file_name() else {
            exn::bail!(ErrorKind::NotAnArtifact(path.relative().to_path_buf()));
        };
        for algorithm in self.propagator.generator().store().checksums() {
            let sibling = path.relative().with_file_name(algorithm.sibling(file_name));
            backend.write(&sibling, algorithm.digest(data).as_bytes()).await.map_err(error::storage)?;
        }
        tracing::info!("stored artifact");

        let report = self.propagator.update_groups_containing(path, cancel).await.map_err(error::propagation)?;
        self.notifier.notify(IndexEvent::Stored {
            repository: repository.id().clone(),
            path: path.relative().to_path_buf(),
        });
        Ok(report)
    }

    /// Delete an artifact file with its checksum files, or a whole version
    /// directory.
    ///
    /// Deleting a snapshot file regenerates that snapshot's version-level
    /// document, removing it when no snapshot file is left. The
    /// artifact-level document is regenerated either way.
    #[instrument(skip_all, fields(repository = %path.repository().id(), path = %path.relative().display()))]
    pub async fn delete(&self, path: &RepositoryPath, cancel: &CancellationToken) -> Result<PropagationReport> {
        Self::check_writable(path)?;
        if path.is_root() {
            exn::bail!(ErrorKind::NotAnArtifact(path.relative().to_path_buf()));
        }
        let repository = path.repository();
        let backend = repository.backend();
        let scope = MetadataScope::resolve(path, self.propagator.generator().store()).await?;

        if path.is_directory().await? {
            let removed = backend.delete_dir(path.relative()).await.map_err(error::storage)?;
            tracing::info!(removed, "deleted directory");
        } else {
            backend.delete(path.relative()).await.map_err(error::storage)?;
            for extension in CHECKSUM_EXTENSIONS {
                let mut sibling = path.relative().as_os_str().to_owned();
                sibling.push(".");
                sibling.push(extension);
                match backend.delete(Path::new(&sibling)).await {
                    Err(err) if !matches!(&*err, StorageErrorKind::NotFound(_)) => return Err(error::storage(err)),
                    _ => {},
                }
            }
            tracing::info!("deleted file");
        }

        let report = self.propagator.update_scope(repository, &scope, cancel).await.map_err(error::propagation)?;
        self.notifier.notify(IndexEvent::Deleted {
            repository: repository.id().clone(),
            path: path.relative().to_path_buf(),
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::generate::MetadataGenerator;
    use crate::notify::ChannelNotifier;
    use crate::repository::{Repository, RepositoryId};
    use depot_config::{RepositoryKind, RepositoryPolicy};
    use depot_layout::maven::MavenLayout;
    use depot_metadata::MetadataStore;
    use depot_storage::backend::MockBackend;

    struct Fixture {
        manager: ArtifactManager,
        releases: Arc<Repository>,
        snapshots: Arc<Repository>,
        public: Arc<Repository>,
        events: tokio::sync::mpsc::UnboundedReceiver<IndexEvent>,
    }

    fn fixture(files: &[(&str, &str)]) -> Fixture {
        let maven = Arc::new(MavenLayout::default());
        let releases = Repository::new(
            RepositoryId::new("s", "releases"),
            maven.clone(),
            RepositoryKind::Hosted,
            Arc::new(MockBackend::with_files(files.iter().copied()).with_name("s:releases")),
        )
        .with_policy(RepositoryPolicy::Release);
        let snapshots = Repository::new(
            RepositoryId::new("s", "snapshots"),
            maven.clone(),
            RepositoryKind::Hosted,
            Arc::new(MockBackend::default().with_name("s:snapshots")),
        )
        .with_policy(RepositoryPolicy::Snapshot);
        let public = Repository::new(
            RepositoryId::new("s", "public"),
            maven,
            RepositoryKind::Group,
            Arc::new(MockBackend::default().with_name("s:public")),
        )
        .with_members([RepositoryId::new("s", "releases"), RepositoryId::new("s", "snapshots")]);
        let catalog = Arc::new(Catalog::from_repositories([releases, snapshots, public]).unwrap());
        let (notifier, events) = ChannelNotifier::new();
        let propagator = MetadataPropagator::new(Arc::clone(&catalog), MetadataGenerator::new(MetadataStore::default()));
        let get = |name: &str| catalog.get(&RepositoryId::new("s", name)).unwrap();
        Fixture {
            manager: ArtifactManager::new(propagator).with_notifier(Arc::new(notifier)),
            releases: get("releases"),
            snapshots: get("snapshots"),
            public: get("public"),
            events,
        }
    }

    async fn versions(repository: &Repository) -> Vec<String> {
        MetadataStore::default()
            .read(repository.backend(), Path::new("com/acme/lib/maven-metadata.xml"))
            .await
            .unwrap()
            .versions()
            .to_vec()
    }

    #[tokio::test]
    async fn test_store() {
        let mut fixture = fixture(&[("com/acme/lib/1.0/lib-1.0.jar", "a")]);
        let path = fixture.releases.path("com/acme/lib/1.1/lib-1.1.jar").unwrap();
        let report = fixture.manager.store(&path, b"jar", &CancellationToken::new()).await.unwrap();

        assert_eq!(report.updated, [RepositoryId::new("s", "public")]);
        assert_eq!(versions(&fixture.releases).await, ["1.0", "1.1"]);
        assert_eq!(versions(&fixture.public).await, ["1.0", "1.1"]);
        assert!(fixture.releases.backend().exists(Path::new("com/acme/lib/1.1/lib-1.1.jar.sha256")).await.unwrap());
        assert_eq!(
            fixture.events.try_recv().unwrap(),
            IndexEvent::Stored {
                repository: RepositoryId::new("s", "releases"),
                path: "com/acme/lib/1.1/lib-1.1.jar".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_store_rejections() {
        let fixture = fixture(&[]);
        let cancel = CancellationToken::new();

        let path = fixture.public.path("com/acme/lib/1.0/lib-1.0.jar").unwrap();
        let err = fixture.manager.store(&path, b"a", &cancel).await.unwrap_err();
        assert_eq!(*err, ErrorKind::GroupNotWritable("s:public".into()));

        let path = fixture.releases.path("com/acme/lib/1.0/lib-1.0.jar.sha256").unwrap();
        let err = fixture.manager.store(&path, b"a", &cancel).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotAnArtifact(_)));

        let path = fixture.releases.path("com/acme/lib/1.0-SNAPSHOT/lib-1.0-20240102.030405-1.jar").unwrap();
        let err = fixture.manager.store(&path, b"a", &cancel).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PolicyViolation { policy, .. } if policy == "release"));

        let path = fixture.snapshots.path("com/acme/lib/1.0/lib-1.0.jar").unwrap();
        let err = fixture.manager.store(&path, b"a", &cancel).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PolicyViolation { policy, .. } if policy == "snapshot"));
    }

    #[tokio::test]
    async fn test_delete_version_directory() {
        let mut fixture = fixture(&[
            ("com/acme/lib/1.0/lib-1.0.jar", "a"),
            ("com/acme/lib/1.0/lib-1.0.pom", "b"),
            ("com/acme/lib/1.1/lib-1.1.jar", "c"),
        ]);
        let cancel = CancellationToken::new();
        let path = fixture.releases.path("com/acme/lib/1.1/lib-1.1.jar").unwrap();
        fixture.manager.propagator().update_groups_containing(&path, &cancel).await.unwrap();
        assert_eq!(versions(&fixture.public).await, ["1.0", "1.1"]);

        let path = fixture.releases.path("com/acme/lib/1.0").unwrap();
        fixture.manager.delete(&path, &cancel).await.unwrap();
        assert_eq!(versions(&fixture.releases).await, ["1.1"]);
        assert_eq!(versions(&fixture.public).await, ["1.1"]);
        assert!(!fixture.releases.backend().exists(Path::new("com/acme/lib/1.0")).await.unwrap());
        assert!(matches!(fixture.events.try_recv().unwrap(), IndexEvent::Deleted { .. }));
    }

    #[tokio::test]
    async fn test_delete_snapshot_files() {
        let fixture = fixture(&[]);
        let cancel = CancellationToken::new();
        let first = fixture.snapshots.path("com/acme/lib/2.0-SNAPSHOT/lib-2.0-20240102.030405-1.jar").unwrap();
        let second = fixture.snapshots.path("com/acme/lib/2.0-SNAPSHOT/lib-2.0-20240103.030405-2.jar").unwrap();
        fixture.manager.store(&first, b"1", &cancel).await.unwrap();
        fixture.manager.store(&second, b"2", &cancel).await.unwrap();

        let snapshot_doc = Path::new("com/acme/lib/2.0-SNAPSHOT/maven-metadata.xml");
        let store = MetadataStore::default();
        let merged = store.read(fixture.public.backend(), snapshot_doc).await.unwrap();
        let build = merged.versioning.as_ref().and_then(|v| v.snapshot.as_ref()).and_then(|s| s.build_number);
        assert_eq!(build, Some(2));

        fixture.manager.delete(&second, &cancel).await.unwrap();
        let merged = store.read(fixture.public.backend(), snapshot_doc).await.unwrap();
        let build = merged.versioning.as_ref().and_then(|v| v.snapshot.as_ref()).and_then(|s| s.build_number);
        assert_eq!(build, Some(1));
        assert!(!fixture.snapshots.backend().exists(&second.relative().with_extension("jar.sha256")).await.unwrap());

        fixture.manager.delete(&first, &cancel).await.unwrap();
        assert!(store.read_optional(fixture.snapshots.backend(), snapshot_doc).await.unwrap().is_none());
        assert!(store.read_optional(fixture.public.backend(), snapshot_doc).await.unwrap().is_none());
        assert!(versions(&fixture.snapshots).await.is_empty());
        assert!(versions(&fixture.public).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_recomputes_latest_and_release() {
        let fixture = fixture(&[("com/acme/lib/1.0/lib-1.0.jar", "a"), ("com/acme/lib/1.1/lib-1.1.jar", "b")]);
        let cancel = CancellationToken::new();
        let path = fixture.releases.path("com/acme/lib/1.1/lib-1.1.jar").unwrap();
        fixture.manager.propagator().update_groups_containing(&path, &cancel).await.unwrap();
        let store = MetadataStore::default();
        let doc = Path::new("com/acme/lib/maven-metadata.xml");

        fixture.manager.delete(&fixture.releases.path("com/acme/lib/1.0").unwrap(), &cancel).await.unwrap();
        for repository in [&fixture.releases, &fixture.public] {
            let metadata = store.read(repository.backend(), doc).await.unwrap();
            assert_eq!(metadata.versions(), ["1.1"]);
            assert_eq!(metadata.latest(), Some("1.1"));
            assert_eq!(metadata.release(), Some("1.1"));
        }

        fixture.manager.delete(&fixture.releases.path("com/acme/lib/1.1").unwrap(), &cancel).await.unwrap();
        for repository in [&fixture.releases, &fixture.public] {
            let metadata = store.read(repository.backend(), doc).await.unwrap();
            assert!(metadata.versioning.is_some());
            assert!(metadata.versions().is_empty());
            assert_eq!(metadata.latest(), None);
            assert_eq!(metadata.release(), None);
        }
    }
}
