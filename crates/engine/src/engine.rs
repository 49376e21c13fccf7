use crate::artifact::ArtifactManager;
use crate::catalog::Catalog;
use crate::error::{self, ErrorKind, Result};
use crate::generate::MetadataGenerator;
use crate::jobs::{JobId, JobTracker};
use crate::notify::IndexNotifier;
use crate::path::RepositoryPath;
use crate::propagate::{MetadataPropagator, PropagationReport};
use crate::repository::{Repository, RepositoryId};
use crate::walk::{self, OperationContext, OperationRegistry, WalkReport};
use depot_config::Config;
use depot_layout::LayoutRegistry;
use depot_metadata::MetadataStore;
use exn::ResultExt;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Finished jobs kept for [`Engine::jobs()`] by default.
pub const DEFAULT_FINISHED_JOBS_KEPT: usize = 100;

/// Everything needed to serve the scheduler-facing entry points.
///
/// Each entry point runs as a job in [`jobs()`](Self::jobs) and can be
/// cancelled from there.
#[derive(Debug)]
pub struct Engine {
    layouts: LayoutRegistry,
    artifacts: ArtifactManager,
    operations: OperationRegistry,
    jobs: JobTracker,
    finished_jobs_kept: usize,
}

impl Engine {
    pub fn new(catalog: Catalog, layouts: LayoutRegistry, store: MetadataStore) -> Self {
        let propagator = MetadataPropagator::new(Arc::new(catalog), MetadataGenerator::new(store));
        Self {
            layouts,
            artifacts: ArtifactManager::new(propagator),
            operations: OperationRegistry::with_defaults(),
            jobs: JobTracker::new(),
            finished_jobs_kept: DEFAULT_FINISHED_JOBS_KEPT,
        }
    }

    /// Build the catalog, layouts and metadata store described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let layouts = LayoutRegistry::with_defaults(config.metadata.expiry());
        let checksums = config.metadata.checksum_algorithms().or_raise(|| ErrorKind::Config)?;
        let catalog = Catalog::from_config(config, &layouts)?;
        tracing::info!(repositories = catalog.repositories().count(), "engine ready");
        Ok(Self::new(catalog, layouts, MetadataStore::new(checksums)))
    }

    /// How many finished jobs stay listed in [`jobs()`](Self::jobs) once a
    /// new job starts.
    pub fn with_finished_jobs_kept(mut self, keep: usize) -> Self {
        self.finished_jobs_kept = keep;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn IndexNotifier>) -> Self {
        self.artifacts = self.artifacts.with_notifier(notifier);
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        self.artifacts.propagator().catalog()
    }

    pub fn layouts(&self) -> &LayoutRegistry {
        &self.layouts
    }

    pub fn store(&self) -> &MetadataStore {
        self.artifacts.propagator().generator().store()
    }

    pub fn propagator(&self) -> &MetadataPropagator {
        self.artifacts.propagator()
    }

    pub fn artifacts(&self) -> &ArtifactManager {
        &self.artifacts
    }

    pub fn operations(&self) -> &OperationRegistry {
        &self.operations
    }

    pub fn operations_mut(&mut self) -> &mut OperationRegistry {
        &mut self.operations
    }

    pub fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    /// Ask a running job to stop. See [`JobTracker::cancel()`].
    pub fn cancel(&self, id: JobId) -> bool {
        self.jobs.cancel(id)
    }

    pub fn repository(&self, id: &RepositoryId) -> Result<Arc<Repository>> {
        self.catalog().get(id)
    }

    pub fn path(&self, id: &RepositoryId, relative: impl AsRef<Path>) -> Result<RepositoryPath> {
        self.repository(id)?.path(relative)
    }

    async fn tracked<T, F>(&self, name: String, run: impl FnOnce(CancellationToken) -> F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.jobs.prune_finished(self.finished_jobs_kept);
        let (id, cancel) = self.jobs.start(name);
        let result = run(cancel).await;
        self.jobs.finish(id, &result);
        result
    }

    /// Run the named walk operation over `repository`, from `start` down.
    pub async fn walk(
        &self,
        repository: &RepositoryId,
        start: impl AsRef<Path>,
        operation: &str,
        force: bool,
    ) -> Result<WalkReport> {
        let repository = self.repository(repository)?;
        let context = OperationContext {
            generator: self.propagator().generator().clone(),
            checksums: self.store().checksums().to_vec(),
            force,
        };
        let operation = self.operations.create(operation, &context)?;
        let name = format!("walk {} {}", operation.name(), repository.id());
        self.tracked(name, |cancel| async move {
            walk::walk(&repository, start, operation.as_ref(), &cancel).await
        })
        .await
    }

    /// Bring every group containing `path`'s repository up to date.
    pub async fn propagate(&self, path: &RepositoryPath) -> Result<PropagationReport> {
        let name = format!("propagate {path}");
        self.tracked(name, |cancel| async move {
            self.propagator().update_groups_containing(path, &cancel).await.map_err(error::propagation)
        })
        .await
    }

    pub async fn store_artifact(&self, path: &RepositoryPath, data: &[u8]) -> Result<PropagationReport> {
        let name = format!("store {path}");
        self.tracked(name, |cancel| async move { self.artifacts.store(path, data, &cancel).await }).await
    }

    pub async fn delete(&self, path: &RepositoryPath) -> Result<PropagationReport> {
        let name = format!("delete {path}");
        self.tracked(name, |cancel| async move { self.artifacts.delete(path, &cancel).await }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;
    use depot_config::{MemberRef, RepositoryConfig, RepositoryKind, StorageConfig};
    use tempfile::TempDir;

    fn config(basedir: &Path) -> Config {
        let mut config = Config::default();
        config.storages.insert(
            "storage0".into(),
            StorageConfig {
                basedir: basedir.to_path_buf(),
                repositories: [
                    ("releases".to_string(), RepositoryConfig::new("maven", RepositoryKind::Hosted)),
                    (
                        "group-a".to_string(),
                        RepositoryConfig::new("maven", RepositoryKind::Group).with_members([MemberRef::local("releases")]),
                    ),
                ]
                .into_iter()
                .collect(),
            },
        );
        config
    }

    #[tokio::test]
    async fn test_engine_on_local_storage() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::from_config(&config(dir.path())).unwrap();
        let releases = RepositoryId::new("storage0", "releases");

        for version in ["1.0", "1.1"] {
            let path = engine.path(&releases, format!("com/acme/lib/{version}/lib-{version}.jar")).unwrap();
            engine.store_artifact(&path, version.as_bytes()).await.unwrap();
        }
        let group_doc = dir.path().join("group-a/com/acme/lib/maven-metadata.xml");
        assert!(group_doc.is_file());

        let report = engine.delete(&engine.path(&releases, "com/acme/lib/1.0").unwrap()).await.unwrap();
        assert_eq!(report.updated, [RepositoryId::new("storage0", "group-a")]);
        let group = engine.repository(&RepositoryId::new("storage0", "group-a")).unwrap();
        let merged = engine.store().read(group.backend(), Path::new("com/acme/lib/maven-metadata.xml")).await.unwrap();
        assert_eq!(merged.versions(), ["1.1"]);

        let report = engine.walk(&releases, "", "report", false).await.unwrap();
        assert_eq!(report.locations, 1);
        let err = engine.walk(&releases, "", "reindex", false).await.unwrap_err();
        assert_eq!(*err, ErrorKind::UnknownOperation("reindex".into()));

        let jobs = engine.jobs().list();
        assert_eq!(jobs.len(), 4);
        assert!(jobs.iter().all(|job| job.status == JobStatus::Completed));
        assert!(jobs[3].name.starts_with("walk report storage0:releases"));
    }

    #[tokio::test]
    async fn test_finished_jobs_are_pruned() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::from_config(&config(dir.path())).unwrap().with_finished_jobs_kept(2);
        let releases = RepositoryId::new("storage0", "releases");
        for version in ["1.0", "1.1", "1.2", "1.3"] {
            let path = engine.path(&releases, format!("com/acme/lib/{version}/lib-{version}.jar")).unwrap();
            engine.store_artifact(&path, version.as_bytes()).await.unwrap();
        }
        // Pruning happens as a job starts, so the newest job joins the two kept.
        let names: Vec<String> = engine.jobs().list().into_iter().map(|job| job.name).collect();
        assert_eq!(names.len(), 3);
        assert!(names[0].contains("1.1"));
        assert!(names[2].contains("1.3"));
    }
}
