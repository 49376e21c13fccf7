//! Bringing group metadata up to date after an artifact changes.
//!
//! When an artifact changes in repository `R`, [`MetadataPropagator`] first
//! regenerates `R`'s own documents from its file tree, then recomputes the
//! same documents in every group that contains `R`, nearest first. A group's
//! document is the merge of the documents of every non-group repository it
//! reaches through its members, so a version survives in a group for as long
//! as any path to any member still provides it.
//!
//! Each group is recomputed at most once per run, however many paths lead to
//! it, and runs terminate on cyclic configurations.

pub mod error;
mod graph;
mod scope;

pub use self::graph::RepositoryGraph;
pub use self::scope::MetadataScope;
use self::error::{ErrorKind, Result};
use crate::catalog::Catalog;
use crate::error::{self as engine_error, ErrorKind as EngineErrorKind, Result as EngineResult};
use crate::generate::MetadataGenerator;
use crate::path::RepositoryPath;
use crate::repository::{Repository, RepositoryId};
use depot_metadata::{Metadata, MetadataLevel, ops};
use exn::ResultExt;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationFailure {
    pub repository: RepositoryId,
    pub error: String,
}

/// Outcome of one propagation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationReport {
    /// Repository whose change triggered the run.
    pub origin: RepositoryId,
    pub scope: MetadataScope,
    /// Groups recomputed, in the order they were processed. Each appears
    /// once.
    pub updated: Vec<RepositoryId>,
    /// Repositories that could not be updated, the origin included.
    pub failed: Vec<PropagationFailure>,
    /// Membership cycles the run passed through.
    pub cycles: Vec<Vec<RepositoryId>>,
    pub cancelled: bool,
}

impl PropagationReport {
    fn new(origin: RepositoryId, scope: MetadataScope) -> Self {
        Self {
            origin,
            scope,
            updated: Vec::new(),
            failed: Vec::new(),
            cycles: Vec::new(),
            cancelled: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    /// Turn recorded failures or a cancellation into an error.
    pub fn into_result(self) -> Result<Self> {
        if !self.failed.is_empty() {
            exn::bail!(ErrorKind::PropagationPartialFailure {
                failed: self.failed.iter().map(|failure| failure.repository.to_string()).collect(),
                updated: self.updated.iter().map(ToString::to_string).collect(),
            });
        }
        if self.cancelled {
            exn::bail!(ErrorKind::Cancelled);
        }
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct MetadataPropagator {
    catalog: Arc<Catalog>,
    generator: MetadataGenerator,
}

impl MetadataPropagator {
    pub fn new(catalog: Arc<Catalog>, generator: MetadataGenerator) -> Self {
        Self { catalog, generator }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn generator(&self) -> &MetadataGenerator {
        &self.generator
    }

    /// Propagate a change at `path` to every group that contains its
    /// repository.
    ///
    /// Call this after a store, but before a delete: see
    /// [`MetadataScope::resolve()`].
    pub async fn update_groups_containing(
        &self,
        path: &RepositoryPath,
        cancel: &CancellationToken,
    ) -> Result<PropagationReport> {
        let scope = MetadataScope::resolve(path, self.generator.store()).await.map_err(|err| {
            let kind = if err.is_fatal() { ErrorKind::StorageUnavailable } else { ErrorKind::Scope(path.relative().into()) };
            err.raise(kind)
        })?;
        self.update_scope(path.repository(), &scope, cancel).await
    }

    /// Regenerate `scope` in `repository`, then recompute it in every group
    /// containing `repository`.
    ///
    /// Failures on one repository are logged and recorded in the report;
    /// only an unreachable backend aborts the run.
    #[instrument(skip_all, fields(repository = %repository.id(), base = %scope.base.display()))]
    pub async fn update_scope(
        &self,
        repository: &Arc<Repository>,
        scope: &MetadataScope,
        cancel: &CancellationToken,
    ) -> Result<PropagationReport> {
        let mut report = PropagationReport::new(repository.id().clone(), scope.clone());
        let Some(file_name) = repository.layout().metadata_file_name() else {
            tracing::debug!(layout = repository.layout().alias(), "layout keeps no metadata, nothing to propagate");
            return Ok(report);
        };
        let documents = scope.documents(file_name);

        let own = if repository.is_group() {
            self.recompute_group(repository, &documents).await
        } else {
            self.regenerate(repository, scope).await
        };
        Self::record(&mut report, repository.id(), own)?;

        let graph = self.catalog.graph();
        let mut visited = HashSet::from([repository.id().clone()]);
        let mut frontier: VecDeque<RepositoryId> = graph.direct_parents(repository.id()).into();
        while let Some(group_id) = frontier.pop_front() {
            if visited.contains(&group_id) {
                continue;
            }
            if cancel.is_cancelled() {
                tracing::info!(remaining = frontier.len() + 1, "propagation cancelled");
                report.cancelled = true;
                break;
            }
            visited.insert(group_id.clone());
            let outcome = match self.catalog.get(&group_id) {
                Ok(group) => self.recompute_group(&group, &documents).await,
                Err(err) => Err(err),
            };
            if Self::record(&mut report, &group_id, outcome)? {
                report.updated.push(group_id.clone());
            }
            frontier.extend(graph.direct_parents(&group_id));
        }

        report.cycles = graph.cycles().into_iter().filter(|cycle| cycle.iter().any(|id| visited.contains(id))).collect();
        for cycle in &report.cycles {
            let cycle: Vec<String> = cycle.iter().map(ToString::to_string).collect();
            tracing::warn!("{}", ErrorKind::CycleDetected(cycle));
        }
        tracing::info!(
            updated = report.updated.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "propagation finished"
        );
        Ok(report)
    }

    /// Log and record a per-repository outcome. Returns whether it succeeded;
    /// an unreachable backend ends the run instead.
    fn record(report: &mut PropagationReport, id: &RepositoryId, outcome: EngineResult<()>) -> Result<bool> {
        match outcome {
            Ok(()) => Ok(true),
            Err(err) if err.is_fatal() => {
                tracing::error!(repository = %id, error = %err, "storage unavailable, aborting propagation");
                Err(err.raise(ErrorKind::StorageUnavailable))
            },
            Err(err) => {
                tracing::warn!(repository = %id, error = %err, "could not update metadata");
                report.failed.push(PropagationFailure {
                    repository: id.clone(),
                    error: err.to_string(),
                });
                Ok(false)
            },
        }
    }

    /// Rebuild a non-group repository's documents from its file tree.
    async fn regenerate(&self, repository: &Repository, scope: &MetadataScope) -> EngineResult<()> {
        if let Some(dir) = &scope.snapshot_dir {
            self.generator.snapshot_level(repository, dir).await?;
        }
        self.generator.artifact_level(repository, &scope.base).await?;
        Ok(())
    }

    /// Non-group repositories reachable from `group` through its members,
    /// depth first in member order. Nested groups are expanded once each,
    /// and `group` itself is never re-entered.
    fn leaves(&self, group: &RepositoryId) -> Vec<RepositoryId> {
        let graph = self.catalog.graph();
        let mut seen = HashSet::from([group.clone()]);
        let mut pending: Vec<RepositoryId> = graph.members(group).into_iter().rev().collect();
        let mut leaves = Vec::new();
        while let Some(member) = pending.pop() {
            if !seen.insert(member.clone()) {
                continue;
            }
            match self.catalog.get(&member) {
                Ok(repository) if repository.is_group() => pending.extend(graph.members(&member).into_iter().rev()),
                Ok(_) => leaves.push(member),
                Err(_) => tracing::warn!(%group, %member, "skipping unknown member"),
            }
        }
        leaves
    }

    async fn member_document(&self, member: &RepositoryId, path: &Path) -> EngineResult<Option<Metadata>> {
        let repository = self.catalog.get(member)?;
        self.generator
            .store()
            .read_optional(repository.backend(), path)
            .await
            .map_err(engine_error::metadata)
    }

    /// Merge each of `documents` from the group's members and write the
    /// result to the group, or delete it when no member has one.
    ///
    /// Member documents are read while the group document is locked, so a
    /// run that merges after another never writes an older view of the
    /// members over the newer one.
    async fn recompute_group(&self, group: &Repository, documents: &[(PathBuf, Option<MetadataLevel>)]) -> EngineResult<()> {
        let store = self.generator.store();
        let backend = group.backend();
        let leaves = self.leaves(group.id());
        for (path, level) in documents {
            let _lock = store.lock(backend, path).await;
            let mut docs = Vec::new();
            for leaf in &leaves {
                docs.extend(self.member_document(leaf, path).await?);
            }

            let Some(level) = (*level).or_else(|| docs.first().map(Metadata::level)) else {
                if store.delete(backend, path).await.map_err(engine_error::metadata)? {
                    tracing::debug!(group = %group.id(), path = %path.display(), "no member has metadata, removed");
                }
                continue;
            };
            let before = docs.len();
            docs.retain(|doc| doc.level() == level);
            if docs.len() != before {
                tracing::warn!(group = %group.id(), path = %path.display(), skipped = before - docs.len(), %level, "ignoring member metadata of another level");
            }
            if docs.is_empty() {
                store.delete(backend, path).await.map_err(engine_error::metadata)?;
                continue;
            }
            let merged = ops::merge(level, &docs, &**group.layout()).or_raise(|| EngineErrorKind::Metadata)?;
            if store.store(backend, path, &merged, level).await.map_err(engine_error::metadata)? {
                tracing::debug!(group = %group.id(), path = %path.display(), members = docs.len(), "merged group metadata");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_config::RepositoryKind;
    use depot_layout::maven::MavenLayout;
    use depot_metadata::MetadataStore;
    use depot_storage::StorageBackend;
    use depot_storage::backend::MockBackend;
    use std::collections::HashMap;

    const DOC: &str = "com/acme/lib/maven-metadata.xml";

    fn repo(name: &str, members: &[&str], files: &[&str]) -> (Repository, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::with_files(files.iter().map(|f| (*f, "x"))).with_name(format!("s:{name}")));
        let kind = if members.is_empty() { RepositoryKind::Hosted } else { RepositoryKind::Group };
        let repository = Repository::new(RepositoryId::new("s", name), Arc::new(MavenLayout::default()), kind, backend.clone())
            .with_members(members.iter().map(|member| RepositoryId::new("s", *member)));
        (repository, backend)
    }

    struct Fixture {
        propagator: MetadataPropagator,
        backends: HashMap<String, Arc<MockBackend>>,
    }

    impl Fixture {
        fn new(repos: Vec<(Repository, Arc<MockBackend>)>) -> Self {
            let mut backends = HashMap::new();
            let mut repositories = Vec::new();
            for (repository, backend) in repos {
                backends.insert(repository.id().repository.clone(), backend);
                repositories.push(repository);
            }
            let catalog = Catalog::from_repositories(repositories).unwrap();
            Self {
                propagator: MetadataPropagator::new(Arc::new(catalog), MetadataGenerator::new(MetadataStore::default())),
                backends,
            }
        }

        fn repository(&self, name: &str) -> Arc<Repository> {
            self.propagator.catalog().get(&RepositoryId::new("s", name)).unwrap()
        }

        async fn versions(&self, name: &str) -> Option<Vec<String>> {
            let backend = &self.backends[name];
            let doc = self.propagator.generator().store().read_optional(&**backend, Path::new(DOC)).await.unwrap();
            doc.map(|doc| doc.versions().to_vec())
        }
    }

    fn ids(names: &[&str]) -> Vec<RepositoryId> {
        names.iter().map(|name| RepositoryId::new("s", *name)).collect()
    }

    #[tokio::test]
    async fn test_nested_groups() {
        let fixture = Fixture::new(vec![
            repo("releases", &[], &["com/acme/lib/1.0/lib-1.0.jar", "com/acme/lib/1.1/lib-1.1.jar"]),
            repo("thirdparty", &[], &["com/acme/lib/0.9/lib-0.9.jar"]),
            repo("inner", &["releases"], &[]),
            repo("outer", &["inner", "thirdparty"], &[]),
        ]);
        let path = fixture.repository("releases").path("com/acme/lib/1.1/lib-1.1.jar").unwrap();
        let report = fixture.propagator.update_groups_containing(&path, &CancellationToken::new()).await.unwrap();

        assert_eq!(report.updated, ids(&["inner", "outer"]));
        assert!(report.is_success());
        assert_eq!(fixture.versions("releases").await.unwrap(), ["1.0", "1.1"]);
        assert_eq!(fixture.versions("inner").await.unwrap(), ["1.0", "1.1"]);
        // thirdparty was never indexed, so only releases contributes.
        assert_eq!(fixture.versions("outer").await.unwrap(), ["1.0", "1.1"]);
        assert_eq!(fixture.versions("thirdparty").await, None);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_siblings() {
        let fixture = Fixture::new(vec![
            repo("releases", &[], &["com/acme/lib/1.0/lib-1.0.jar"]),
            repo("broken", &["releases"], &[]),
            repo("healthy", &["releases"], &[]),
            repo("top", &["broken", "healthy"], &[]),
        ]);
        fixture.backends["broken"].fail_writes(true);
        let path = fixture.repository("releases").path("com/acme/lib/1.0").unwrap();
        let report = fixture.propagator.update_groups_containing(&path, &CancellationToken::new()).await.unwrap();

        assert_eq!(report.updated, ids(&["healthy", "top"]));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].repository, RepositoryId::new("s", "broken"));
        assert_eq!(fixture.versions("top").await.unwrap(), ["1.0"]);

        let err = report.into_result().unwrap_err();
        assert!(matches!(&*err, ErrorKind::PropagationPartialFailure { failed, .. } if failed == &["s:broken"]));
    }

    #[tokio::test]
    async fn test_unavailable_storage_aborts() {
        let fixture = Fixture::new(vec![
            repo("releases", &[], &["com/acme/lib/1.0/lib-1.0.jar"]),
            repo("public", &["releases"], &[]),
        ]);
        let path = fixture.repository("releases").path("com/acme/lib/1.0/lib-1.0.jar").unwrap();
        fixture.backends["public"].set_unavailable(true);
        let err = fixture.propagator.update_groups_containing(&path, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::StorageUnavailable);
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_cancelled_before_ancestors() {
        let fixture = Fixture::new(vec![
            repo("releases", &[], &["com/acme/lib/1.0/lib-1.0.jar"]),
            repo("public", &["releases"], &[]),
        ]);
        let path = fixture.repository("releases").path("com/acme/lib/1.0/lib-1.0.jar").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = fixture.propagator.update_groups_containing(&path, &cancel).await.unwrap();

        assert!(report.cancelled);
        assert!(report.updated.is_empty());
        // The origin's own update is not undone.
        assert_eq!(fixture.versions("releases").await.unwrap(), ["1.0"]);
        assert_eq!(fixture.versions("public").await, None);
        assert_eq!(*report.into_result().unwrap_err(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_group_loses_last_member_document() {
        let fixture = Fixture::new(vec![
            repo("releases", &[], &["com/acme/lib/1.0/lib-1.0.jar"]),
            repo("public", &["releases"], &[]),
        ]);
        let releases = fixture.repository("releases");
        let path = releases.path("com/acme/lib/1.0/lib-1.0.jar").unwrap();
        fixture.propagator.update_groups_containing(&path, &CancellationToken::new()).await.unwrap();
        assert_eq!(fixture.versions("public").await.unwrap(), ["1.0"]);

        let backend = &fixture.backends["releases"];
        backend.delete_dir(Path::new("com/acme/lib")).await.unwrap();
        fixture
            .propagator
            .update_scope(&releases, &MetadataScope::artifact("com/acme/lib"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fixture.versions("public").await, None);
        assert!(!fixture.backends["public"].exists(Path::new("com/acme/lib/maven-metadata.xml.sha256")).await.unwrap());
    }

    #[tokio::test]
    async fn test_diamond_recomputes_shared_ancestor_once() {
        let fixture = Fixture::new(vec![
            repo("leaf", &[], &["com/acme/lib/1.0/lib-1.0.jar"]),
            repo("front", &["leaf"], &[]),
            repo("back", &["leaf"], &[]),
            repo("all", &["front", "back"], &[]),
        ]);
        let leaf = fixture.repository("leaf");
        let cancel = CancellationToken::new();
        fixture.propagator.update_groups_containing(&leaf.path("com/acme/lib/1.0").unwrap(), &cancel).await.unwrap();
        assert_eq!(fixture.versions("all").await.unwrap(), ["1.0"]);
        let writes = fixture.backends["all"].write_count(DOC);

        fixture.backends["leaf"].delete_dir(Path::new("com/acme/lib/1.0")).await.unwrap();
        let report = fixture.propagator.update_scope(&leaf, &MetadataScope::artifact("com/acme/lib"), &cancel).await.unwrap();

        let mut updated = report.updated.clone();
        updated.sort();
        assert_eq!(updated, ids(&["all", "back", "front"]));
        assert_eq!(report.updated.last(), Some(&RepositoryId::new("s", "all")));
        assert_eq!(fixture.backends["all"].write_count(DOC), writes + 1);
        for name in ["leaf", "front", "back", "all"] {
            assert_eq!(fixture.versions(name).await, Some(Vec::new()), "{name}");
        }
    }

    #[tokio::test]
    async fn test_divergent_siblings_keep_exclusive_versions() {
        let fixture = Fixture::new(vec![
            repo("releases", &[], &["com/acme/lib/1.0/lib-1.0.jar"]),
            repo("mirror", &[], &["com/acme/lib/1.0/lib-1.0.jar", "com/acme/lib/2.0/lib-2.0.jar"]),
            repo("front", &["releases"], &[]),
            repo("all", &["front", "mirror"], &[]),
        ]);
        let cancel = CancellationToken::new();
        for name in ["releases", "mirror"] {
            let path = fixture.repository(name).path("com/acme/lib/1.0/lib-1.0.jar").unwrap();
            fixture.propagator.update_groups_containing(&path, &cancel).await.unwrap();
        }
        assert_eq!(fixture.versions("all").await.unwrap(), ["1.0", "2.0"]);

        let releases = fixture.repository("releases");
        fixture.backends["releases"].delete_dir(Path::new("com/acme/lib/1.0")).await.unwrap();
        fixture
            .propagator
            .update_scope(&releases, &MetadataScope::artifact("com/acme/lib"), &cancel)
            .await
            .unwrap();

        assert_eq!(fixture.versions("front").await, Some(Vec::new()));
        // The mirror still provides 1.0, so the union keeps it.
        assert_eq!(fixture.versions("all").await.unwrap(), ["1.0", "2.0"]);
    }

    #[tokio::test]
    async fn test_overlapping_runs_keep_both_versions() {
        let fixture = Fixture::new(vec![
            repo("l1", &[], &["com/acme/lib/1.0/lib-1.0.jar"]),
            repo("l2", &[], &["com/acme/lib/2.0/lib-2.0.jar"]),
            repo("g", &["l1", "l2"], &[]),
        ]);
        let cancel = CancellationToken::new();
        for (name, file) in [("l1", "com/acme/lib/1.0/lib-1.0.jar"), ("l2", "com/acme/lib/2.0/lib-2.0.jar")] {
            let path = fixture.repository(name).path(file).unwrap();
            fixture.propagator.update_groups_containing(&path, &cancel).await.unwrap();
        }
        assert_eq!(fixture.versions("g").await.unwrap(), ["1.0", "2.0"]);

        let (l1, l2) = (&fixture.backends["l1"], &fixture.backends["l2"]);
        l1.write(Path::new("com/acme/lib/1.1/lib-1.1.jar"), b"x").await.unwrap();
        let first = fixture.repository("l1").path("com/acme/lib/1.1/lib-1.1.jar").unwrap();
        let second = fixture.repository("l2").path("com/acme/lib/3.0/lib-3.0.jar").unwrap();
        // The first run pauses while merging `g`, right after reading l2's
        // document.
        let hold = l2.hold_next(DOC);

        let run_first = fixture.propagator.update_groups_containing(&first, &cancel);
        let run_second = async {
            hold.reached().await;
            l2.write(Path::new("com/acme/lib/3.0/lib-3.0.jar"), b"x").await.unwrap();
            let release = async {
                for _ in 0..16 {
                    tokio::task::yield_now().await;
                }
                hold.release();
            };
            let (report, ()) = tokio::join!(fixture.propagator.update_groups_containing(&second, &cancel), release);
            report
        };
        let (first, second) = tokio::join!(run_first, run_second);

        assert!(first.unwrap().is_success());
        assert!(second.unwrap().is_success());
        assert_eq!(fixture.versions("l1").await.unwrap(), ["1.0", "1.1"]);
        assert_eq!(fixture.versions("l2").await.unwrap(), ["2.0", "3.0"]);
        assert_eq!(fixture.versions("g").await.unwrap(), ["1.0", "1.1", "2.0", "3.0"]);
    }

    #[tokio::test]
    async fn test_cyclic_groups_terminate() {
        let fixture = Fixture::new(vec![
            repo("releases", &[], &["com/acme/lib/1.0/lib-1.0.jar"]),
            repo("first", &["second", "releases"], &[]),
            repo("second", &["first"], &[]),
        ]);
        let path = fixture.repository("releases").path("com/acme/lib/1.0/lib-1.0.jar").unwrap();
        let report = fixture.propagator.update_groups_containing(&path, &CancellationToken::new()).await.unwrap();

        assert_eq!(report.updated, ids(&["first", "second"]));
        assert_eq!(report.cycles, [ids(&["first", "second"])]);
        assert!(report.is_success());
        for name in ["first", "second"] {
            assert_eq!(fixture.versions(name).await.unwrap(), ["1.0"]);
            assert_eq!(fixture.backends[name].write_count(DOC), 1);
        }
    }
}
