use crate::error::{self, ErrorKind, Result};
use crate::propagate::RepositoryGraph;
use crate::repository::{Repository, RepositoryId};
use depot_config::Config;
use depot_layout::LayoutRegistry;
use depot_storage::backend::LocalBackend;
use exn::ResultExt;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Every configured repository, plus the group graph derived from them.
///
/// The graph is rebuilt whenever a repository is added or removed, so
/// lookups never see a stale membership.
#[derive(Debug, Default)]
pub struct Catalog {
    repositories: BTreeMap<RepositoryId, Arc<Repository>>,
    graph: RepositoryGraph,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a set of repositories that may reference each
    /// other in any order, including cyclically.
    pub fn from_repositories(repositories: impl IntoIterator<Item = Repository>) -> Result<Self> {
        let mut catalog = Self::new();
        for repository in repositories {
            let id = repository.id().clone();
            if catalog.repositories.insert(id.clone(), Arc::new(repository)).is_some() {
                exn::bail!(ErrorKind::DuplicateRepository(id.to_string()));
            }
        }
        for repository in catalog.repositories.values() {
            catalog.check_members(repository)?;
        }
        catalog.rebuild_graph();
        Ok(catalog)
    }

    /// One [`LocalBackend`] per repository under `{basedir}/{repository}`.
    pub fn from_config(config: &Config, layouts: &LayoutRegistry) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Config)?;
        let mut repositories = Vec::new();
        for (storage_id, storage) in &config.storages {
            for (repository_id, settings) in &storage.repositories {
                let id = RepositoryId::new(storage_id, repository_id);
                let layout = layouts.get(&settings.layout).or_raise(|| ErrorKind::Layout)?;
                let backend = LocalBackend::new(id.to_string(), storage.basedir.join(repository_id))
                    .map_err(error::storage)?;
                let members = settings.members.iter().map(|member| {
                    let (storage, repository) = member.resolve(storage_id);
                    RepositoryId::new(storage, repository)
                });
                repositories.push(
                    Repository::new(id, layout, settings.kind, Arc::new(backend))
                        .with_policy(settings.policy)
                        .with_members(members),
                );
            }
        }
        let catalog = Self::from_repositories(repositories)?;
        for cycle in catalog.graph.cycles() {
            let cycle: Vec<String> = cycle.iter().map(ToString::to_string).collect();
            tracing::warn!(?cycle, "group repositories contain each other");
        }
        Ok(catalog)
    }

    fn check_members(&self, repository: &Repository) -> Result<()> {
        for member in repository.members() {
            if !self.repositories.contains_key(member) {
                exn::bail!(ErrorKind::UnknownRepository(member.to_string()));
            }
        }
        Ok(())
    }

    fn rebuild_graph(&mut self) {
        self.graph = RepositoryGraph::build(self.repositories.values().map(|repository| &**repository));
    }

    /// Add one repository. Its members must already be in the catalog.
    pub fn add_repository(&mut self, repository: Repository) -> Result<Arc<Repository>> {
        if self.repositories.contains_key(repository.id()) {
            exn::bail!(ErrorKind::DuplicateRepository(repository.id().to_string()));
        }
        self.check_members(&repository)?;
        let repository = Arc::new(repository);
        self.repositories.insert(repository.id().clone(), Arc::clone(&repository));
        self.rebuild_graph();
        tracing::info!(repository = %repository.id(), "added repository");
        Ok(repository)
    }

    /// Remove a repository that no group lists as a member.
    pub fn remove_repository(&mut self, id: &RepositoryId) -> Result<Arc<Repository>> {
        if let Some(group) = self.graph.direct_parents(id).into_iter().find(|group| group != id) {
            exn::bail!(ErrorKind::MemberInUse {
                repository: id.to_string(),
                group: group.to_string(),
            });
        }
        let Some(repository) = self.repositories.remove(id) else {
            exn::bail!(ErrorKind::UnknownRepository(id.to_string()));
        };
        self.rebuild_graph();
        tracing::info!(repository = %id, "removed repository");
        Ok(repository)
    }

    pub fn get(&self, id: &RepositoryId) -> Result<Arc<Repository>> {
        match self.repositories.get(id) {
            Some(repository) => Ok(Arc::clone(repository)),
            None => exn::bail!(ErrorKind::UnknownRepository(id.to_string())),
        }
    }

    pub fn repositories(&self) -> impl Iterator<Item = &Arc<Repository>> {
        self.repositories.values()
    }

    pub fn graph(&self) -> &RepositoryGraph {
        &self.graph
    }
}
