use crate::error::{ErrorKind, Result};
use crate::path::RepositoryPath;
use depot_config::{RepositoryKind, RepositoryPolicy};
use depot_layout::LayoutHandle;
use depot_storage::{BackendHandle, StorageBackend};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// `storage:repository`, unique across the whole catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryId {
    pub storage: String,
    pub repository: String,
}

impl RepositoryId {
    pub fn new(storage: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            storage: storage.into(),
            repository: repository.into(),
        }
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.storage, self.repository)
    }
}

impl FromStr for RepositoryId {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((storage, repository)) if !storage.is_empty() && !repository.is_empty() => {
                Ok(Self::new(storage, repository))
            },
            _ => exn::bail!(ErrorKind::UnknownRepository(s.to_string())),
        }
    }
}

/// One repository: its layout, its role in the group graph and the backend
/// holding its files.
pub struct Repository {
    id: RepositoryId,
    layout: LayoutHandle,
    kind: RepositoryKind,
    policy: RepositoryPolicy,
    members: Vec<RepositoryId>,
    backend: BackendHandle,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("id", &self.id)
            .field("layout", &self.layout.alias())
            .field("kind", &self.kind)
            .field("policy", &self.policy)
            .field("members", &self.members)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl Repository {
    pub fn new(id: RepositoryId, layout: LayoutHandle, kind: RepositoryKind, backend: BackendHandle) -> Self {
        Self {
            id,
            layout,
            kind,
            policy: RepositoryPolicy::default(),
            members: Vec::new(),
            backend,
        }
    }

    pub fn with_policy(mut self, policy: RepositoryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Group members, in lookup order.
    pub fn with_members(mut self, members: impl IntoIterator<Item = RepositoryId>) -> Self {
        self.members.extend(members);
        self
    }

    pub fn id(&self) -> &RepositoryId {
        &self.id
    }

    pub fn layout(&self) -> &LayoutHandle {
        &self.layout
    }

    pub fn kind(&self) -> RepositoryKind {
        self.kind
    }

    pub fn policy(&self) -> RepositoryPolicy {
        self.policy
    }

    pub fn is_group(&self) -> bool {
        self.kind == RepositoryKind::Group
    }

    pub fn members(&self) -> &[RepositoryId] {
        &self.members
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    /// Whether `version` may be stored here under the repository policy.
    pub fn accepts_version(&self, version: &str) -> bool {
        match self.policy {
            RepositoryPolicy::Mixed => true,
            RepositoryPolicy::Release => self.layout.is_release(version),
            RepositoryPolicy::Snapshot => !self.layout.is_release(version),
        }
    }

    /// The repository root.
    pub fn root(self: &Arc<Self>) -> RepositoryPath {
        RepositoryPath::root(Arc::clone(self))
    }

    /// Resolve `relative` against the repository root.
    pub fn path(self: &Arc<Self>, relative: impl AsRef<Path>) -> Result<RepositoryPath> {
        self.root().resolve(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_layout::maven::MavenLayout;
    use depot_storage::backend::MockBackend;
    use rstest::rstest;

    fn repository(policy: RepositoryPolicy) -> Repository {
        Repository::new(
            RepositoryId::new("storage0", "releases"),
            Arc::new(MavenLayout::default()),
            RepositoryKind::Hosted,
            Arc::new(MockBackend::default()),
        )
        .with_policy(policy)
    }

    #[test]
    fn test_id_round_trip() {
        let id: RepositoryId = "storage0:releases".parse().unwrap();
        assert_eq!(id, RepositoryId::new("storage0", "releases"));
        assert_eq!(id.to_string(), "storage0:releases");
        assert!("releases".parse::<RepositoryId>().is_err());
        assert!(":releases".parse::<RepositoryId>().is_err());
    }

    #[rstest]
    #[case(RepositoryPolicy::Mixed, "1.0", true)]
    #[case(RepositoryPolicy::Mixed, "1.0-SNAPSHOT", true)]
    #[case(RepositoryPolicy::Release, "1.0", true)]
    #[case(RepositoryPolicy::Release, "1.0-SNAPSHOT", false)]
    #[case(RepositoryPolicy::Release, "1.0-20240102.030405-1", false)]
    #[case(RepositoryPolicy::Snapshot, "1.0", false)]
    #[case(RepositoryPolicy::Snapshot, "1.0-SNAPSHOT", true)]
    fn test_accepts_version(#[case] policy: RepositoryPolicy, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(repository(policy).accepts_version(version), expected);
    }
}
