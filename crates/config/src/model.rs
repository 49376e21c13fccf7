use crate::error::{ErrorKind, Result};
use depot_storage::ChecksumAlgorithm;
use derive_more::Display;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub metadata: MetadataConfig,
    pub storages: BTreeMap<String, StorageConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// How long a generated metadata document may be served before it is
    /// considered stale.
    pub expiry_seconds: u64,
    /// Checksum siblings written next to every stored metadata document.
    pub checksums: Vec<String>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            expiry_seconds: 60,
            checksums: vec![ChecksumAlgorithm::Sha256.to_string()],
        }
    }
}

impl MetadataConfig {
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_seconds)
    }

    pub fn checksum_algorithms(&self) -> Result<Vec<ChecksumAlgorithm>> {
        self.checksums
            .iter()
            .map(|name| name.parse::<ChecksumAlgorithm>().or_raise(|| ErrorKind::UnsupportedChecksum(name.clone())))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub basedir: PathBuf,
    #[serde(default)]
    pub repositories: BTreeMap<String, RepositoryConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Layout alias, e.g. `maven` or `npm`.
    pub layout: String,
    #[serde(default)]
    pub kind: RepositoryKind,
    #[serde(default)]
    pub policy: RepositoryPolicy,
    /// Group members in lookup order.
    #[serde(default)]
    pub members: Vec<MemberRef>,
}

impl RepositoryConfig {
    pub fn new(layout: impl Into<String>, kind: RepositoryKind) -> Self {
        Self {
            layout: layout.into(),
            kind,
            policy: RepositoryPolicy::default(),
            members: Vec::new(),
        }
    }

    pub fn with_members(mut self, members: impl IntoIterator<Item = MemberRef>) -> Self {
        self.members.extend(members);
        self
    }
}

#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    #[default]
    #[display("hosted")]
    Hosted,
    #[display("proxy")]
    Proxy,
    #[display("group")]
    Group,
}

#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryPolicy {
    #[display("release")]
    Release,
    #[display("snapshot")]
    Snapshot,
    #[default]
    #[display("mixed")]
    Mixed,
}

/// A group member: `repo` within the group's own storage, or `storage:repo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemberRef {
    pub storage: Option<String>,
    pub repository: String,
}

impl MemberRef {
    pub fn local(repository: impl Into<String>) -> Self {
        Self {
            storage: None,
            repository: repository.into(),
        }
    }

    pub fn remote(storage: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            storage: Some(storage.into()),
            repository: repository.into(),
        }
    }

    /// `(storage, repository)`, taking `default_storage` for local references.
    pub fn resolve<'a>(&'a self, default_storage: &'a str) -> (&'a str, &'a str) {
        (self.storage.as_deref().unwrap_or(default_storage), &self.repository)
    }
}

impl TryFrom<String> for MemberRef {
    type Error = ErrorKind;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let invalid = || ErrorKind::InvalidMember(value.clone());
        match value.split_once(':') {
            None if !value.is_empty() => Ok(Self::local(value.as_str())),
            Some((storage, repository))
                if !storage.is_empty() && !repository.is_empty() && !repository.contains(':') =>
            {
                Ok(Self::remote(storage, repository))
            },
            _ => Err(invalid()),
        }
    }
}

impl From<MemberRef> for String {
    fn from(member: MemberRef) -> Self {
        member.to_string()
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.storage {
            Some(storage) => write!(f, "{storage}:{}", self.repository),
            None => f.write_str(&self.repository),
        }
    }
}

impl Config {
    pub fn repository(&self, storage: &str, repository: &str) -> Option<&RepositoryConfig> {
        self.storages.get(storage)?.repositories.get(repository)
    }

    /// Check the repository graph is well formed.
    ///
    /// Cyclic group membership is accepted; the engine detects and reports it
    /// at runtime.
    pub fn validate(&self) -> Result<()> {
        self.metadata.checksum_algorithms()?;
        for (storage_id, storage) in &self.storages {
            if storage_id.is_empty() {
                exn::bail!(ErrorKind::EmptyId);
            }
            for (repository_id, repository) in &storage.repositories {
                if repository_id.is_empty() {
                    exn::bail!(ErrorKind::EmptyId);
                }
                let name = format!("{storage_id}:{repository_id}");
                if repository.kind != RepositoryKind::Group {
                    if !repository.members.is_empty() {
                        exn::bail!(ErrorKind::MembersOnNonGroup(name));
                    }
                    continue;
                }
                for member in &repository.members {
                    let (member_storage, member_id) = member.resolve(storage_id);
                    let Some(target) = self.repository(member_storage, member_id) else {
                        exn::bail!(ErrorKind::UnresolvedMember {
                            repository: name,
                            member: format!("{member_storage}:{member_id}"),
                        });
                    };
                    if target.layout != repository.layout {
                        exn::bail!(ErrorKind::LayoutMismatch {
                            group: name,
                            group_layout: repository.layout.clone(),
                            member: format!("{member_storage}:{member_id}"),
                            member_layout: target.layout.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
