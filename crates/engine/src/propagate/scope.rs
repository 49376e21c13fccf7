//! Which metadata documents a changed path affects.

use crate::error::{self, Result};
use crate::path::RepositoryPath;
use depot_layout::version::is_snapshot;
use depot_metadata::{MetadataLevel, MetadataStore};
use depot_storage::checksum::is_checksum_file;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The artifact base whose document must be recomputed, plus the snapshot
/// version directory when its version-level document is affected too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataScope {
    pub base: PathBuf,
    pub snapshot_dir: Option<PathBuf>,
}

fn snapshot_name(path: &Path) -> bool {
    path.file_name().and_then(|name| name.to_str()).is_some_and(is_snapshot)
}

impl MetadataScope {
    /// A scope for the version directory `dir`.
    pub fn version(dir: &Path) -> Self {
        Self {
            base: dir.parent().map(Path::to_path_buf).unwrap_or_default(),
            snapshot_dir: snapshot_name(dir).then(|| dir.to_path_buf()),
        }
    }

    /// A scope covering the artifact-level document in `base` only.
    pub fn artifact(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            snapshot_dir: None,
        }
    }

    /// Documents to recompute, version level first, each with the level it
    /// must have when known up front.
    pub fn documents(&self, file_name: &str) -> Vec<(PathBuf, Option<MetadataLevel>)> {
        let mut documents = Vec::with_capacity(2);
        if let Some(dir) = &self.snapshot_dir {
            documents.push((dir.join(file_name), Some(MetadataLevel::SnapshotVersion)));
        }
        documents.push((self.base.join(file_name), None));
        documents
    }

    /// Work out what `path` affects. Must run before a deletion: a directory
    /// that is already gone is only recognised as a version directory if the
    /// artifact document still lists it.
    pub async fn resolve(path: &RepositoryPath, store: &MetadataStore) -> Result<Self> {
        // A checksum file stands for the file it checks.
        let target = path
            .file_name()
            .filter(|name| is_checksum_file(name))
            .and_then(|name| name.rsplit_once('.'))
            .map(|(target, _)| target.to_string());
        let path = match target {
            Some(target) => path.parent()?.resolve(target)?,
            None => path.clone(),
        };
        let class = path.classify();
        if class.artifact {
            let coordinates = path.coordinates()?;
            return Ok(match coordinates.version_dir() {
                Some(dir) => Self {
                    base: coordinates.artifact_base(),
                    snapshot_dir: snapshot_name(&dir).then_some(dir),
                },
                None => Self::artifact(coordinates.artifact_base()),
            });
        }
        if class.metadata {
            let dir = path.parent()?;
            return Ok(if snapshot_name(dir.relative()) {
                Self::version(dir.relative())
            } else {
                Self::artifact(dir.relative())
            });
        }
        if path.is_root() {
            return Ok(Self::artifact(PathBuf::new()));
        }

        let repository = Arc::clone(path.repository());
        let backend = repository.backend();
        let exists = path.exists().await?;
        let dir = if exists && !path.is_directory().await? { path.parent()? } else { path };
        if exists {
            let entries = backend.list_dir(dir.relative()).await.map_err(error::storage)?;
            let files: Vec<&str> = entries.iter().filter(|e| !e.is_dir()).map(|e| e.name.as_str()).collect();
            if !dir.is_root() && repository.layout().is_artifact_directory(dir.relative(), &files) {
                return Ok(Self::version(dir.relative()));
            }
            return Ok(Self::artifact(dir.relative()));
        }

        // Gone already: a version directory if the artifact document says so.
        let (Some(name), Some(file_name)) = (dir.file_name(), repository.layout().metadata_file_name()) else {
            return Ok(Self::artifact(dir.relative()));
        };
        let parent = dir.parent()?;
        let document = parent.relative().join(file_name);
        let listed = store
            .read_optional(backend, &document)
            .await
            .map_err(error::metadata)?
            .is_some_and(|metadata| metadata.versions().iter().any(|version| version == name));
        Ok(if listed { Self::version(dir.relative()) } else { Self::artifact(dir.relative()) })
    }
}
