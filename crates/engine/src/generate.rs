//! Regenerating a repository's own metadata from what is on disk.

use crate::error::{self, Result};
use crate::repository::Repository;
use depot_layout::ArtifactCoordinates;
use depot_layout::version::is_snapshot;
use depot_metadata::model::format_last_updated;
use depot_metadata::ops::{self, SnapshotFile};
use depot_metadata::{Metadata, MetadataLevel, MetadataStore};
use std::collections::BTreeSet;
use std::path::Path;
use time::UtcDateTime;

/// Same document apart from when it was generated.
fn same_content(a: &Metadata, b: &Metadata) -> bool {
    let strip = |doc: &Metadata| {
        let mut doc = doc.clone();
        if let Some(versioning) = doc.versioning.as_mut() {
            versioning.last_updated = None;
        }
        doc
    };
    strip(a) == strip(b)
}

/// Files exactly `depth` levels below `dir`.
fn at_depth(dir: &Path, path: &Path, depth: usize) -> bool {
    path.strip_prefix(dir).is_ok_and(|rest| rest.components().count() == depth)
}

/// Writes hosted metadata documents derived from the physical file tree.
#[derive(Debug, Clone)]
pub struct MetadataGenerator {
    store: MetadataStore,
}

impl MetadataGenerator {
    pub fn new(store: MetadataStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Rebuild the artifact-level document in `base` from its version
    /// directories.
    ///
    /// A document whose versions are unchanged is kept as-is, so repeated
    /// runs over an unchanged tree write nothing. When every version is gone
    /// an existing document is kept with an empty version list. Returns
    /// `None` for layouts without metadata, or when there is neither a
    /// version nor a document.
    pub async fn artifact_level(&self, repository: &Repository, base: &Path) -> Result<Option<Metadata>> {
        let layout = repository.layout();
        let Some(file_name) = layout.metadata_file_name() else {
            return Ok(None);
        };
        let backend = repository.backend();
        let document = base.join(file_name);

        // Listed under the document lock, so a store or delete that finished
        // before the lock was taken is always part of the listing.
        let _lock = self.store.lock(backend, &document).await;
        let files = backend.list(Some(base)).await.map_err(error::storage)?;
        let mut versions = BTreeSet::new();
        let mut ids = None;
        for file in files.iter().filter(|file| at_depth(base, &file.path, 2)) {
            if !layout.classify(&file.path).artifact {
                continue;
            }
            let Ok(coordinates) = layout.parse(&file.path) else {
                continue;
            };
            if coordinates.artifact_base() != base {
                continue;
            }
            let Some(version) = coordinates.version_dir().and_then(|dir| dir.file_name()?.to_str().map(String::from))
            else {
                continue;
            };
            versions.insert(version);
            if ids.is_none() {
                ids = Some(match &coordinates {
                    ArtifactCoordinates::Maven(c) => (Some(c.group_id.clone()), c.artifact_id.clone()),
                    other => (None, other.id()),
                });
            }
        }

        let existing = self.store.read_optional(backend, &document).await.map_err(error::metadata)?;
        let now = UtcDateTime::now();

        let metadata = match (ids, existing) {
            (None, None) => return Ok(None),
            (None, Some(mut metadata)) => {
                if let Some(versioning) = metadata.versioning.as_mut()
                    && !versioning.versions.is_empty()
                {
                    versioning.versions.clear();
                    versioning.latest = None;
                    versioning.release = None;
                    versioning.last_updated = Some(format_last_updated(now));
                }
                metadata
            },
            (Some((group_id, artifact_id)), existing) => {
                let generated = ops::generate_artifact(group_id.as_deref(), &artifact_id, versions, &**layout, now);
                match existing {
                    Some(existing) if same_content(&existing, &generated) => existing,
                    _ => generated,
                }
            },
        };
        let level = metadata.level();
        if self.store.store(backend, &document, &metadata, level).await.map_err(error::metadata)? {
            tracing::debug!(repository = %repository.id(), path = %document.display(), versions = metadata.versions().len(), "regenerated metadata");
        }
        Ok(Some(metadata))
    }

    /// Rebuild the version-level document of one `X-SNAPSHOT` directory,
    /// deleting it once the directory holds no snapshot files.
    ///
    /// Release version directories have no version-level document; returns
    /// `None` for them.
    pub async fn snapshot_level(&self, repository: &Repository, version_dir: &Path) -> Result<Option<Metadata>> {
        let layout = repository.layout();
        let Some(file_name) = layout.metadata_file_name() else {
            return Ok(None);
        };
        let Some(base_version) = version_dir.file_name().and_then(|name| name.to_str()) else {
            return Ok(None);
        };
        if !is_snapshot(base_version) {
            return Ok(None);
        }
        let backend = repository.backend();
        let document = version_dir.join(file_name);

        let _lock = self.store.lock(backend, &document).await;
        let files = backend.list(Some(version_dir)).await.map_err(error::storage)?;
        let snapshot_files: Vec<SnapshotFile> = files
            .iter()
            .filter(|file| at_depth(version_dir, &file.path, 1) && layout.classify(&file.path).artifact)
            .filter_map(|file| match layout.parse(&file.path) {
                Ok(ArtifactCoordinates::Maven(coordinates)) if coordinates.base_version() == base_version => {
                    Some(SnapshotFile {
                        coordinates,
                        modified: file.modified,
                    })
                },
                _ => None,
            })
            .collect();

        let Some(first) = snapshot_files.first() else {
            if self.store.delete(backend, &document).await.map_err(error::metadata)? {
                tracing::debug!(repository = %repository.id(), path = %document.display(), "removed snapshot metadata");
            }
            return Ok(None);
        };
        let metadata = ops::generate_snapshot(
            &first.coordinates.group_id,
            &first.coordinates.artifact_id,
            base_version,
            &snapshot_files,
        );
        self.store
            .store(backend, &document, &metadata, MetadataLevel::SnapshotVersion)
            .await
            .map_err(error::metadata)?;
        Ok(Some(metadata))
    }
}
