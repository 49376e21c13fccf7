//! The per-format capability interface.

use crate::coordinates::ArtifactCoordinates;
use crate::error::{ErrorKind, Result};
use crate::version;
use depot_storage::checksum::is_checksum_file;
use std::cmp::Ordering;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use time::UtcDateTime;

/// Layout-derived attributes of a single path.
///
/// At most one of the three flags is ever set: checksum files and metadata
/// documents are never artifacts, even when their names happen to follow the
/// artifact grammar (`lib-1.0.jar.sha1`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileClass {
    pub artifact: bool,
    pub metadata: bool,
    pub checksum: bool,
}

/// Format rules for one package layout: how coordinates map to paths and
/// back, and which files are artifacts, metadata or checksums.
///
/// Implementations are registered once in a
/// [`LayoutRegistry`](crate::LayoutRegistry) and shared behind an `Arc`.
/// Every method is pure: nothing here touches storage.
pub trait LayoutProvider: Send + Sync + Debug {
    /// Registry alias (`maven`, `npm`, ...).
    fn alias(&self) -> &'static str;

    /// Parse a repository-relative path into coordinates.
    ///
    /// Fails with [`ErrorKind::Parse`] when the path does not follow the
    /// layout's grammar; such files are non-artifact content.
    fn parse(&self, path: &Path) -> Result<ArtifactCoordinates>;

    /// Format coordinates as a repository-relative path.
    fn to_path(&self, coordinates: &ArtifactCoordinates) -> Result<PathBuf> {
        if coordinates.layout() != self.alias() {
            exn::bail!(ErrorKind::WrongLayout {
                expected: self.alias(),
                actual: coordinates.layout(),
            });
        }
        Ok(coordinates.to_path())
    }

    /// Name of the artifact-level metadata document, if the layout keeps one.
    fn metadata_file_name(&self) -> Option<&'static str> {
        None
    }

    /// Whether a file name denotes a metadata document of this layout.
    fn is_metadata_file(&self, file_name: &str) -> bool {
        self.metadata_file_name().is_some_and(|name| name == file_name)
    }

    /// Classify a path using its string content only.
    fn classify(&self, path: &Path) -> FileClass {
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            return FileClass::default();
        };
        if is_checksum_file(file_name) {
            return FileClass { checksum: true, ..FileClass::default() };
        }
        if self.is_metadata_file(file_name) {
            return FileClass { metadata: true, ..FileClass::default() };
        }
        FileClass { artifact: self.parse(path).is_ok(), ..FileClass::default() }
    }

    /// Whether a metadata document last modified at `modified` should be
    /// recomputed rather than served as-is. Layouts without a TTL never
    /// expire.
    fn is_expired(&self, path: &Path, modified: UtcDateTime, now: UtcDateTime) -> bool {
        let _ = (path, modified, now);
        false
    }

    /// Layout-specific version ordering.
    fn compare_versions(&self, a: &str, b: &str) -> Ordering {
        version::compare(a, b)
    }

    /// Whether a version counts as a release (as opposed to a snapshot or
    /// pre-release) for the `release` marker.
    fn is_release(&self, version: &str) -> bool {
        !version::is_snapshot(version)
    }

    /// Whether `dir`, whose files are named `file_names`, holds one version
    /// of an artifact.
    fn is_artifact_directory(&self, dir: &Path, file_names: &[&str]) -> bool;
}
