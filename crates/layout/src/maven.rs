//! Maven 2 repository layout.
//!
//! ```text
//! {group/as/dirs}/{artifactId}/{baseVersion}/{artifactId}-{version}[-{classifier}].{extension}
//! ```
//!
//! Unique snapshot builds carry a timestamped version
//! (`1.0-20240102.030405-7`) inside a `1.0-SNAPSHOT` directory; the
//! coordinates keep the timestamped version and fold it back to the base
//! version when formatting the directory.

use crate::consts::{MAVEN_METADATA_REGEX, SNAPSHOT_TIMESTAMP_PREFIX_REGEX, SNAPSHOT_TIMESTAMP_REGEX};
use crate::coordinates::ArtifactCoordinates;
use crate::error::{ErrorKind, Result};
use crate::provider::LayoutProvider;
use crate::version::{self, SNAPSHOT};
use depot_storage::checksum::{CHECKSUM_EXTENSIONS, is_checksum_file};
use exn::OptionExt;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::UtcDateTime;

/// Artifact-level (and snapshot version-level) metadata document name.
pub const METADATA_FILE: &str = "maven-metadata.xml";
/// How long a metadata document is served before it is eligible for
/// recomputation.
pub const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(60);

const ALIAS: &str = "maven";

/// Extensions made of more than one dotted part.
const COMPOUND_EXTENSIONS: [&str; 4] = ["tar.gz", "tar.bz2", "tar.xz", "tar.zst"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MavenCoordinates {
    pub group_id: String,
    pub artifact_id: String,
    /// Either a base version (`1.0`, `1.0-SNAPSHOT`) or a timestamped
    /// snapshot version (`1.0-20240102.030405-7`).
    pub version: String,
    pub classifier: Option<String>,
    pub extension: String,
}

impl MavenCoordinates {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            classifier: None,
            extension: extension.into(),
        }
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    /// The version directory name: timestamped snapshots fold to `-SNAPSHOT`.
    pub fn base_version(&self) -> String {
        fold_snapshot(&self.version).unwrap_or_else(|| self.version.clone())
    }

    /// Whether this is a snapshot build, timestamped or not.
    pub fn is_snapshot(&self) -> bool {
        version::is_snapshot(&self.base_version())
    }

    /// `{group/as/dirs}/{artifactId}`
    pub fn artifact_base(&self) -> PathBuf {
        let mut path: PathBuf = self.group_id.split('.').collect();
        path.push(&self.artifact_id);
        path
    }

    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!("{}-{}-{}.{}", self.artifact_id, self.version, classifier, self.extension),
            None => format!("{}-{}.{}", self.artifact_id, self.version, self.extension),
        }
    }

    pub fn to_path(&self) -> PathBuf {
        let mut path = self.artifact_base();
        path.push(self.base_version());
        path.push(self.file_name());
        path
    }
}

impl fmt::Display for MavenCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.extension)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }
        write!(f, ":{}", self.version)
    }
}

/// Fold a timestamped snapshot version to its base version.
///
/// Returns `None` when `version` is not timestamped.
///
/// ```
/// use depot_layout::maven::fold_snapshot;
/// assert_eq!(fold_snapshot("1.0-20240102.030405-7").as_deref(), Some("1.0-SNAPSHOT"));
/// assert_eq!(fold_snapshot("1.0-SNAPSHOT"), None);
/// ```
pub fn fold_snapshot(version: &str) -> Option<String> {
    let captures = SNAPSHOT_TIMESTAMP_REGEX.captures(version)?;
    Some(format!("{}-{SNAPSHOT}", &captures[1]))
}

/// Split a timestamped snapshot version into `(timestamp, build number)`.
pub fn snapshot_build(version: &str) -> Option<(String, u32)> {
    let captures = SNAPSHOT_TIMESTAMP_REGEX.captures(version)?;
    let build_number = captures[3].parse().ok()?;
    Some((captures[2].to_string(), build_number))
}

#[derive(Debug, Clone)]
pub struct MavenLayout {
    metadata_ttl: Duration,
}

impl MavenLayout {
    pub fn new(metadata_ttl: Duration) -> Self {
        Self { metadata_ttl }
    }

    pub fn metadata_ttl(&self) -> Duration {
        self.metadata_ttl
    }
}

impl Default for MavenLayout {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_TTL)
    }
}

/// Split `{classifier}.{extension}`, matching the extension from the right: an
/// optional checksum suffix, then a compound or single extension. Whatever
/// is left is the classifier, dots included.
fn split_extension(rest: &str) -> Option<(&str, &str)> {
    let stem = match rest.rsplit_once('.') {
        Some((stem, last)) if CHECKSUM_EXTENSIONS.contains(&last) && stem.contains('.') => stem,
        _ => rest,
    };
    let extension = COMPOUND_EXTENSIONS
        .iter()
        .copied()
        .find(|compound| stem.strip_suffix(compound).is_some_and(|head| head.ends_with('.')))
        .or_else(|| stem.rsplit_once('.').map(|(_, last)| last))?;
    let classifier_len = stem.len() - extension.len() - 1;
    Some((&rest[..classifier_len], &rest[classifier_len + 1..]))
}

/// Split `{version}[-{classifier}].{extension}` once the version has been
/// matched, returning `(classifier, extension)`.
fn split_suffix<'a>(path: &Path, remainder: &'a str) -> Result<(Option<&'a str>, &'a str)> {
    let (classifier, extension) = if let Some(extension) = remainder.strip_prefix('.') {
        (None, extension)
    } else if let Some(rest) = remainder.strip_prefix('-') {
        let (classifier, extension) =
            split_extension(rest).ok_or_raise(|| ErrorKind::parse(ALIAS, path, "missing extension"))?;
        if classifier.is_empty() {
            exn::bail!(ErrorKind::parse(ALIAS, path, "empty classifier"));
        }
        (Some(classifier), extension)
    } else {
        exn::bail!(ErrorKind::parse(ALIAS, path, "file version does not match directory"));
    };
    if extension.is_empty() {
        exn::bail!(ErrorKind::parse(ALIAS, path, "missing extension"));
    }
    Ok((classifier, extension))
}

impl LayoutProvider for MavenLayout {
    fn alias(&self) -> &'static str {
        ALIAS
    }

    fn parse(&self, path: &Path) -> Result<ArtifactCoordinates> {
        let parts = crate::coordinates::components(ALIAS, path)?;
        let [group @ .., artifact_id, base_version, file_name] = parts.as_slice() else {
            exn::bail!(ErrorKind::parse(ALIAS, path, "too few path segments"));
        };
        if group.is_empty() {
            exn::bail!(ErrorKind::parse(ALIAS, path, "missing groupId"));
        }
        if MAVEN_METADATA_REGEX.is_match(file_name) {
            exn::bail!(ErrorKind::parse(ALIAS, path, "metadata document"));
        }
        let rest = file_name
            .strip_prefix(artifact_id)
            .and_then(|rest| rest.strip_prefix('-'))
            .ok_or_raise(|| ErrorKind::parse(ALIAS, path, "file name does not start with artifactId"))?;

        let timestamped = base_version
            .strip_suffix(SNAPSHOT)
            .and_then(|prefix| rest.strip_prefix(prefix))
            .and_then(|rest| SNAPSHOT_TIMESTAMP_PREFIX_REGEX.find(rest).map(|found| (rest, found.end())));
        let (version, remainder) = match timestamped {
            Some((rest, end)) => {
                let prefix = &base_version[..base_version.len() - SNAPSHOT.len()];
                (format!("{prefix}{}", &rest[..end]), &rest[end..])
            },
            None => {
                let remainder = rest
                    .strip_prefix(base_version)
                    .ok_or_raise(|| ErrorKind::parse(ALIAS, path, "file version does not match directory"))?;
                (base_version.to_string(), remainder)
            },
        };
        let (classifier, extension) = split_suffix(path, remainder)?;

        Ok(ArtifactCoordinates::Maven(MavenCoordinates {
            group_id: group.join("."),
            artifact_id: artifact_id.to_string(),
            version,
            classifier: classifier.map(String::from),
            extension: extension.to_string(),
        }))
    }

    fn metadata_file_name(&self) -> Option<&'static str> {
        Some(METADATA_FILE)
    }

    fn is_metadata_file(&self, file_name: &str) -> bool {
        MAVEN_METADATA_REGEX.is_match(file_name)
    }

    fn is_expired(&self, path: &Path, modified: UtcDateTime, now: UtcDateTime) -> bool {
        let is_metadata = path.file_name().and_then(|name| name.to_str()).is_some_and(|name| self.is_metadata_file(name));
        is_metadata && now - modified > self.metadata_ttl
    }

    fn is_release(&self, version: &str) -> bool {
        !version::is_snapshot(version) && fold_snapshot(version).is_none()
    }

    fn is_artifact_directory(&self, dir: &Path, file_names: &[&str]) -> bool {
        file_names.iter().any(|name| !is_checksum_file(name) && self.parse(&dir.join(name)).is_ok())
    }
}
