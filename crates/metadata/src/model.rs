//! The metadata document model.
//!
//! Mirrors `maven-metadata.xml`, which doubles as the aggregation record for
//! every layout that keeps metadata at all. Fields are optional wherever the
//! on-disk document may legitimately omit them.

use derive_more::Display;
use time::UtcDateTime;

/// Which tree level a document describes.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataLevel {
    /// `{artifact}/{X-SNAPSHOT}/maven-metadata.xml`: snapshot build info.
    #[display("snapshot version")]
    SnapshotVersion,
    /// `{artifact}/maven-metadata.xml`: version list, latest and release.
    #[display("artifact")]
    Artifact,
    /// `{group}/maven-metadata.xml`: plugin prefixes.
    #[display("plugin group")]
    PluginGroup,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    /// Only set on snapshot version-level documents.
    pub version: Option<String>,
    pub versioning: Option<Versioning>,
    pub plugins: Vec<Plugin>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Versioning {
    pub latest: Option<String>,
    pub release: Option<String>,
    /// Ascending by the layout's version ordering. Empty, never absent, once
    /// the last version is removed.
    pub versions: Vec<String>,
    /// `yyyyMMddHHmmss`, UTC.
    pub last_updated: Option<String>,
    pub snapshot: Option<Snapshot>,
    pub snapshot_versions: Vec<SnapshotVersion>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// `yyyyMMdd.HHmmss`, UTC.
    pub timestamp: Option<String>,
    pub build_number: Option<u32>,
    pub local_copy: bool,
}

impl Snapshot {
    /// Ordering key: newest timestamp, then highest build number.
    pub(crate) fn key(&self) -> (Option<&str>, Option<u32>) {
        (self.timestamp.as_deref(), self.build_number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotVersion {
    pub classifier: Option<String>,
    pub extension: String,
    /// Concrete (usually timestamped) version of this file.
    pub value: String,
    /// `yyyyMMddHHmmss`, UTC.
    pub updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    pub name: Option<String>,
    pub prefix: String,
    pub artifact_id: String,
}

impl Metadata {
    /// The level this document describes, judged from its content.
    pub fn level(&self) -> MetadataLevel {
        let is_snapshot_doc = self.versioning.as_ref().is_some_and(|versioning| {
            versioning.snapshot.is_some() || !versioning.snapshot_versions.is_empty()
        });
        if self.version.is_some() && is_snapshot_doc {
            MetadataLevel::SnapshotVersion
        } else if self.artifact_id.is_none() && !self.plugins.is_empty() {
            MetadataLevel::PluginGroup
        } else {
            MetadataLevel::Artifact
        }
    }

    /// Versions listed in the document; empty when there is no versioning.
    pub fn versions(&self) -> &[String] {
        self.versioning.as_ref().map_or(&[], |versioning| versioning.versions.as_slice())
    }

    pub fn latest(&self) -> Option<&str> {
        self.versioning.as_ref().and_then(|versioning| versioning.latest.as_deref())
    }

    pub fn release(&self) -> Option<&str> {
        self.versioning.as_ref().and_then(|versioning| versioning.release.as_deref())
    }

    pub fn last_updated(&self) -> Option<&str> {
        self.versioning.as_ref().and_then(|versioning| versioning.last_updated.as_deref())
    }
}

/// `yyyyMMddHHmmss`, the format of `lastUpdated` and `updated`.
pub fn format_last_updated(at: UtcDateTime) -> String {
    format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

/// `yyyyMMdd.HHmmss`, the format of snapshot timestamps.
pub fn format_snapshot_timestamp(at: UtcDateTime) -> String {
    format!(
        "{:04}{:02}{:02}.{:02}{:02}{:02}",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_formats() {
        // 2024-01-02T03:04:05Z
        let at = UtcDateTime::from_unix_timestamp(1_704_164_645).unwrap();
        assert_eq!(format_last_updated(at), "20240102030405");
        assert_eq!(format_snapshot_timestamp(at), "20240102.030405");
    }

    #[test]
    fn test_level() {
        let artifact = Metadata {
            artifact_id: Some("lib".into()),
            versioning: Some(Versioning::default()),
            ..Metadata::default()
        };
        assert_eq!(artifact.level(), MetadataLevel::Artifact);

        let snapshot = Metadata {
            version: Some("1.0-SNAPSHOT".into()),
            versioning: Some(Versioning {
                snapshot: Some(Snapshot { local_copy: true, ..Snapshot::default() }),
                ..Versioning::default()
            }),
            ..artifact.clone()
        };
        assert_eq!(snapshot.level(), MetadataLevel::SnapshotVersion);

        let plugins = Metadata {
            plugins: vec![Plugin {
                name: None,
                prefix: "acme".into(),
                artifact_id: "acme-maven-plugin".into(),
            }],
            ..Metadata::default()
        };
        assert_eq!(plugins.level(), MetadataLevel::PluginGroup);
        assert!(plugins.versions().is_empty());
    }
}
