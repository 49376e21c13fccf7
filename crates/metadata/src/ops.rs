//! Document operations: generation from a physical listing, single-version
//! edits, and merging across group members.
//!
//! Every function here is pure. Storage and locking live in
//! [`MetadataStore`](crate::MetadataStore).

use crate::error::{ErrorKind, Result};
use crate::model::{Metadata, MetadataLevel, Plugin, Snapshot, SnapshotVersion, Versioning, format_last_updated};
use depot_layout::LayoutProvider;
use depot_layout::maven::{MavenCoordinates, snapshot_build};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use time::UtcDateTime;

/// Sort ascending by the layout's ordering and drop duplicates.
pub fn sort_versions(versions: &mut Vec<String>, layout: &dyn LayoutProvider) {
    depot_layout::version::sort_versions(versions, |a, b| layout.compare_versions(a, b));
}

fn highest<'a>(versions: impl Iterator<Item = &'a String>, layout: &dyn LayoutProvider) -> Option<String> {
    versions.max_by(|a, b| layout.compare_versions(a, b)).cloned()
}

/// Recompute `latest` and `release` from the version list.
pub fn recompute_markers(versioning: &mut Versioning, layout: &dyn LayoutProvider) {
    versioning.latest = highest(versioning.versions.iter(), layout);
    versioning.release = highest(versioning.versions.iter().filter(|v| layout.is_release(v)), layout);
}

/// Build an artifact-level document from the versions found on disk.
///
/// `last_updated` should be derived from the files themselves (newest
/// modification time) so that regenerating an unchanged tree yields an
/// identical document.
pub fn generate_artifact(
    group_id: Option<&str>,
    artifact_id: &str,
    versions: impl IntoIterator<Item = String>,
    layout: &dyn LayoutProvider,
    last_updated: UtcDateTime,
) -> Metadata {
    let mut versioning = Versioning {
        versions: versions.into_iter().collect(),
        last_updated: Some(format_last_updated(last_updated)),
        ..Versioning::default()
    };
    sort_versions(&mut versioning.versions, layout);
    recompute_markers(&mut versioning, layout);
    Metadata {
        group_id: group_id.map(String::from),
        artifact_id: Some(artifact_id.to_string()),
        version: None,
        versioning: Some(versioning),
        plugins: Vec::new(),
    }
}

/// One file inside a snapshot version directory.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    pub coordinates: MavenCoordinates,
    pub modified: UtcDateTime,
}

type BuildKey = Option<(String, u32)>;

fn build_key(version: &str) -> BuildKey {
    snapshot_build(version)
}

/// Build a snapshot version-level document from the files of one
/// `X-SNAPSHOT` directory.
///
/// The newest timestamped build becomes `snapshot`; each
/// `(classifier, extension)` pair keeps its newest file. Directories that
/// only hold non-timestamped files are recorded as a local copy.
pub fn generate_snapshot(group_id: &str, artifact_id: &str, base_version: &str, files: &[SnapshotFile]) -> Metadata {
    let mut newest: BuildKey = None;
    let mut per_file: BTreeMap<(Option<String>, String), (BuildKey, UtcDateTime, String)> = BTreeMap::new();
    let mut last_updated: Option<UtcDateTime> = None;

    for file in files {
        let key = build_key(&file.coordinates.version);
        if key > newest {
            newest = key.clone();
        }
        last_updated = last_updated.max(Some(file.modified));
        let slot = (file.coordinates.classifier.clone(), file.coordinates.extension.clone());
        let candidate = (key, file.modified, file.coordinates.version.clone());
        match per_file.get(&slot) {
            Some(existing) if (&existing.0, existing.1) >= (&candidate.0, candidate.1) => {},
            _ => {
                per_file.insert(slot, candidate);
            },
        }
    }

    let snapshot = match newest {
        Some((timestamp, build_number)) => Snapshot {
            timestamp: Some(timestamp),
            build_number: Some(build_number),
            local_copy: false,
        },
        None => Snapshot { timestamp: None, build_number: None, local_copy: true },
    };
    let snapshot_versions = per_file
        .into_iter()
        .map(|((classifier, extension), (_, modified, value))| SnapshotVersion {
            classifier,
            extension,
            value,
            updated: Some(format_last_updated(modified)),
        })
        .collect();
    Metadata {
        group_id: Some(group_id.to_string()),
        artifact_id: Some(artifact_id.to_string()),
        version: Some(base_version.to_string()),
        versioning: Some(Versioning {
            last_updated: last_updated.map(format_last_updated),
            snapshot: Some(snapshot),
            snapshot_versions,
            ..Versioning::default()
        }),
        plugins: Vec::new(),
    }
}

/// Add `version` to the version list. Returns `false` if it was already
/// listed.
pub fn add_version(metadata: &mut Metadata, version: &str, layout: &dyn LayoutProvider, now: UtcDateTime) -> bool {
    let versioning = metadata.versioning.get_or_insert_with(Versioning::default);
    if versioning.versions.iter().any(|v| v == version) {
        return false;
    }
    versioning.versions.push(version.to_string());
    sort_versions(&mut versioning.versions, layout);
    recompute_markers(versioning, layout);
    versioning.last_updated = Some(format_last_updated(now));
    true
}

/// Remove `version` from the version list. Returns `false` if it was not
/// listed.
///
/// `latest` and `release` are recomputed from the remaining versions only
/// when they pointed at the removed version. Removing the last version
/// leaves an empty list.
pub fn remove_version(metadata: &mut Metadata, version: &str, layout: &dyn LayoutProvider, now: UtcDateTime) -> bool {
    let Some(versioning) = metadata.versioning.as_mut() else {
        return false;
    };
    let before = versioning.versions.len();
    versioning.versions.retain(|v| v != version);
    if versioning.versions.len() == before {
        return false;
    }
    if versioning.latest.as_deref() == Some(version) {
        versioning.latest = highest(versioning.versions.iter(), layout);
    }
    if versioning.release.as_deref() == Some(version) {
        versioning.release = highest(versioning.versions.iter().filter(|v| layout.is_release(v)), layout);
    }
    versioning.last_updated = Some(format_last_updated(now));
    true
}

fn first_some(docs: &[Metadata], field: impl Fn(&Metadata) -> Option<&String>) -> Option<String> {
    docs.iter().find_map(|doc| field(doc)).cloned()
}

fn newest_last_updated(docs: &[Metadata]) -> Option<String> {
    // Fixed-width digits: lexical order is chronological order.
    docs.iter().filter_map(Metadata::last_updated).max().map(String::from)
}

fn merge_artifacts(docs: &[Metadata], layout: &dyn LayoutProvider) -> Metadata {
    let mut versioning = Versioning {
        versions: docs.iter().flat_map(|doc| doc.versions().iter().cloned()).collect(),
        last_updated: newest_last_updated(docs),
        ..Versioning::default()
    };
    sort_versions(&mut versioning.versions, layout);
    recompute_markers(&mut versioning, layout);
    Metadata {
        group_id: first_some(docs, |doc| doc.group_id.as_ref()),
        artifact_id: first_some(docs, |doc| doc.artifact_id.as_ref()),
        version: None,
        versioning: Some(versioning),
        plugins: Vec::new(),
    }
}

fn compare_snapshots(a: &Snapshot, b: &Snapshot) -> Ordering {
    a.key().cmp(&b.key())
}

fn merge_snapshots(docs: &[Metadata]) -> Metadata {
    let versionings: Vec<&Versioning> = docs.iter().filter_map(|doc| doc.versioning.as_ref()).collect();
    // max_by keeps the last of equal elements; reverse first so the earliest
    // member wins ties.
    let snapshot = versionings
        .iter()
        .rev()
        .filter_map(|versioning| versioning.snapshot.as_ref())
        .max_by(|a, b| compare_snapshots(a, b))
        .cloned();

    let mut per_file: BTreeMap<(Option<String>, String), SnapshotVersion> = BTreeMap::new();
    for candidate in versionings.iter().flat_map(|versioning| versioning.snapshot_versions.iter()) {
        let slot = (candidate.classifier.clone(), candidate.extension.clone());
        let newer = match per_file.get(&slot) {
            Some(existing) => {
                (candidate.updated.as_deref(), build_key(&candidate.value))
                    > (existing.updated.as_deref(), build_key(&existing.value))
            },
            None => true,
        };
        if newer {
            per_file.insert(slot, candidate.clone());
        }
    }

    Metadata {
        group_id: first_some(docs, |doc| doc.group_id.as_ref()),
        artifact_id: first_some(docs, |doc| doc.artifact_id.as_ref()),
        version: first_some(docs, |doc| doc.version.as_ref()),
        versioning: Some(Versioning {
            last_updated: newest_last_updated(docs),
            snapshot,
            snapshot_versions: per_file.into_values().collect(),
            ..Versioning::default()
        }),
        plugins: Vec::new(),
    }
}

fn merge_plugins(docs: &[Metadata]) -> Metadata {
    let mut plugins: BTreeMap<&str, &Plugin> = BTreeMap::new();
    for plugin in docs.iter().flat_map(|doc| doc.plugins.iter()) {
        plugins.entry(plugin.prefix.as_str()).or_insert(plugin);
    }
    Metadata {
        group_id: first_some(docs, |doc| doc.group_id.as_ref()),
        plugins: plugins.into_values().cloned().collect(),
        ..Metadata::default()
    }
}

/// Merge the documents of every contributing member into one.
///
/// At the artifact level the result lists the union of all versions, sorted
/// by the layout's ordering, with `latest`/`release` recomputed over the
/// union rather than copied from any single member. Snapshot documents keep
/// the newest build and the newest file per `(classifier, extension)`;
/// plugin group documents union their plugins by prefix.
///
/// All documents must be of `level`; an empty slice yields an empty
/// document of that level.
pub fn merge(level: MetadataLevel, docs: &[Metadata], layout: &dyn LayoutProvider) -> Result<Metadata> {
    if let Some(other) = docs.iter().map(Metadata::level).find(|actual| *actual != level) {
        exn::bail!(ErrorKind::LevelMismatch { expected: level, actual: other });
    }
    Ok(match level {
        MetadataLevel::Artifact => merge_artifacts(docs, layout),
        MetadataLevel::SnapshotVersion => merge_snapshots(docs),
        MetadataLevel::PluginGroup => merge_plugins(docs),
    })
}
