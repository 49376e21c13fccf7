//! Format-agnostic artifact identity.

use crate::error::{Error, ErrorKind, Result};
use crate::maven::MavenCoordinates;
use crate::npm::NpmCoordinates;
use crate::nuget::NugetCoordinates;
use crate::pypi::PypiCoordinates;
use crate::raw::RawCoordinates;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Immutable identity of one artifact file.
///
/// Each variant knows how to format itself as a repository-relative path;
/// parsing goes through the matching [`LayoutProvider`](crate::LayoutProvider).
/// Re-coordinating an artifact always builds a new value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactCoordinates {
    Maven(MavenCoordinates),
    Npm(NpmCoordinates),
    Nuget(NugetCoordinates),
    Pypi(PypiCoordinates),
    Raw(RawCoordinates),
}

impl ArtifactCoordinates {
    /// Alias of the layout these coordinates belong to.
    pub fn layout(&self) -> &'static str {
        match self {
            Self::Maven(_) => "maven",
            Self::Npm(_) => "npm",
            Self::Nuget(_) => "nuget",
            Self::Pypi(_) => "pypi",
            Self::Raw(_) => "raw",
        }
    }

    /// Version-independent identity (`groupId:artifactId`, `@scope/name`, ...).
    pub fn id(&self) -> String {
        match self {
            Self::Maven(c) => format!("{}:{}", c.group_id, c.artifact_id),
            Self::Npm(c) => c.package_name(),
            Self::Nuget(c) => c.id.clone(),
            Self::Pypi(c) => c.distribution.clone(),
            Self::Raw(c) => c.path.to_string_lossy().into_owned(),
        }
    }

    /// Artifact version; raw artifacts are unversioned.
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Maven(c) => Some(&c.version),
            Self::Npm(c) => Some(&c.version),
            Self::Nuget(c) => Some(&c.version),
            Self::Pypi(c) => Some(&c.version),
            Self::Raw(_) => None,
        }
    }

    pub fn to_path(&self) -> PathBuf {
        match self {
            Self::Maven(c) => c.to_path(),
            Self::Npm(c) => c.to_path(),
            Self::Nuget(c) => c.to_path(),
            Self::Pypi(c) => c.to_path(),
            Self::Raw(c) => c.path.clone(),
        }
    }

    /// Directory holding every version directory of this artifact; this is
    /// where the artifact-level metadata document lives.
    pub fn artifact_base(&self) -> PathBuf {
        match self {
            Self::Maven(c) => c.artifact_base(),
            Self::Npm(c) => c.artifact_base(),
            Self::Nuget(c) => PathBuf::from(&c.id),
            Self::Pypi(c) => PathBuf::from(&c.distribution),
            Self::Raw(c) => c.path.parent().map(Path::to_path_buf).unwrap_or_default(),
        }
    }

    /// Directory holding this version's files.
    pub fn version_dir(&self) -> Option<PathBuf> {
        match self {
            Self::Maven(c) => Some(c.artifact_base().join(c.base_version())),
            Self::Raw(_) => None,
            other => other.version().map(|version| other.artifact_base().join(version)),
        }
    }

    /// The coordinates as a flat key/value bag.
    pub fn coordinates(&self) -> BTreeMap<&'static str, String> {
        let mut map = BTreeMap::new();
        match self {
            Self::Maven(c) => {
                map.insert("groupId", c.group_id.clone());
                map.insert("artifactId", c.artifact_id.clone());
                map.insert("version", c.version.clone());
                map.insert("extension", c.extension.clone());
                if let Some(classifier) = &c.classifier {
                    map.insert("classifier", classifier.clone());
                }
            },
            Self::Npm(c) => {
                if let Some(scope) = &c.scope {
                    map.insert("scope", scope.clone());
                }
                map.insert("name", c.name.clone());
                map.insert("version", c.version.clone());
                map.insert("extension", c.extension.clone());
            },
            Self::Nuget(c) => {
                map.insert("id", c.id.clone());
                map.insert("version", c.version.clone());
                map.insert("type", c.kind.extension().to_string());
            },
            Self::Pypi(c) => {
                map.insert("distribution", c.distribution.clone());
                map.insert("version", c.version.clone());
                map.insert("filename", c.file_name());
                if let Some(wheel) = c.wheel_tags() {
                    if let Some(build) = &wheel.build {
                        map.insert("build", build.clone());
                    }
                    map.insert("python", wheel.python.clone());
                    map.insert("abi", wheel.abi.clone());
                    map.insert("platform", wheel.platform.clone());
                }
            },
            Self::Raw(c) => {
                map.insert("path", c.path.to_string_lossy().into_owned());
            },
        }
        map
    }
}

impl fmt::Display for ArtifactCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maven(c) => fmt::Display::fmt(c, f),
            Self::Npm(c) => write!(f, "{}@{}", c.package_name(), c.version),
            Self::Nuget(c) => write!(f, "{} {}", c.id, c.version),
            Self::Pypi(c) => write!(f, "{}=={}", c.distribution, c.version),
            Self::Raw(c) => write!(f, "{}", c.path.display()),
        }
    }
}

/// Split a relative path into UTF-8 segments, rejecting anything that is
/// not a plain file name component.
pub(crate) fn components<'a>(layout: &'static str, path: &'a Path) -> Result<Vec<&'a str>> {
    path.components()
        .map(|component| match component {
            Component::Normal(segment) => {
                segment.to_str().ok_or_else(|| Error::from(ErrorKind::parse(layout, path, "path is not valid UTF-8")))
            },
            _ => Err(Error::from(ErrorKind::parse(layout, path, "path is not a plain relative path"))),
        })
        .collect()
}
