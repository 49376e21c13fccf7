//! PyPI layout.
//!
//! ```text
//! {distribution}/{version}/{dist}-{version}[-{build}]-{python}-{abi}-{platform}.whl
//! {distribution}/{version}/{distribution}-{version}.{tar.gz|zip}
//! ```
//!
//! Wheel file names escape `-` in the distribution name as `_`.

use crate::consts::PYPI_PRERELEASE_REGEX;
use crate::coordinates::{ArtifactCoordinates, components};
use crate::error::{ErrorKind, Result};
use crate::provider::LayoutProvider;
use exn::OptionExt;
use std::path::{Path, PathBuf};

const ALIAS: &str = "pypi";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WheelTags {
    /// Optional build tag; always starts with a digit.
    pub build: Option<String>,
    pub python: String,
    pub abi: String,
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PypiPackage {
    Wheel(WheelTags),
    SdistTarGz,
    SdistZip,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PypiCoordinates {
    pub distribution: String,
    pub version: String,
    pub package: PypiPackage,
}

fn wheel_escape(distribution: &str) -> String {
    distribution.replace('-', "_")
}

impl PypiCoordinates {
    pub fn sdist(distribution: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            distribution: distribution.into(),
            version: version.into(),
            package: PypiPackage::SdistTarGz,
        }
    }

    pub fn wheel(distribution: impl Into<String>, version: impl Into<String>, tags: WheelTags) -> Self {
        Self {
            distribution: distribution.into(),
            version: version.into(),
            package: PypiPackage::Wheel(tags),
        }
    }

    pub fn wheel_tags(&self) -> Option<&WheelTags> {
        match &self.package {
            PypiPackage::Wheel(tags) => Some(tags),
            _ => None,
        }
    }

    pub fn file_name(&self) -> String {
        match &self.package {
            PypiPackage::Wheel(tags) => {
                let mut name = format!("{}-{}", wheel_escape(&self.distribution), self.version);
                if let Some(build) = &tags.build {
                    name.push('-');
                    name.push_str(build);
                }
                format!("{name}-{}-{}-{}.whl", tags.python, tags.abi, tags.platform)
            },
            PypiPackage::SdistTarGz => format!("{}-{}.tar.gz", self.distribution, self.version),
            PypiPackage::SdistZip => format!("{}-{}.zip", self.distribution, self.version),
        }
    }

    pub fn to_path(&self) -> PathBuf {
        [self.distribution.as_str(), self.version.as_str(), self.file_name().as_str()].iter().collect()
    }
}

fn parse_wheel(path: &Path, tags: &str) -> Result<WheelTags> {
    let parts: Vec<&str> = tags.split('-').collect();
    let (build, python, abi, platform) = match parts.as_slice() {
        [python, abi, platform] => (None, python, abi, platform),
        [build, python, abi, platform] if build.starts_with(|c: char| c.is_ascii_digit()) => {
            (Some(build.to_string()), python, abi, platform)
        },
        _ => exn::bail!(ErrorKind::parse(ALIAS, path, "malformed wheel tags")),
    };
    if [python, abi, platform].iter().any(|tag| tag.is_empty()) {
        exn::bail!(ErrorKind::parse(ALIAS, path, "empty wheel tag"));
    }
    Ok(WheelTags {
        build,
        python: python.to_string(),
        abi: abi.to_string(),
        platform: platform.to_string(),
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PypiLayout;

impl LayoutProvider for PypiLayout {
    fn alias(&self) -> &'static str {
        ALIAS
    }

    fn parse(&self, path: &Path) -> Result<ArtifactCoordinates> {
        let parts = components(ALIAS, path)?;
        let [distribution, version, file_name] = parts.as_slice() else {
            exn::bail!(ErrorKind::parse(ALIAS, path, "expected {distribution}/{version}/{file}"));
        };
        let package = if let Some(stem) = file_name.strip_suffix(".whl") {
            let tags = stem
                .strip_prefix(wheel_escape(distribution).as_str())
                .and_then(|rest| rest.strip_prefix('-'))
                .and_then(|rest| rest.strip_prefix(version))
                .and_then(|rest| rest.strip_prefix('-'))
                .ok_or_raise(|| ErrorKind::parse(ALIAS, path, "wheel does not match distribution/version"))?;
            PypiPackage::Wheel(parse_wheel(path, tags)?)
        } else {
            let sdist = format!("{distribution}-{version}");
            match file_name.strip_prefix(sdist.as_str()) {
                Some(".tar.gz") => PypiPackage::SdistTarGz,
                Some(".zip") => PypiPackage::SdistZip,
                _ => exn::bail!(ErrorKind::parse(ALIAS, path, "not a wheel or sdist")),
            }
        };
        Ok(ArtifactCoordinates::Pypi(PypiCoordinates {
            distribution: distribution.to_string(),
            version: version.to_string(),
            package,
        }))
    }

    fn is_release(&self, version: &str) -> bool {
        !PYPI_PRERELEASE_REGEX.is_match(version)
    }

    fn is_artifact_directory(&self, _dir: &Path, file_names: &[&str]) -> bool {
        file_names
            .iter()
            .any(|name| name.ends_with(".whl") || name.ends_with(".tar.gz") || name.ends_with(".zip"))
    }
}
