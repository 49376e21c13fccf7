//! NuGet v3 flat-container layout.
//!
//! ```text
//! {id}/{version}/{id}.{version}.nupkg
//! {id}/{version}/{id}.nuspec
//! ```

use crate::coordinates::{ArtifactCoordinates, components};
use crate::error::{ErrorKind, Result};
use crate::provider::LayoutProvider;
use std::path::{Path, PathBuf};

const ALIAS: &str = "nuget";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NugetFileKind {
    Package,
    Nuspec,
}

impl NugetFileKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Package => "nupkg",
            Self::Nuspec => "nuspec",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NugetCoordinates {
    pub id: String,
    pub version: String,
    pub kind: NugetFileKind,
}

impl NugetCoordinates {
    pub fn new(id: impl Into<String>, version: impl Into<String>, kind: NugetFileKind) -> Self {
        Self { id: id.into(), version: version.into(), kind }
    }

    pub fn file_name(&self) -> String {
        match self.kind {
            NugetFileKind::Package => format!("{}.{}.nupkg", self.id, self.version),
            NugetFileKind::Nuspec => format!("{}.nuspec", self.id),
        }
    }

    pub fn to_path(&self) -> PathBuf {
        [self.id.as_str(), self.version.as_str(), self.file_name().as_str()].iter().collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NugetLayout;

impl LayoutProvider for NugetLayout {
    fn alias(&self) -> &'static str {
        ALIAS
    }

    fn parse(&self, path: &Path) -> Result<ArtifactCoordinates> {
        let parts = components(ALIAS, path)?;
        let [id, version, file_name] = parts.as_slice() else {
            exn::bail!(ErrorKind::parse(ALIAS, path, "expected {id}/{version}/{file}"));
        };
        let kind = if *file_name == format!("{id}.nuspec") {
            NugetFileKind::Nuspec
        } else if *file_name == format!("{id}.{version}.nupkg") {
            NugetFileKind::Package
        } else {
            exn::bail!(ErrorKind::parse(ALIAS, path, "file is neither {id}.{version}.nupkg nor {id}.nuspec"));
        };
        Ok(ArtifactCoordinates::Nuget(NugetCoordinates::new(*id, *version, kind)))
    }

    fn is_release(&self, version: &str) -> bool {
        !version.contains('-')
    }

    fn is_artifact_directory(&self, _dir: &Path, file_names: &[&str]) -> bool {
        file_names.iter().any(|name| name.ends_with(".nupkg") || name.ends_with(".nuspec"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Newtonsoft.Json/13.0.3/Newtonsoft.Json.13.0.3.nupkg", "Newtonsoft.Json", "13.0.3", NugetFileKind::Package)]
    #[case("Newtonsoft.Json/13.0.3/Newtonsoft.Json.nuspec", "Newtonsoft.Json", "13.0.3", NugetFileKind::Nuspec)]
    #[case("serilog/4.0.0-dev-02108/serilog.4.0.0-dev-02108.nupkg", "serilog", "4.0.0-dev-02108", NugetFileKind::Package)]
    fn test_parse(#[case] path: &str, #[case] id: &str, #[case] version: &str, #[case] kind: NugetFileKind) {
        let parsed = NugetLayout.parse(Path::new(path)).unwrap();
        assert_eq!(parsed, ArtifactCoordinates::Nuget(NugetCoordinates::new(id, version, kind)));
        assert_eq!(parsed.to_path(), PathBuf::from(path));
    }

    #[rstest]
    #[case("Newtonsoft.Json/13.0.3/Newtonsoft.Json.13.0.2.nupkg")]
    #[case("Newtonsoft.Json/13.0.3/Other.nuspec")]
    #[case("Newtonsoft.Json/Newtonsoft.Json.nuspec")]
    fn test_parse_rejects(#[case] path: &str) {
        assert!(NugetLayout.parse(Path::new(path)).is_err(), "{path}");
    }

    #[test]
    fn test_classify() {
        let class = NugetLayout.classify(Path::new("a/1.0/a.1.0.nupkg.sha512"));
        assert!(class.checksum && !class.artifact);
        let class = NugetLayout.classify(Path::new("a/1.0/a.1.0.nupkg"));
        assert!(class.artifact && !class.metadata);
    }
}
