//! npm registry layout.
//!
//! ```text
//! [@{scope}/]{name}/{version}/{name}-{version}.{tgz|json}
//! ```

use crate::coordinates::{ArtifactCoordinates, components};
use crate::error::{ErrorKind, Result};
use crate::provider::LayoutProvider;
use exn::OptionExt;
use std::path::{Path, PathBuf};

const ALIAS: &str = "npm";
const EXTENSIONS: [&str; 2] = ["tgz", "json"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NpmCoordinates {
    /// Scope without the leading `@`.
    pub scope: Option<String>,
    pub name: String,
    pub version: String,
    /// `tgz` for the tarball, `json` for the version manifest.
    pub extension: String,
}

impl NpmCoordinates {
    pub fn new(
        scope: Option<&str>,
        name: impl Into<String>,
        version: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.map(String::from),
            name: name.into(),
            version: version.into(),
            extension: extension.into(),
        }
    }

    /// `@scope/name` or `name`.
    pub fn package_name(&self) -> String {
        match &self.scope {
            Some(scope) => format!("@{scope}/{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn artifact_base(&self) -> PathBuf {
        let mut path = PathBuf::new();
        if let Some(scope) = &self.scope {
            path.push(format!("@{scope}"));
        }
        path.push(&self.name);
        path
    }

    pub fn to_path(&self) -> PathBuf {
        let mut path = self.artifact_base();
        path.push(&self.version);
        path.push(format!("{}-{}.{}", self.name, self.version, self.extension));
        path
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NpmLayout;

impl LayoutProvider for NpmLayout {
    fn alias(&self) -> &'static str {
        ALIAS
    }

    fn parse(&self, path: &Path) -> Result<ArtifactCoordinates> {
        let parts = components(ALIAS, path)?;
        let (scope, name, version, file_name) = match parts.as_slice() {
            [scope, name, version, file_name] => {
                let scope = scope
                    .strip_prefix('@')
                    .filter(|scope| !scope.is_empty())
                    .ok_or_raise(|| ErrorKind::parse(ALIAS, path, "scope must start with @"))?;
                (Some(scope), *name, *version, *file_name)
            },
            [name, version, file_name] => (None, *name, *version, *file_name),
            _ => exn::bail!(ErrorKind::parse(ALIAS, path, "unexpected number of path segments")),
        };
        if name.starts_with(['@', '.', '_']) {
            exn::bail!(ErrorKind::parse(ALIAS, path, "invalid package name"));
        }
        let extension = file_name
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|rest| rest.strip_prefix(version))
            .and_then(|rest| rest.strip_prefix('.'))
            .filter(|extension| EXTENSIONS.iter().any(|known| known == extension))
            .ok_or_raise(|| ErrorKind::parse(ALIAS, path, "file name is not {name}-{version}.{tgz|json}"))?;
        Ok(ArtifactCoordinates::Npm(NpmCoordinates::new(scope, name, version, extension)))
    }

    fn is_release(&self, version: &str) -> bool {
        // Semver pre-release identifiers follow a hyphen; build metadata
        // follows a plus and does not make a version a pre-release.
        let core = version.split_once('+').map_or(version, |(core, _)| core);
        !core.contains('-')
    }

    fn is_artifact_directory(&self, _dir: &Path, file_names: &[&str]) -> bool {
        file_names.iter().any(|name| name.ends_with(".tgz") || *name == "package.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("left-pad/1.3.0/left-pad-1.3.0.tgz", None, "left-pad", "1.3.0", "tgz")]
    #[case("@types/node/20.1.0/node-20.1.0.tgz", Some("types"), "node", "20.1.0", "tgz")]
    #[case("react/19.0.0-rc.1/react-19.0.0-rc.1.json", None, "react", "19.0.0-rc.1", "json")]
    fn test_parse(
        #[case] path: &str,
        #[case] scope: Option<&str>,
        #[case] name: &str,
        #[case] version: &str,
        #[case] extension: &str,
    ) {
        let parsed = NpmLayout.parse(Path::new(path)).unwrap();
        assert_eq!(parsed, ArtifactCoordinates::Npm(NpmCoordinates::new(scope, name, version, extension)));
        assert_eq!(parsed.to_path(), PathBuf::from(path));
    }

    #[rstest]
    #[case("left-pad/1.3.0/left-pad-1.3.1.tgz")]
    #[case("left-pad/1.3.0/left-pad-1.3.0.zip")]
    #[case("types/node/20.1.0/node-20.1.0.tgz")]
    #[case("left-pad/1.3.0/package.json")]
    #[case("left-pad-1.3.0.tgz")]
    fn test_parse_rejects(#[case] path: &str) {
        assert!(NpmLayout.parse(Path::new(path)).is_err(), "{path}");
    }

    #[rstest]
    #[case(NpmCoordinates::new(None, "lodash", "4.17.21", "tgz"))]
    #[case(NpmCoordinates::new(Some("babel"), "core", "7.24.0-beta.2", "json"))]
    fn test_round_trip(#[case] coordinates: NpmCoordinates) {
        let coordinates = ArtifactCoordinates::Npm(coordinates);
        let path = NpmLayout.to_path(&coordinates).unwrap();
        assert_eq!(NpmLayout.parse(&path).unwrap(), coordinates);
    }

    #[rstest]
    #[case("1.0.0", true)]
    #[case("1.0.0+build.5", true)]
    #[case("1.0.0-beta.1", false)]
    fn test_is_release(#[case] version: &str, #[case] expected: bool) {
        assert_eq!(NpmLayout.is_release(version), expected);
    }

    #[test]
    fn test_wrong_layout() {
        let coordinates = ArtifactCoordinates::Raw(crate::raw::RawCoordinates::new("a/b"));
        let err = NpmLayout.to_path(&coordinates).unwrap_err();
        assert_eq!(*err, ErrorKind::WrongLayout { expected: "npm", actual: "raw" });
    }
}
