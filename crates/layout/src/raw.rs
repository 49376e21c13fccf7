//! Raw layout: the path is the identity.

use crate::coordinates::{ArtifactCoordinates, components};
use crate::error::{ErrorKind, Result};
use crate::provider::LayoutProvider;
use depot_storage::checksum::is_checksum_file;
use std::path::{Path, PathBuf};

const ALIAS: &str = "raw";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawCoordinates {
    pub path: PathBuf,
}

impl RawCoordinates {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RawLayout;

impl LayoutProvider for RawLayout {
    fn alias(&self) -> &'static str {
        ALIAS
    }

    fn parse(&self, path: &Path) -> Result<ArtifactCoordinates> {
        let parts = components(ALIAS, path)?;
        if parts.is_empty() {
            exn::bail!(ErrorKind::parse(ALIAS, path, "empty path"));
        }
        Ok(ArtifactCoordinates::Raw(RawCoordinates::new(parts.iter().collect::<PathBuf>())))
    }

    fn is_artifact_directory(&self, _dir: &Path, file_names: &[&str]) -> bool {
        file_names.iter().any(|name| !name.starts_with('.') && !is_checksum_file(name))
    }
}
