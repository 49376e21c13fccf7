use super::{Location, LocationOperation};
use crate::error::{self, Result};
use crate::path::RepositoryPath;
use async_trait::async_trait;
use depot_storage::ChecksumAlgorithm;
use depot_storage::checksum::is_checksum_file;

/// Writes missing checksum siblings for every file of an artifact.
#[derive(Debug, Clone)]
pub struct ChecksumOperation {
    algorithms: Vec<ChecksumAlgorithm>,
    force: bool,
}

impl ChecksumOperation {
    pub const NAME: &str = "checksum";

    /// With `force`, existing checksum files are rewritten too.
    pub fn new(algorithms: Vec<ChecksumAlgorithm>, force: bool) -> Self {
        Self { algorithms, force }
    }

    /// Checksum the files directly inside `dir`. Returns how many checksum
    /// files were written.
    async fn directory(&self, dir: &RepositoryPath) -> Result<usize> {
        let backend = dir.repository().backend();
        let entries = backend.list_dir(dir.relative()).await.map_err(error::storage)?;
        let mut written = 0;
        for entry in entries.iter().filter(|entry| !entry.is_dir()) {
            if is_checksum_file(&entry.name) || entry.name.starts_with('.') {
                continue;
            }
            let file = dir.relative().join(&entry.name);
            let mut data = None;
            for algorithm in &self.algorithms {
                let sibling = dir.relative().join(algorithm.sibling(&entry.name));
                if !self.force && backend.exists(&sibling).await.map_err(error::storage)? {
                    continue;
                }
                let bytes = match &data {
                    Some(bytes) => bytes,
                    None => data.insert(backend.read(&file).await.map_err(error::storage)?),
                };
                backend.write(&sibling, algorithm.digest(bytes).as_bytes()).await.map_err(error::storage)?;
                written += 1;
            }
        }
        Ok(written)
    }
}

#[async_trait]
impl LocationOperation for ChecksumOperation {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, location: &Location) -> Result<()> {
        let mut written = 0;
        for version in &location.versions {
            written += self.directory(version).await?;
        }
        if !location.versions.contains(&location.base) {
            written += self.directory(&location.base).await?;
        }
        if written > 0 {
            tracing::debug!(base = %location.base, written, "wrote checksums");
        }
        Ok(())
    }
}
