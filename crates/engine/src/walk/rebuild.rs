use super::{Location, LocationOperation};
use crate::error::Result;
use crate::generate::MetadataGenerator;
use async_trait::async_trait;

/// Regenerates an artifact's metadata from the version directories on disk.
#[derive(Debug, Clone)]
pub struct MetadataRebuildOperation {
    generator: MetadataGenerator,
}

impl MetadataRebuildOperation {
    pub const NAME: &str = "metadata";

    pub fn new(generator: MetadataGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl LocationOperation for MetadataRebuildOperation {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, location: &Location) -> Result<()> {
        let repository = location.repository();
        for version in &location.versions {
            self.generator.snapshot_level(repository, version.relative()).await?;
        }
        self.generator.artifact_level(repository, location.base.relative()).await?;
        Ok(())
    }
}
