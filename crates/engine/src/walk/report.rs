use super::{Location, LocationOperation};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Records each artifact and its versions without changing anything.
#[derive(Debug, Default)]
pub struct ReportOperation {
    entries: DashMap<PathBuf, Vec<String>>,
}

impl ReportOperation {
    pub const NAME: &str = "report";

    pub fn new() -> Self {
        Self::default()
    }

    /// Artifact base to version names, sorted by base.
    pub fn entries(&self) -> BTreeMap<PathBuf, Vec<String>> {
        self.entries.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect()
    }
}

#[async_trait]
impl LocationOperation for ReportOperation {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, location: &Location) -> Result<()> {
        let versions = location.version_names();
        tracing::info!(base = %location.base, ?versions, "artifact");
        self.entries.insert(location.base.relative().to_path_buf(), versions);
        Ok(())
    }
}
