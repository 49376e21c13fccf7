//! Explicit alias → provider table.

use crate::error::{ErrorKind, Result};
use crate::maven::{DEFAULT_METADATA_TTL, MavenLayout};
use crate::npm::NpmLayout;
use crate::nuget::NugetLayout;
use crate::provider::LayoutProvider;
use crate::pypi::PypiLayout;
use crate::raw::RawLayout;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Shared handle to a layout provider.
pub type LayoutHandle = Arc<dyn LayoutProvider>;

/// Layout providers keyed by alias.
///
/// Built once at startup; every provider is registered explicitly and each
/// alias exactly once.
#[derive(Debug, Clone)]
pub struct LayoutRegistry {
    providers: BTreeMap<&'static str, LayoutHandle>,
}

impl LayoutRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self { providers: BTreeMap::new() }
    }

    /// All built-in layouts, with the given Maven metadata TTL.
    pub fn with_defaults(metadata_ttl: Duration) -> Self {
        let providers: [LayoutHandle; 5] = [
            Arc::new(MavenLayout::new(metadata_ttl)),
            Arc::new(NpmLayout),
            Arc::new(NugetLayout),
            Arc::new(PypiLayout),
            Arc::new(RawLayout),
        ];
        Self {
            providers: providers.into_iter().map(|provider| (provider.alias(), provider)).collect(),
        }
    }

    /// Register a provider under its alias.
    pub fn register(&mut self, provider: LayoutHandle) -> Result<()> {
        let alias = provider.alias();
        if self.providers.contains_key(alias) {
            exn::bail!(ErrorKind::DuplicateLayout(alias.to_string()));
        }
        tracing::debug!(layout = alias, "registered layout provider");
        self.providers.insert(alias, provider);
        Ok(())
    }

    /// Look up a provider by alias.
    pub fn get(&self, alias: &str) -> Result<LayoutHandle> {
        match self.providers.get(alias) {
            Some(provider) => Ok(Arc::clone(provider)),
            None => exn::bail!(ErrorKind::UnknownLayout(alias.to_string())),
        }
    }

    pub fn aliases(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.providers.keys().copied()
    }
}

impl Default for LayoutRegistry {
    fn default() -> Self {
        Self::with_defaults(DEFAULT_METADATA_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_defaults() {
        let registry = LayoutRegistry::default();
        assert_eq!(registry.aliases().collect::<Vec<_>>(), vec!["maven", "npm", "nuget", "pypi", "raw"]);
        assert_eq!(registry.get("npm").unwrap().alias(), "npm");
    }

    #[test]
    fn test_defaults_use_metadata_ttl() {
        let registry = LayoutRegistry::with_defaults(Duration::from_secs(5));
        assert_eq!(registry.aliases().count(), 5);
        let maven = registry.get("maven").unwrap();
        let now = time::UtcDateTime::now();
        let path = Path::new("com/acme/lib/maven-metadata.xml");
        assert!(maven.is_expired(path, now - time::Duration::seconds(10), now));
        assert!(!LayoutRegistry::default().get("maven").unwrap().is_expired(path, now - time::Duration::seconds(10), now));
    }

    #[test]
    fn test_unknown_layout() {
        let err = LayoutRegistry::default().get("cargo").unwrap_err();
        assert_eq!(*err, ErrorKind::UnknownLayout("cargo".to_string()));
    }

    #[test]
    fn test_duplicate_layout() {
        let mut registry = LayoutRegistry::new();
        registry.register(Arc::new(RawLayout)).unwrap();
        let err = registry.register(Arc::new(RawLayout)).unwrap_err();
        assert_eq!(*err, ErrorKind::DuplicateLayout("raw".to_string()));
    }

    #[test]
    fn test_round_trip_every_layout() {
        let registry = LayoutRegistry::default();
        let paths = [
            ("maven", "com/acme/lib/1.1/lib-1.1.pom"),
            ("npm", "@acme/ui/2.0.0/ui-2.0.0.tgz"),
            ("nuget", "Acme.Core/3.1.0/Acme.Core.3.1.0.nupkg"),
            ("pypi", "acme/0.9/acme-0.9-py3-none-any.whl"),
            ("raw", "files/readme.txt"),
        ];
        for (alias, path) in paths {
            let layout = registry.get(alias).unwrap();
            let coordinates = layout.parse(Path::new(path)).unwrap();
            assert_eq!(coordinates.layout(), alias);
            let formatted = layout.to_path(&coordinates).unwrap();
            assert_eq!(layout.parse(&formatted).unwrap(), coordinates);
        }
    }
}
