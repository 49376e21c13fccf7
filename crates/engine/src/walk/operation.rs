use super::Location;
use super::checksum::ChecksumOperation;
use super::rebuild::MetadataRebuildOperation;
use super::report::ReportOperation;
use crate::error::{ErrorKind, Result};
use crate::generate::MetadataGenerator;
use async_trait::async_trait;
use depot_storage::ChecksumAlgorithm;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Work done once per artifact during a walk.
#[async_trait]
pub trait LocationOperation: Send + Sync {
    /// Short name used in logs and in the [`OperationRegistry`].
    fn name(&self) -> &str;

    async fn execute(&self, location: &Location) -> Result<()>;
}

/// A [`LocationOperation`] backed by an async closure. See [`from_fn()`].
pub struct FnOperation<F> {
    name: String,
    f: F,
}

impl<F> fmt::Debug for FnOperation<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOperation").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Wrap an async closure as a [`LocationOperation`].
///
/// ```
/// # use depot_engine::walk::{Location, from_fn};
/// let operation = from_fn("print", |location: Location| async move {
///     println!("{}", location.base);
///     Ok(())
/// });
/// ```
pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> FnOperation<F>
where
    F: Fn(Location) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    FnOperation { name: name.into(), f }
}

#[async_trait]
impl<F, Fut> LocationOperation for FnOperation<F>
where
    F: Fn(Location) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, location: &Location) -> Result<()> {
        (self.f)(location.clone()).await
    }
}

/// Shared settings handed to operation factories.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub generator: MetadataGenerator,
    pub checksums: Vec<ChecksumAlgorithm>,
    /// Overwrite output that already exists.
    pub force: bool,
}

type OperationFactory = Box<dyn Fn(&OperationContext) -> Arc<dyn LocationOperation> + Send + Sync>;

/// Walk operations by name.
#[derive(Default)]
pub struct OperationRegistry {
    factories: BTreeMap<String, OperationFactory>,
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with `checksum`, `metadata` and `report`.
    pub fn with_defaults() -> Self {
        fn checksum(ctx: &OperationContext) -> Arc<dyn LocationOperation> {
            Arc::new(ChecksumOperation::new(ctx.checksums.clone(), ctx.force))
        }
        fn metadata(ctx: &OperationContext) -> Arc<dyn LocationOperation> {
            Arc::new(MetadataRebuildOperation::new(ctx.generator.clone()))
        }
        fn report(_: &OperationContext) -> Arc<dyn LocationOperation> {
            Arc::new(ReportOperation::new())
        }

        let mut registry = Self::new();
        registry.factories.insert(ChecksumOperation::NAME.to_string(), Box::new(checksum));
        registry.factories.insert(MetadataRebuildOperation::NAME.to_string(), Box::new(metadata));
        registry.factories.insert(ReportOperation::NAME.to_string(), Box::new(report));
        registry
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&OperationContext) -> Arc<dyn LocationOperation> + Send + Sync + 'static,
    ) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            exn::bail!(ErrorKind::DuplicateOperation(name));
        }
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    pub fn create(&self, name: &str, context: &OperationContext) -> Result<Arc<dyn LocationOperation>> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory(context)),
            None => exn::bail!(ErrorKind::UnknownOperation(name.to_string())),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_metadata::MetadataStore;

    fn context() -> OperationContext {
        OperationContext {
            generator: MetadataGenerator::new(MetadataStore::default()),
            checksums: vec![ChecksumAlgorithm::Sha256],
            force: false,
        }
    }

    #[test]
    fn test_registry() {
        let mut registry = OperationRegistry::with_defaults();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["checksum", "metadata", "report"]);
        assert_eq!(registry.create("checksum", &context()).unwrap().name(), "checksum");

        let Err(err) = registry.create("reindex", &context()) else {
            panic!("reindex is not a registered operation");
        };
        assert_eq!(*err, ErrorKind::UnknownOperation("reindex".into()));

        registry
            .register("noop", |_| -> Arc<dyn LocationOperation> {
                Arc::new(from_fn("noop", |_location: Location| async { Ok(()) }))
            })
            .unwrap();
        assert_eq!(registry.create("noop", &context()).unwrap().name(), "noop");
        let err = registry
            .register("report", |_| -> Arc<dyn LocationOperation> { Arc::new(ReportOperation::new()) })
            .unwrap_err();
        assert_eq!(*err, ErrorKind::DuplicateOperation("report".into()));
    }
}
