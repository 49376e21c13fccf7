//! Artifact tree traversal.
//!
//! [`DirectoryWalker`] visits a repository depth first and calls one
//! [`LocationOperation`] per artifact, not per file: the first version
//! directory found below an artifact base triggers the operation with every
//! version directory of that base, and the remaining siblings are then
//! skipped.
//!
//! Skipping relies on a map from artifact base to the version directories
//! already handled under it. Entries are evicted as soon as the walk leaves
//! their subtree, so the map never holds more than one entry per level of the
//! current path.

mod checksum;
pub mod error;
mod operation;
mod rebuild;
mod report;

pub use self::checksum::ChecksumOperation;
pub use self::operation::{FnOperation, LocationOperation, OperationContext, OperationRegistry, from_fn};
pub use self::rebuild::MetadataRebuildOperation;
pub use self::report::ReportOperation;
use self::error::{Error, ErrorKind, Result};
use crate::error::{self as engine_error, Error as EngineError};
use crate::path::RepositoryPath;
use crate::repository::{Repository, RepositoryId};
use async_stream::stream;
use futures::{Stream, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One artifact: its base directory and every version directory below it.
///
/// A repository root holding artifact files directly is its own base and its
/// only version directory.
#[derive(Debug, Clone)]
pub struct Location {
    pub base: RepositoryPath,
    pub versions: Vec<RepositoryPath>,
}

impl Location {
    pub fn repository(&self) -> &Arc<Repository> {
        self.base.repository()
    }

    /// Final component of each version directory.
    pub fn version_names(&self) -> Vec<String> {
        self.versions.iter().filter_map(|version| version.file_name().map(String::from)).collect()
    }
}

/// Progress events emitted by [`DirectoryWalker::events()`].
///
/// [`Started`](Self::Started) comes first; the stream ends with
/// [`Complete`](Self::Complete), [`Cancelled`](Self::Cancelled), or a fatal
/// error. Per-directory failures are yielded as `Err` items and the walk
/// continues.
#[derive(Debug)]
pub enum WalkEvent {
    Started { repository: RepositoryId, start: PathBuf },
    /// The operation ran for this location. `tracked_roots` is the size of
    /// the visited map at that point.
    Visited { location: Location, tracked_roots: usize },
    /// A version directory already handled with its siblings.
    Skipped(PathBuf),
    Cancelled,
    Complete,
}

#[derive(Debug, Default)]
pub struct WalkReport {
    /// Version directories reached, whether visited or skipped.
    pub directories: usize,
    /// Operation invocations.
    pub locations: usize,
    /// Version directories skipped because a sibling already covered them.
    pub skipped: usize,
    /// Largest number of bases tracked at once.
    pub peak_tracked_roots: usize,
    pub failures: Vec<Error>,
    pub cancelled: bool,
}

impl WalkReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

fn raise(err: EngineError, kind: ErrorKind) -> Error {
    if err.is_fatal() { err.raise(ErrorKind::StorageUnavailable) } else { err.raise(kind) }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryWalker;

impl DirectoryWalker {
    pub fn new() -> Self {
        Self
    }

    /// Subdirectories of `base` that qualify as version directories, sorted.
    async fn version_directories(base: &RepositoryPath) -> engine_error::Result<Vec<RepositoryPath>> {
        let repository = base.repository();
        let backend = repository.backend();
        let mut versions = Vec::new();
        for entry in backend.list_dir(base.relative()).await.map_err(engine_error::storage)? {
            if !entry.is_dir() {
                continue;
            }
            let candidate = base.resolve(&entry.name)?;
            let files = backend.list_dir(candidate.relative()).await.map_err(engine_error::storage)?;
            let names: Vec<&str> = files.iter().filter(|f| !f.is_dir()).map(|f| f.name.as_str()).collect();
            if repository.layout().is_artifact_directory(candidate.relative(), &names) {
                versions.push(candidate);
            }
        }
        Ok(versions)
    }

    /// Walk the tree below `start`, yielding progress as it goes.
    pub fn events<'a>(
        &'a self,
        start: RepositoryPath,
        operation: &'a dyn LocationOperation,
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = Result<WalkEvent>> + 'a {
        stream! {
            let repository = Arc::clone(start.repository());
            let layout = Arc::clone(repository.layout());
            yield Ok(WalkEvent::Started {
                repository: repository.id().clone(),
                start: start.relative().to_path_buf(),
            });

            let mut visited: BTreeMap<PathBuf, BTreeSet<PathBuf>> = BTreeMap::new();
            let mut pending = vec![start];
            while let Some(dir) = pending.pop() {
                if cancel.is_cancelled() {
                    tracing::info!(repository = %repository.id(), "walk cancelled");
                    yield Ok(WalkEvent::Cancelled);
                    return;
                }

                let entries = match repository.backend().list_dir(dir.relative()).await {
                    Ok(entries) => entries,
                    Err(err) => {
                        let err = raise(engine_error::storage(err), ErrorKind::List(dir.relative().to_path_buf()));
                        let fatal = err.is_fatal();
                        yield Err(err);
                        if fatal {
                            return;
                        }
                        continue;
                    },
                };
                // Reverse so that the stack pops children in name order.
                for entry in entries.iter().rev().filter(|entry| entry.is_dir()) {
                    if let Ok(child) = dir.resolve(&entry.name) {
                        pending.push(child);
                    }
                }
                let files: Vec<&str> = entries.iter().filter(|e| !e.is_dir()).map(|e| e.name.as_str()).collect();
                if !layout.is_artifact_directory(dir.relative(), &files) {
                    continue;
                }

                let base = dir.parent().unwrap_or_else(|_| dir.clone());
                if visited.get(base.relative()).is_some_and(|done| done.contains(dir.relative())) {
                    yield Ok(WalkEvent::Skipped(dir.relative().to_path_buf()));
                    continue;
                }
                visited.retain(|root, _| dir.relative().starts_with(root));

                let versions = if base == dir {
                    vec![dir.clone()]
                } else {
                    match Self::version_directories(&base).await {
                        Ok(versions) => versions,
                        Err(err) => {
                            let err = raise(err, ErrorKind::List(base.relative().to_path_buf()));
                            let fatal = err.is_fatal();
                            yield Err(err);
                            if fatal {
                                return;
                            }
                            continue;
                        },
                    }
                };
                visited.insert(
                    base.relative().to_path_buf(),
                    versions.iter().map(|version| version.relative().to_path_buf()).collect(),
                );

                let location = Location { base, versions };
                match operation.execute(&location).await {
                    Ok(()) => yield Ok(WalkEvent::Visited { location, tracked_roots: visited.len() }),
                    Err(err) => {
                        let path = location.base.relative().to_path_buf();
                        let err = raise(err, ErrorKind::Operation { operation: operation.name().to_string(), path });
                        let fatal = err.is_fatal();
                        yield Err(err);
                        if fatal {
                            return;
                        }
                    },
                }
            }
            yield Ok(WalkEvent::Complete);
        }
    }

    /// Walk the tree below `start` and summarise the run.
    ///
    /// Failures on individual directories are logged and collected in the
    /// report; only an unreachable backend aborts the walk with an error.
    #[tracing::instrument(skip_all, fields(repository = %start.repository().id(), start = %start.relative().display(), operation = operation.name()))]
    pub async fn run(
        &self,
        start: &RepositoryPath,
        operation: &dyn LocationOperation,
        cancel: &CancellationToken,
    ) -> Result<WalkReport> {
        let events = self.events(start.clone(), operation, cancel);
        futures::pin_mut!(events);
        let mut report = WalkReport::default();
        while let Some(event) = events.next().await {
            match event {
                Ok(WalkEvent::Started { .. }) => tracing::debug!("walk started"),
                Ok(WalkEvent::Visited { location, tracked_roots }) => {
                    report.directories += 1;
                    report.locations += 1;
                    report.peak_tracked_roots = report.peak_tracked_roots.max(tracked_roots);
                    tracing::debug!(base = %location.base.relative().display(), versions = location.versions.len(), "visited");
                },
                Ok(WalkEvent::Skipped(path)) => {
                    report.directories += 1;
                    report.skipped += 1;
                    tracing::trace!(path = %path.display(), "already visited");
                },
                Ok(WalkEvent::Cancelled) => report.cancelled = true,
                Ok(WalkEvent::Complete) => {},
                Err(err) if err.is_fatal() => {
                    tracing::error!(error = %err, "walk aborted");
                    return Err(err);
                },
                Err(err) => {
                    tracing::warn!(error = %err, "walk failure, continuing");
                    report.failures.push(err);
                },
            }
        }
        tracing::info!(
            locations = report.locations,
            skipped = report.skipped,
            failures = report.failures.len(),
            cancelled = report.cancelled,
            "walk finished"
        );
        Ok(report)
    }
}

/// Resolve `start` in `repository` and walk it.
pub async fn walk(
    repository: &Arc<Repository>,
    start: impl AsRef<Path>,
    operation: &dyn LocationOperation,
    cancel: &CancellationToken,
) -> engine_error::Result<WalkReport> {
    let start = repository.path(start)?;
    DirectoryWalker::new().run(&start, operation, cancel).await.map_err(|err| {
        let kind = match err.is_fatal() {
            true => engine_error::ErrorKind::StorageUnavailable,
            false => engine_error::ErrorKind::Storage,
        };
        err.raise(kind)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind as EngineErrorKind;
    use depot_config::RepositoryKind;
    use depot_layout::maven::MavenLayout;
    use depot_storage::backend::MockBackend;
    use std::sync::Mutex;

    fn repository(files: &[&str]) -> (Arc<Repository>, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::with_files(files.iter().map(|path| (*path, "x"))).with_name("s:releases"));
        let repository = Arc::new(Repository::new(
            RepositoryId::new("s", "releases"),
            Arc::new(MavenLayout::default()),
            RepositoryKind::Hosted,
            backend.clone(),
        ));
        (repository, backend)
    }

    /// Records every location it is called with.
    fn recorder(calls: &Arc<Mutex<Vec<(String, Vec<String>)>>>) -> impl LocationOperation + use<> {
        let calls = Arc::clone(calls);
        from_fn("record", move |location: Location| {
            let calls = Arc::clone(&calls);
            async move {
                let base = location.base.relative().display().to_string();
                calls.lock().unwrap().push((base, location.version_names()));
                Ok(())
            }
        })
    }

    const TREE: &[&str] = &[
        "com/acme/lib/1.0/lib-1.0.jar",
        "com/acme/lib/1.0/lib-1.0.pom",
        "com/acme/lib/1.1/lib-1.1.jar",
        "com/acme/lib/1.2/lib-1.2.pom",
        "com/acme/lib/maven-metadata.xml",
        "com/acme/lib/docs/readme.txt",
        "com/acme/util/2.0/util-2.0.jar",
        "org/other/app/3.0/app-3.0.war",
        "org/other/app/3.0/app-3.0.war.sha256",
    ];

    #[tokio::test]
    async fn test_operation_runs_once_per_artifact() {
        let (repository, _backend) = repository(TREE);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let report = DirectoryWalker::new()
            .run(&repository.root(), &recorder(&calls), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            [
                ("com/acme/lib".to_string(), vec!["1.0".to_string(), "1.1".into(), "1.2".into()]),
                ("com/acme/util".to_string(), vec!["2.0".to_string()]),
                ("org/other/app".to_string(), vec!["3.0".to_string()]),
            ]
        );
        assert_eq!(report.locations, 3);
        assert_eq!(report.skipped, 2);
        assert!(report.is_success());
        // Only the current artifact's base is ever tracked.
        assert_eq!(report.peak_tracked_roots, 1);
    }

    #[tokio::test]
    async fn test_walk_is_repeatable() {
        let (repository, _backend) = repository(TREE);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let operation = recorder(&calls);
        let walker = DirectoryWalker::new();
        walker.run(&repository.root(), &operation, &CancellationToken::new()).await.unwrap();
        let first = calls.lock().unwrap().clone();
        calls.lock().unwrap().clear();
        walker.run(&repository.root(), &operation, &CancellationToken::new()).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), first);
    }

    #[tokio::test]
    async fn test_start_below_root() {
        let (repository, _backend) = repository(TREE);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let report = walk(&repository, "com/acme/lib/1.1", &recorder(&calls), &CancellationToken::new()).await.unwrap();
        assert_eq!(report.locations, 1);
        assert_eq!(calls.lock().unwrap()[0].1, ["1.0", "1.1", "1.2"]);

        let err = walk(&repository, "../elsewhere", &recorder(&calls), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(&*err, EngineErrorKind::PathEscape(_)));
    }

    #[tokio::test]
    async fn test_failures_do_not_abort() {
        let (repository, _backend) = repository(TREE);
        let operation = from_fn("flaky", |location: Location| async move {
            if location.base.relative() == Path::new("com/acme/lib") {
                return Err(exn::Exn::from(EngineErrorKind::Storage));
            }
            Ok(())
        });
        let report = DirectoryWalker::new()
            .run(&repository.root(), &operation, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.locations, 2);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(&*report.failures[0], ErrorKind::Operation { .. }));
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_unavailable_storage_aborts() {
        let (repository, backend) = repository(TREE);
        backend.set_unavailable(true);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let err = DirectoryWalker::new()
            .run(&repository.root(), &recorder(&calls), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(*err, ErrorKind::StorageUnavailable);
    }

    #[tokio::test]
    async fn test_cancelled_between_directories() {
        let (repository, _backend) = repository(TREE);
        let cancel = CancellationToken::new();
        let operation = {
            let cancel = cancel.clone();
            from_fn("cancel-after-first", move |_location: Location| {
                let cancel = cancel.clone();
                async move {
                    cancel.cancel();
                    Ok(())
                }
            })
        };
        let report = DirectoryWalker::new().run(&repository.root(), &operation, &cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.locations, 1);
    }
}
