//! Repositories, group membership and keeping metadata consistent across
//! them.
//!
//! A [`Catalog`] holds every configured [`Repository`] and the
//! [`RepositoryGraph`] of group membership. The [`walk`] module visits each
//! artifact location of a repository once and runs an operation over it. The
//! [`propagate`] module regenerates a repository's metadata after a change
//! and merges it into every group that contains the repository. [`Engine`]
//! bundles these behind tracked, cancellable jobs.

mod artifact;
mod catalog;
mod engine;
pub mod error;
mod generate;
mod jobs;
mod notify;
mod path;
pub mod propagate;
mod repository;
pub mod walk;

pub use crate::artifact::ArtifactManager;
pub use crate::catalog::Catalog;
pub use crate::engine::{DEFAULT_FINISHED_JOBS_KEPT, Engine};
pub use crate::generate::MetadataGenerator;
pub use crate::jobs::{JobId, JobInfo, JobStatus, JobTracker};
pub use crate::notify::{ChannelNotifier, IndexEvent, IndexNotifier, NoopNotifier};
pub use crate::path::{Attribute, Attributes, RepositoryPath};
pub use crate::propagate::{MetadataPropagator, MetadataScope, PropagationReport, RepositoryGraph};
pub use crate::repository::{Repository, RepositoryId};
