//! Repository metadata documents.
//!
//! The [`model`] mirrors `maven-metadata.xml` at its three levels, [`xml`]
//! reads and writes it deterministically, [`ops`] holds the pure
//! generate/edit/merge rules and [`MetadataStore`] ties them to storage with
//! per-path locking.

pub mod error;
pub mod model;
pub mod ops;
mod store;
pub mod xml;

pub use crate::model::{Metadata, MetadataLevel};
pub use crate::store::{MetadataStore, PathLock};
