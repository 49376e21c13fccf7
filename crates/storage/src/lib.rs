//! Raw byte storage underneath every repository.
//!
//! Nothing in this crate knows about package formats. Paths are relative to a
//! backend root, and the empty path *is* the root.

pub mod backend;
pub mod checksum;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::checksum::ChecksumAlgorithm;
pub use crate::models::{DirEntry, EntryKind, FileInfo};
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
