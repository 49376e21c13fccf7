//! Package format rules.
//!
//! Each supported format implements [`LayoutProvider`]: a bidirectional
//! mapping between [`ArtifactCoordinates`] and repository-relative paths, plus
//! the rules that decide which files are artifacts, metadata documents or
//! checksums. Providers are looked up by alias in a [`LayoutRegistry`].

mod consts;
pub mod coordinates;
pub mod error;
pub mod maven;
pub mod npm;
pub mod nuget;
pub mod provider;
pub mod pypi;
pub mod raw;
mod registry;
pub mod version;

pub use crate::coordinates::ArtifactCoordinates;
pub use crate::provider::{FileClass, LayoutProvider};
pub use crate::registry::{LayoutHandle, LayoutRegistry};
