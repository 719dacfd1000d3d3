//! Published artifacts: the manifest and the cached loader that reads them back

pub mod loader;
pub mod manifest;

pub use loader::{ArtifactCache, ArtifactLoader, ArtifactSource, DirSource, FetchError, HttpSource};
pub use manifest::{variable_available, AvailableLevels, Granularity, Manifest, Resource, Schema};
