// Workbench: artifact/action state observed by the UI, plus its HTTP handlers.

pub mod handlers;
pub mod store;

pub use store::{ArtifactEntry, ArtifactSnapshot, ArtifactStore};
