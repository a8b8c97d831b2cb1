pub mod artifact;

pub use artifact::{Action, ActionType, ArtifactMeta};
