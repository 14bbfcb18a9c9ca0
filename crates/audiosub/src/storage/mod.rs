pub mod artifact;

pub use artifact::{ArtifactKind, ArtifactRef, ArtifactStore, TempArtifact};
