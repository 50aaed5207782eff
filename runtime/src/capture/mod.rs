//! Single-target capture: load, detect blocks, extract, fingerprint.

pub mod artifacts;
pub mod block;
mod error;
pub mod orchestrator;
pub mod urls;

pub use artifacts::{Artifact, ArtifactKind, ArtifactStore, StoredArtifact};
pub use block::{detect_block, BlockReason};
pub use error::CaptureError;
pub use orchestrator::{extract, CaptureOrchestrator, CaptureOutcome, Extraction};
