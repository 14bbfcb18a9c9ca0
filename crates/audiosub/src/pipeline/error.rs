use std::time::Duration;

use thiserror::Error;

use crate::engine::{EngineError, ModelLoadError};
use crate::error::ArtifactError;
use crate::jobs::{FailureKind, JobFailure};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Speech engine unavailable: {0}")]
    EngineUnavailable(#[from] ModelLoadError),

    #[error("Transcription timed out after {}s", .limit.as_secs())]
    Timeout { limit: Duration },

    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("Memory limit reached: {resident_mb}MB resident, limit {limit_mb}MB")]
    MemoryExhausted { resident_mb: u64, limit_mb: u64 },

    #[error("Inference task panicked: {0}")]
    Panicked(String),

    #[error("Artifact storage failed: {0}")]
    Artifact(#[from] ArtifactError),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::EngineUnavailable(_) => FailureKind::EngineUnavailable,
            PipelineError::Timeout { .. } => FailureKind::TranscriptionTimeout,
            PipelineError::Engine(e) if e.is_out_of_memory() => FailureKind::MemoryExhausted,
            PipelineError::Engine(_) | PipelineError::Panicked(_) => {
                FailureKind::EngineExecutionError
            }
            PipelineError::MemoryExhausted { .. } => FailureKind::MemoryExhausted,
            PipelineError::Artifact(_) => FailureKind::ArtifactIo,
        }
    }

    pub fn to_failure(&self) -> JobFailure {
        JobFailure::new(self.kind(), self.to_string())
    }
}
