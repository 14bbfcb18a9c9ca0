use std::path::PathBuf;
use thiserror::Error;

use crate::jobs::{FailureKind, JobStatus};
use crate::pipeline::PipelineError;

#[derive(Error, Debug)]
pub enum AudiosubError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Submission rejected: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Storage error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Unknown model tier '{0}'")]
    UnknownTier(String),

    #[error("Unknown instance type '{0}'")]
    UnknownInstance(String),
}

/// Rejections raised by the submission gate before any job exists.
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("No filename provided")]
    MissingFilename,

    #[error("Unsupported file format '{extension}'. Supported formats: {supported}")]
    UnsupportedFormat { extension: String, supported: String },

    #[error("File too large. Maximum size: {}MB", .limit_bytes / (1024 * 1024))]
    PayloadTooLarge { limit_bytes: u64 },

    #[error("Failed to read upload stream: {0}")]
    Stream(#[source] std::io::Error),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl SubmissionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SubmissionError::MissingFilename | SubmissionError::Stream(_) => {
                FailureKind::InvalidInput
            }
            SubmissionError::UnsupportedFormat { .. } => FailureKind::UnsupportedFormat,
            SubmissionError::PayloadTooLarge { .. } => FailureKind::PayloadTooLarge,
            SubmissionError::Artifact(_) => FailureKind::ArtifactIo,
        }
    }
}

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create artifact '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write artifact '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read artifact '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove artifact '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not allocate a unique artifact name in '{0}'")]
    NameExhausted(PathBuf),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Job queue is full ({capacity} jobs waiting)")]
    QueueFull { capacity: usize },

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

/// Errors surfaced to callers of the transcription service.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Rejected(#[from] SubmissionError),

    #[error("Job not found: {job_id}")]
    NotFound { job_id: String },

    #[error("Subtitle file for job {job_id} is no longer available")]
    ArtifactMissing { job_id: String },

    #[error("Job {job_id} is not ready for download (status: {status})")]
    NotReady { job_id: String, status: JobStatus },

    #[error("Transcription failed: {0}")]
    Execution(#[from] PipelineError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl ServiceError {
    /// Failure classification when the error stems from a submission or run.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ServiceError::Rejected(e) => Some(e.kind()),
            ServiceError::Execution(e) => Some(e.kind()),
            ServiceError::Artifact(_) => Some(FailureKind::ArtifactIo),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AudiosubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_too_large_reports_megabytes() {
        let err = SubmissionError::PayloadTooLarge {
            limit_bytes: 100 * 1024 * 1024,
        };
        assert_eq!(err.to_string(), "File too large. Maximum size: 100MB");
        assert_eq!(err.kind(), FailureKind::PayloadTooLarge);
    }

    #[test]
    fn test_submission_error_kinds() {
        assert_eq!(
            SubmissionError::MissingFilename.kind(),
            FailureKind::InvalidInput
        );
        let unsupported = SubmissionError::UnsupportedFormat {
            extension: "txt".to_string(),
            supported: "mp3".to_string(),
        };
        assert_eq!(unsupported.kind(), FailureKind::UnsupportedFormat);
    }

    #[test]
    fn test_service_error_failure_kind() {
        let err = ServiceError::NotFound {
            job_id: "abc".to_string(),
        };
        assert!(err.failure_kind().is_none());

        let err = ServiceError::from(SubmissionError::MissingFilename);
        assert_eq!(err.failure_kind(), Some(FailureKind::InvalidInput));
    }
}
