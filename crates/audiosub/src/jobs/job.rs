use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::ModelTier;
use crate::storage::ArtifactRef;

/// Lifecycle state of a job. Moves strictly pending, processing, then one
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown job status '{0}'")]
pub struct ParseStatusError(pub String);

impl FromStr for JobStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Classification of why a submission or job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidInput,
    UnsupportedFormat,
    PayloadTooLarge,
    EngineUnavailable,
    TranscriptionTimeout,
    EngineExecutionError,
    MemoryExhausted,
    ArtifactIo,
}

impl FailureKind {
    /// Whether retrying with a smaller input or lighter model may help.
    pub fn is_resource_related(self) -> bool {
        matches!(
            self,
            FailureKind::MemoryExhausted
                | FailureKind::TranscriptionTimeout
                | FailureKind::EngineUnavailable
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Metadata recorded on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSummary {
    pub segments_count: usize,
    pub detected_language: Option<String>,
    pub model_tier: ModelTier,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Illegal job transition from {from} to {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// A tracked transcription job.
///
/// Exactly one of `output` and `error` is set once the job is terminal;
/// both are empty before that.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub filename: String,
    pub file_size_bytes: u64,
    pub mime_type: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<ArtifactRef>,
    pub result: Option<TranscriptSummary>,
    pub error: Option<JobFailure>,
}

impl Job {
    pub fn new(filename: &str, file_size_bytes: u64, mime_type: &str) -> Self {
        Self::with_id(
            &uuid::Uuid::new_v4().to_string(),
            filename,
            file_size_bytes,
            mime_type,
        )
    }

    /// Creates a job under an id reserved earlier, e.g. to tag its input.
    pub fn with_id(id: &str, filename: &str, file_size_bytes: u64, mime_type: &str) -> Self {
        Self {
            id: id.to_string(),
            filename: filename.to_string(),
            file_size_bytes,
            mime_type: mime_type.to_string(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            output: None,
            result: None,
            error: None,
        }
    }

    fn transition(&mut self, from: JobStatus, to: JobStatus) -> Result<(), TransitionError> {
        if self.status != from {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Pending, JobStatus::Processing)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(
        &mut self,
        output: ArtifactRef,
        summary: TranscriptSummary,
    ) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing, JobStatus::Completed)?;
        self.completed_at = Some(Utc::now());
        self.output = Some(output);
        self.result = Some(summary);
        Ok(())
    }

    pub fn fail(&mut self, failure: JobFailure) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing, JobStatus::Failed)?;
        self.completed_at = Some(Utc::now());
        self.error = Some(failure);
        Ok(())
    }

    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        self.created_at < cutoff
    }

    pub fn view(&self) -> JobView {
        JobView {
            job_id: self.id.clone(),
            filename: self.filename.clone(),
            file_size_bytes: self.file_size_bytes,
            mime_type: self.mime_type.clone(),
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            segments_count: self.result.as_ref().map(|r| r.segments_count),
            detected_language: self
                .result
                .as_ref()
                .and_then(|r| r.detected_language.clone()),
            model: self.result.as_ref().map(|r| r.model_tier),
            error: self.error.clone(),
        }
    }
}

/// Public snapshot of a job. Never carries filesystem paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: String,
    pub filename: String,
    pub file_size_bytes: u64,
    pub mime_type: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
}
