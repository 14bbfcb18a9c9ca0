//! Job state change broadcasting.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::jobs::{FailureKind, JobStatus};

/// Emitted on every job state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: String,
    pub filename: String,
    pub status: JobStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JobEvent {
    pub fn new(job_id: &str, filename: &str, status: JobStatus) -> Self {
        Self {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            status,
            timestamp: Utc::now(),
            segments_count: None,
            failure: None,
            message: None,
        }
    }

    pub fn completed(job_id: &str, filename: &str, segments_count: usize) -> Self {
        Self {
            segments_count: Some(segments_count),
            ..Self::new(job_id, filename, JobStatus::Completed)
        }
    }

    pub fn failed(job_id: &str, filename: &str, kind: FailureKind, message: &str) -> Self {
        Self {
            failure: Some(kind),
            message: Some(message.to_string()),
            ..Self::new(job_id, filename, JobStatus::Failed)
        }
    }
}

/// Fan-out of job events. Sending never blocks and never fails, whether or
/// not anyone is listening.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
