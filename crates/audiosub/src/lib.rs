pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod memory;
pub mod pipeline;
pub mod sanitize;
pub mod service;
pub mod storage;
pub mod submission;
pub mod subtitle;
pub mod worker;

pub use config::{load_config, load_config_from_str, InstanceType, LoadPolicy, ServiceConfig};
pub use engine::{
    DecodeOptions, EngineError, EngineHandle, ModelLoadError, ModelManager, ModelTier, Segment,
    SpeechEngine, SpeechModel, StubEngine, Transcript, WhisperCliEngine,
};
pub use error::{
    ArtifactError, AudiosubError, ConfigError, Result, ServiceError, SubmissionError, WorkerError,
};
pub use jobs::{
    FailureKind, Job, JobEvent, JobEventBroadcaster, JobFailure, JobStatus, JobStore, JobView,
};
pub use service::{HealthReport, SubtitleDownload, SubtitleFile, TranscriptionService};
