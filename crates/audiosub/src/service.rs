//! Service facade: the submission and result surface used by front ends.

use std::sync::{Arc, Mutex};

use log::{info, warn};
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{validate_config, ServiceConfig};
use crate::engine::{ModelLoadError, ModelManager, ModelTier, SpeechEngine};
use crate::error::{ArtifactError, AudiosubError, ServiceError};
use crate::jobs::{
    JobCounts, JobEvent, JobEventBroadcaster, JobStatus, JobStore, JobView, SweepScheduler,
    TranscriptSummary,
};
use crate::memory::MemoryMonitor;
use crate::pipeline::{Pipeline, PipelineConfig, PipelineContext};
use crate::storage::ArtifactStore;
use crate::submission::{SubmissionGate, SUPPORTED_FORMATS};
use crate::subtitle::srt;
use crate::worker::{QueuedJob, WorkerPool};

/// Result of a synchronous transcription.
#[derive(Debug, Clone)]
pub struct SubtitleFile {
    pub filename: String,
    pub content: String,
    pub summary: TranscriptSummary,
}

/// Subtitles of a completed job.
#[derive(Debug, Clone)]
pub struct SubtitleDownload {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub engine: String,
    pub model: Option<ModelTier>,
    pub model_loading: bool,
    pub jobs: JobCounts,
    pub queued: usize,
    pub max_upload_bytes: u64,
}

pub struct TranscriptionService {
    config: ServiceConfig,
    store: Arc<JobStore>,
    models: Arc<ModelManager>,
    pipeline: Arc<Pipeline>,
    gate: SubmissionGate,
    pool: WorkerPool,
    events: JobEventBroadcaster,
    sweeper: Option<SweepScheduler>,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
}

impl TranscriptionService {
    /// Builds every component and starts the workers on the current runtime.
    ///
    /// The model is not loaded here; see [`TranscriptionService::preload`].
    pub fn start(
        config: ServiceConfig,
        engine: Arc<dyn SpeechEngine>,
    ) -> Result<Self, AudiosubError> {
        validate_config(&config)?;

        let artifacts = Arc::new(ArtifactStore::open(&config.work_directory)?);
        let store = Arc::new(JobStore::new(config.retention()?));
        let models = Arc::new(ModelManager::from_config(engine, &config.model));
        let memory = Arc::new(MemoryMonitor::new(&config.memory));
        let pipeline = Arc::new(Pipeline::new(
            PipelineConfig::from_service_config(&config),
            Arc::clone(&models),
            Arc::clone(&artifacts),
            memory,
        ));
        let gate = SubmissionGate::new(Arc::clone(&artifacts), config.max_upload_bytes);
        let events = JobEventBroadcaster::default();
        let pool = WorkerPool::start(
            Arc::clone(&pipeline),
            Arc::clone(&store),
            events.clone(),
            config.worker_count,
            config.queue_capacity,
        );

        let sweeper = config
            .sweep_interval()
            .map(|interval| SweepScheduler::new(Arc::clone(&store), interval));
        let sweeper_handle = sweeper.as_ref().map(SweepScheduler::start);

        info!(
            "Transcription service ready: engine={}, model plan={:?}, max upload={}MB",
            models.engine_name(),
            models.plan(),
            config.max_upload_bytes / (1024 * 1024)
        );

        Ok(Self {
            config,
            store,
            models,
            pipeline,
            gate,
            pool,
            events,
            sweeper,
            sweeper_handle: Mutex::new(sweeper_handle),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn supported_formats(&self) -> &'static [&'static str] {
        SUPPORTED_FORMATS
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Accepts an upload and queues it. Returns the pending job.
    pub async fn submit<R>(&self, filename: Option<&str>, body: R) -> Result<JobView, ServiceError>
    where
        R: AsyncRead + Send,
    {
        self.store.sweep_expired();

        let job_id = uuid::Uuid::new_v4().to_string();
        let upload = self.gate.accept(filename, Some(&job_id), body).await?;

        let job = crate::jobs::Job::with_id(
            &job_id,
            &upload.filename,
            upload.size_bytes,
            &upload.mime_type(),
        );
        let view = job.view();
        self.store.put(job);
        self.events
            .send(JobEvent::new(&job_id, &upload.filename, JobStatus::Pending));

        let queued = QueuedJob {
            job_id: job_id.clone(),
            filename: upload.filename,
            input: upload.artifact,
        };
        if let Err(e) = self.pool.submit(queued) {
            warn!("Rejecting job {}: {}", job_id, e);
            self.store.remove(&job_id);
            return Err(e.into());
        }

        info!("Queued job {} ({} bytes)", job_id, view.file_size_bytes);
        Ok(view)
    }

    /// Runs the whole pipeline for the caller without creating a job.
    pub async fn transcribe_now<R>(
        &self,
        filename: Option<&str>,
        body: R,
    ) -> Result<SubtitleFile, ServiceError>
    where
        R: AsyncRead + Send,
    {
        let upload = self.gate.accept(filename, None, body).await?;
        let download_name = srt::output_filename(&upload.filename);

        let ctx = PipelineContext::new(None, &upload.filename, upload.artifact);
        let output = self.pipeline.run(ctx).await?;

        let content = tokio::fs::read_to_string(output.artifact.path())
            .await
            .map_err(|e| ArtifactError::Read {
                path: output.artifact.path().to_path_buf(),
                source: e,
            })?;

        // Output guard drops here and removes the file.
        Ok(SubtitleFile {
            filename: download_name,
            content,
            summary: output.summary,
        })
    }

    pub fn status(&self, job_id: &str) -> Result<JobView, ServiceError> {
        self.store.view(job_id).ok_or_else(|| ServiceError::NotFound {
            job_id: job_id.to_string(),
        })
    }

    /// Reads the subtitles of a completed job.
    ///
    /// With `release_on_download` the file is deleted after reading, and
    /// later calls report it as missing.
    pub async fn download(&self, job_id: &str) -> Result<SubtitleDownload, ServiceError> {
        let job = self.store.get(job_id).ok_or_else(|| ServiceError::NotFound {
            job_id: job_id.to_string(),
        })?;

        if job.status != JobStatus::Completed {
            return Err(ServiceError::NotReady {
                job_id: job_id.to_string(),
                status: job.status,
            });
        }

        let missing = || ServiceError::ArtifactMissing {
            job_id: job_id.to_string(),
        };
        let output = job.output.ok_or_else(missing)?;

        let content = match output.read_to_string().await {
            Ok(content) => content,
            Err(ArtifactError::Read { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                return Err(missing());
            }
            Err(e) => return Err(e.into()),
        };

        if self.config.release_on_download {
            output.release()?;
            info!("Released subtitles of job {} after download", job_id);
        }

        Ok(SubtitleDownload {
            filename: srt::output_filename(&job.filename),
            content,
        })
    }

    /// Jobs newest first, after dropping expired ones.
    pub fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Vec<JobView> {
        self.store.sweep_expired();
        self.store.list(status, limit)
    }

    pub fn sweep_expired(&self) -> usize {
        self.store.sweep_expired()
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy",
            engine: self.models.engine_name().to_string(),
            model: self.models.loaded_tier(),
            model_loading: self.models.is_loading(),
            jobs: self.store.counts(),
            queued: self.pool.queued(),
            max_upload_bytes: self.config.max_upload_bytes,
        }
    }

    /// Loads the model ahead of the first request.
    pub async fn preload(&self) -> Result<ModelTier, ModelLoadError> {
        self.models.acquire().await.map(|handle| handle.tier())
    }

    /// Stops intake and waits for queued jobs to finish.
    pub async fn shutdown(&self) {
        if let Some(sweeper) = &self.sweeper {
            sweeper.stop();
        }
        let sweeper_handle = match self.sweeper_handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = sweeper_handle {
            let _ = handle.await;
        }

        self.pool.shutdown();
        self.pool.wait().await;
        info!("Transcription service stopped");
    }
}
