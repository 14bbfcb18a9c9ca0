use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::engine::{EngineHandle, ModelManager, Transcript};
use crate::jobs::TranscriptSummary;
use crate::memory::{MemoryMonitor, MemoryPressure};
use crate::storage::ArtifactStore;
use crate::subtitle::srt;

use super::config::PipelineConfig;
use super::context::{PipelineContext, PipelineOutput};
use super::error::PipelineError;

/// Drives one upload through engine acquisition, bounded inference and
/// subtitle materialization. Shared by the synchronous path and workers.
pub struct Pipeline {
    config: PipelineConfig,
    models: Arc<ModelManager>,
    artifacts: Arc<ArtifactStore>,
    memory: Arc<MemoryMonitor>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        models: Arc<ModelManager>,
        artifacts: Arc<ArtifactStore>,
        memory: Arc<MemoryMonitor>,
    ) -> Self {
        Self {
            config,
            models,
            artifacts,
            memory,
        }
    }

    pub fn models(&self) -> &Arc<ModelManager> {
        &self.models
    }

    /// Runs the pipeline to completion.
    ///
    /// The input artifact is released on every path, right after inference
    /// returns or fails. The returned output artifact is still guarded.
    pub async fn run(&self, mut ctx: PipelineContext) -> Result<PipelineOutput, PipelineError> {
        let span = info_span!(
            "pipeline",
            job_id = ctx.job_id.as_deref().unwrap_or("sync"),
            file = %ctx.filename,
        );

        async move {
            let inference = self.step_infer(&mut ctx).await;

            self.step_release_input(&mut ctx);
            self.step_reclaim(&ctx);

            let (engine, transcript) = inference?;
            let output = self
                .step_materialize_output(&ctx, &engine, &transcript)
                .instrument(info_span!("materialize_output"))
                .await?;

            info!(
                segments = output.summary.segments_count,
                model = %engine.tier(),
                "Transcription finished"
            );
            Ok(output)
        }
        .instrument(span)
        .await
    }

    async fn step_infer(
        &self,
        ctx: &mut PipelineContext,
    ) -> Result<(EngineHandle, Transcript), PipelineError> {
        let engine = self
            .models
            .acquire()
            .instrument(info_span!("acquire_engine"))
            .await?;
        ctx.engine = Some(engine.clone());

        self.step_memory_guard()?;

        let transcript = self
            .step_transcribe(ctx, &engine)
            .instrument(info_span!("inference", model = %engine.tier()))
            .await?;
        ctx.transcript = Some(transcript.clone());

        Ok((engine, transcript))
    }

    fn step_memory_guard(&self) -> Result<(), PipelineError> {
        match self.memory.pressure() {
            (MemoryPressure::Critical, Some(resident_mb)) => {
                let limit_mb = self.memory.critical_mb().unwrap_or(resident_mb);
                warn!(resident_mb, limit_mb, "Refusing inference under memory pressure");
                Err(PipelineError::MemoryExhausted {
                    resident_mb,
                    limit_mb,
                })
            }
            (MemoryPressure::Elevated, Some(resident_mb)) => {
                warn!(resident_mb, "Memory usage elevated before inference");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn step_transcribe(
        &self,
        ctx: &PipelineContext,
        engine: &EngineHandle,
    ) -> Result<Transcript, PipelineError> {
        let input_path = match &ctx.input {
            Some(input) => input.path().to_path_buf(),
            None => {
                return Err(PipelineError::Panicked(
                    "input artifact was released before inference".to_string(),
                ))
            }
        };

        let model = Arc::clone(engine.model());
        let options = self.config.decoding.clone();
        let limit = self.config.inference_timeout;

        // A timed-out call keeps running on the blocking pool; only the wait
        // is abandoned. The shared model stays loaded.
        let task = tokio::task::spawn_blocking(move || model.transcribe(&input_path, &options));

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(Ok(transcript))) => {
                debug!(segments = transcript.segments.len(), "Inference returned");
                Ok(transcript)
            }
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "Inference failed");
                Err(PipelineError::Engine(e))
            }
            Ok(Err(e)) => Err(PipelineError::Panicked(e.to_string())),
            Err(_) => {
                warn!(limit_secs = limit.as_secs(), "Inference timed out");
                Err(PipelineError::Timeout { limit })
            }
        }
    }

    fn step_release_input(&self, ctx: &mut PipelineContext) {
        if let Some(input) = ctx.input.take() {
            if let Err(e) = input.release() {
                warn!(error = %e, "Failed to release input artifact");
            }
        }
    }

    fn step_reclaim(&self, ctx: &PipelineContext) {
        if let Some(engine) = &ctx.engine {
            engine.model().reclaim();
        }
        if let Some(resident_mb) = self.memory.resident_mb() {
            debug!(resident_mb, "Memory after inference");
        }
    }

    async fn step_materialize_output(
        &self,
        ctx: &PipelineContext,
        engine: &EngineHandle,
        transcript: &Transcript,
    ) -> Result<PipelineOutput, PipelineError> {
        let document = srt::render(&transcript.segments);
        let artifact = self
            .artifacts
            .materialize_output(ctx.job_id.as_deref(), &document)
            .await?;

        Ok(PipelineOutput {
            artifact,
            summary: TranscriptSummary {
                segments_count: transcript.segments.len(),
                detected_language: transcript.language.clone(),
                model_tier: engine.tier(),
            },
        })
    }
}
