use crate::engine::{EngineHandle, Transcript};
use crate::jobs::TranscriptSummary;
use crate::storage::TempArtifact;

/// State carried through one pipeline run.
pub struct PipelineContext {
    // None for synchronous one-shot requests
    pub job_id: Option<String>,
    pub filename: String,

    // Taken and released right after inference
    pub input: Option<TempArtifact>,

    pub engine: Option<EngineHandle>,
    pub transcript: Option<Transcript>,
}

impl PipelineContext {
    pub fn new(job_id: Option<&str>, filename: &str, input: TempArtifact) -> Self {
        Self {
            job_id: job_id.map(str::to_string),
            filename: filename.to_string(),
            input: Some(input),
            engine: None,
            transcript: None,
        }
    }
}

/// A rendered subtitle file and what produced it.
///
/// The artifact is still guarded: dropping the output deletes the file
/// unless the caller persists it.
#[derive(Debug)]
pub struct PipelineOutput {
    pub artifact: TempArtifact,
    pub summary: TranscriptSummary,
}
