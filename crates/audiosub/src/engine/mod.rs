//! Speech-to-text engine collaborators and the shared model loader.
//!
//! Engines are blocking: every call is made from the blocking thread pool so
//! a stuck load or inference cannot stall the async workers.

pub mod error;
pub mod model_manager;
pub mod stub;
pub mod tier;
pub mod whisper_cli;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub use error::EngineError;
pub use model_manager::{EngineHandle, LoadAttempt, ModelLoadError, ModelManager};
pub use stub::StubEngine;
pub use tier::ModelTier;
pub use whisper_cli::WhisperCliEngine;

/// A timed piece of recognised text. Offsets are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub segments: Vec<Segment>,
    pub language: Option<String>,
}

/// Decoding parameters passed to the engine on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Spoken language; `None` lets the engine detect it.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub condition_on_previous_text: bool,
    #[serde(default)]
    pub word_timestamps: bool,
    #[serde(default)]
    pub threads: Option<usize>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            language: None,
            temperature: 0.0,
            condition_on_previous_text: false,
            word_timestamps: false,
            threads: None,
        }
    }
}

/// Loads models of a given tier.
pub trait SpeechEngine: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Loads the weights for `tier`. Blocking.
    fn load(&self, tier: ModelTier) -> Result<Arc<dyn SpeechModel>, EngineError>;
}

/// A loaded model, shared read-only by every worker.
pub trait SpeechModel: Send + Sync {
    /// Transcribes the audio file at `input`. Blocking.
    fn transcribe(&self, input: &Path, options: &DecodeOptions)
        -> Result<Transcript, EngineError>;

    /// Hint to drop caches accumulated by the last call.
    fn reclaim(&self) {}
}
