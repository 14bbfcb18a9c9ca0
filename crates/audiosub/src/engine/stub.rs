//! Deterministic engine used for dry runs and tests.
//!
//! It never looks at the audio content. The synthetic duration is derived
//! from the file size as if the input were 16 kHz mono 16-bit PCM.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::engine::{
    DecodeOptions, EngineError, ModelTier, Segment, SpeechEngine, SpeechModel, Transcript,
};

const BYTES_PER_SECOND: f64 = 32_000.0;
const SEGMENT_SECONDS: f64 = 5.0;

#[derive(Default)]
struct StubState {
    load_delays: Mutex<HashMap<ModelTier, Duration>>,
    load_failures: Mutex<HashMap<ModelTier, EngineError>>,
    inference_delay: Mutex<Option<Duration>>,
    next_inference_failure: Mutex<Option<EngineError>>,
    load_attempts: AtomicUsize,
    completed_loads: AtomicUsize,
    transcriptions: AtomicUsize,
    reclaims: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clones share behaviour and counters, so a test can keep one clone to
/// steer the engine after handing another to the service.
#[derive(Clone, Default)]
pub struct StubEngine {
    state: Arc<StubState>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every load of `tier` block for `delay` first.
    pub fn delay_load(&self, tier: ModelTier, delay: Duration) {
        lock(&self.state.load_delays).insert(tier, delay);
    }

    /// Makes every load of `tier` fail with `error`.
    pub fn fail_tier(&self, tier: ModelTier, error: EngineError) {
        lock(&self.state.load_failures).insert(tier, error);
    }

    pub fn restore_tier(&self, tier: ModelTier) {
        lock(&self.state.load_failures).remove(&tier);
        lock(&self.state.load_delays).remove(&tier);
    }

    /// Makes every transcription block for `delay`, or removes the delay.
    pub fn delay_inference(&self, delay: Option<Duration>) {
        *lock(&self.state.inference_delay) = delay;
    }

    /// The next transcription fails with `error`; later ones succeed.
    pub fn fail_next_inference(&self, error: EngineError) {
        *lock(&self.state.next_inference_failure) = Some(error);
    }

    pub fn load_attempts(&self) -> usize {
        self.state.load_attempts.load(Ordering::SeqCst)
    }

    pub fn completed_loads(&self) -> usize {
        self.state.completed_loads.load(Ordering::SeqCst)
    }

    pub fn transcriptions(&self) -> usize {
        self.state.transcriptions.load(Ordering::SeqCst)
    }

    pub fn reclaims(&self) -> usize {
        self.state.reclaims.load(Ordering::SeqCst)
    }
}

impl SpeechEngine for StubEngine {
    fn name(&self) -> &str {
        "stub"
    }

    fn load(&self, tier: ModelTier) -> Result<Arc<dyn SpeechModel>, EngineError> {
        self.state.load_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = lock(&self.state.load_delays).get(&tier).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if let Some(error) = lock(&self.state.load_failures).get(&tier).cloned() {
            return Err(error);
        }

        self.state.completed_loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(StubModel {
            state: Arc::clone(&self.state),
        }))
    }
}

struct StubModel {
    state: Arc<StubState>,
}

impl SpeechModel for StubModel {
    fn transcribe(
        &self,
        input: &Path,
        options: &DecodeOptions,
    ) -> Result<Transcript, EngineError> {
        let delay = *lock(&self.state.inference_delay);
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if let Some(error) = lock(&self.state.next_inference_failure).take() {
            return Err(error);
        }

        let size = std::fs::metadata(input)
            .map_err(|e| EngineError::io(input, &e))?
            .len();

        let transcript = Transcript {
            segments: synthetic_segments(size),
            language: Some(options.language.clone().unwrap_or_else(|| "en".to_string())),
        };

        self.state.transcriptions.fetch_add(1, Ordering::SeqCst);
        Ok(transcript)
    }

    fn reclaim(&self) {
        self.state.reclaims.fetch_add(1, Ordering::SeqCst);
    }
}

fn synthetic_segments(size_bytes: u64) -> Vec<Segment> {
    let duration = (size_bytes as f64 / BYTES_PER_SECOND).max(1.0);
    let count = (duration / SEGMENT_SECONDS).ceil() as usize;

    (0..count)
        .map(|i| {
            let start = i as f64 * SEGMENT_SECONDS;
            Segment {
                start,
                end: (start + SEGMENT_SECONDS).min(duration),
                text: format!("Stub segment {}", i + 1),
            }
        })
        .collect()
}
