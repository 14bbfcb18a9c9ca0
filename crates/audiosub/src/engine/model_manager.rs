//! Lazy, process-wide model loading with cascading fallback.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::{LoadPolicy, ModelConfig};
use crate::engine::{ModelTier, SpeechEngine, SpeechModel};

/// A loaded model together with the tier it was loaded at.
#[derive(Clone)]
pub struct EngineHandle {
    tier: ModelTier,
    model: Arc<dyn SpeechModel>,
}

impl EngineHandle {
    pub fn new(tier: ModelTier, model: Arc<dyn SpeechModel>) -> Self {
        Self { tier, model }
    }

    pub fn tier(&self) -> ModelTier {
        self.tier
    }

    pub fn model(&self) -> &Arc<dyn SpeechModel> {
        &self.model
    }

    /// True when both handles point at the same loaded model instance.
    pub fn same_model(&self, other: &EngineHandle) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.model) as *const (),
            Arc::as_ptr(&other.model) as *const (),
        )
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("tier", &self.tier)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadAttempt {
    pub tier: ModelTier,
    pub failure: String,
}

/// Every tier in the load plan failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("No speech model could be loaded: {}", format_attempts(.attempts))]
pub struct ModelLoadError {
    pub attempts: Vec<LoadAttempt>,
}

fn format_attempts(attempts: &[LoadAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{} ({})", a.tier, a.failure))
        .collect::<Vec<_>>()
        .join("; ")
}

type LoadOutcome = Result<EngineHandle, ModelLoadError>;
type SharedLoad = Shared<BoxFuture<'static, LoadOutcome>>;

enum LoadState {
    Idle,
    Loading { generation: u64, outcome: SharedLoad },
    Ready(EngineHandle),
}

/// Owns the shared engine handle.
///
/// At most one load runs at a time. Callers arriving while a load is in
/// flight await that same load and observe its outcome. A failed load
/// leaves the manager idle so the next `acquire` retries.
pub struct ModelManager {
    engine: Arc<dyn SpeechEngine>,
    plan: Vec<ModelTier>,
    load_timeout: Duration,
    state: Mutex<LoadState>,
    generation: AtomicU64,
}

impl ModelManager {
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        preferred: ModelTier,
        policy: LoadPolicy,
        load_timeout: Duration,
    ) -> Self {
        let plan = match policy {
            LoadPolicy::Cascade => preferred.cascade(),
            LoadPolicy::Fixed => vec![preferred],
        };

        Self {
            engine,
            plan,
            load_timeout,
            state: Mutex::new(LoadState::Idle),
            generation: AtomicU64::new(0),
        }
    }

    pub fn from_config(engine: Arc<dyn SpeechEngine>, config: &ModelConfig) -> Self {
        Self::new(
            engine,
            config.preferred_tier,
            config.policy,
            config.load_timeout(),
        )
    }

    /// Tiers tried on load, heaviest first.
    pub fn plan(&self) -> &[ModelTier] {
        &self.plan
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    fn lock_state(&self) -> MutexGuard<'_, LoadState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Model state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Tier of the loaded model, if one is ready.
    pub fn loaded_tier(&self) -> Option<ModelTier> {
        match &*self.lock_state() {
            LoadState::Ready(handle) => Some(handle.tier()),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(&*self.lock_state(), LoadState::Loading { .. })
    }

    /// Returns the shared handle, loading it first if needed.
    pub async fn acquire(&self) -> Result<EngineHandle, ModelLoadError> {
        let (generation, outcome) = {
            let mut state = self.lock_state();
            match &*state {
                LoadState::Ready(handle) => return Ok(handle.clone()),
                LoadState::Loading {
                    generation,
                    outcome,
                } => {
                    debug!("Joining in-flight model load");
                    (*generation, outcome.clone())
                }
                LoadState::Idle => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let outcome = self.start_load();
                    *state = LoadState::Loading {
                        generation,
                        outcome: outcome.clone(),
                    };
                    (generation, outcome)
                }
            }
        };

        let result = outcome.await;

        let mut state = self.lock_state();
        if let LoadState::Loading {
            generation: current,
            ..
        } = &*state
        {
            if *current == generation {
                *state = match &result {
                    Ok(handle) => LoadState::Ready(handle.clone()),
                    Err(_) => LoadState::Idle,
                };
            }
        }

        result
    }

    /// Drops the cached handle so the next `acquire` loads again.
    ///
    /// A load still in flight finishes, but its result is not cached.
    pub fn invalidate(&self) {
        let mut state = self.lock_state();
        self.generation.fetch_add(1, Ordering::SeqCst);
        *state = LoadState::Idle;
        info!("Speech model invalidated");
    }

    fn start_load(&self) -> SharedLoad {
        let engine = Arc::clone(&self.engine);
        let plan = self.plan.clone();
        let load_timeout = self.load_timeout;
        let first_tier = plan.first().copied().unwrap_or(ModelTier::Tiny);

        // Spawned so the load keeps going even if every waiter is cancelled.
        let task = tokio::spawn(run_cascade(engine, plan, load_timeout));

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ModelLoadError {
                    attempts: vec![LoadAttempt {
                        tier: first_tier,
                        failure: format!("load task aborted: {}", e),
                    }],
                }),
            }
        }
        .boxed()
        .shared()
    }
}

async fn run_cascade(
    engine: Arc<dyn SpeechEngine>,
    plan: Vec<ModelTier>,
    load_timeout: Duration,
) -> LoadOutcome {
    let mut attempts = Vec::with_capacity(plan.len());

    for tier in plan {
        info!("Loading {} model '{}'", engine.name(), tier);
        let started = Instant::now();
        let loader = Arc::clone(&engine);
        let load = tokio::task::spawn_blocking(move || loader.load(tier));

        let failure = match tokio::time::timeout(load_timeout, load).await {
            Ok(Ok(Ok(model))) => {
                info!(
                    "Model '{}' ready in {:.1}s",
                    tier,
                    started.elapsed().as_secs_f64()
                );
                return Ok(EngineHandle::new(tier, model));
            }
            Ok(Ok(Err(e))) => e.to_string(),
            Ok(Err(e)) => format!("loader panicked: {}", e),
            Err(_) => format!("timed out after {}s", load_timeout.as_secs_f64()),
        };

        warn!("Failed to load model '{}': {}", tier, failure);
        attempts.push(LoadAttempt { tier, failure });
    }

    Err(ModelLoadError { attempts })
}
