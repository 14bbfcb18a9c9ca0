use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::{DecodeOptions, ModelTier};
use crate::error::ConfigError;

const MIB: u64 = 1024 * 1024;

/// Ten years.
pub const MAX_RETENTION_HOURS: u64 = 24 * 365 * 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_work_directory")]
    pub work_directory: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: u64,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
    #[serde(default)]
    pub release_on_download: bool,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub decoding: DecodeOptions,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub instance: Option<InstanceType>,
}

fn default_work_directory() -> PathBuf {
    std::env::temp_dir().join("audiosub")
}

fn default_max_upload_bytes() -> u64 {
    100 * MIB
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_queue_capacity() -> usize {
    64
}

fn default_inference_timeout_secs() -> u64 {
    300
}

fn default_retention_hours() -> u64 {
    24
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            work_directory: default_work_directory(),
            max_upload_bytes: default_max_upload_bytes(),
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            inference_timeout_secs: default_inference_timeout_secs(),
            retention_hours: default_retention_hours(),
            sweep_interval_secs: None,
            release_on_download: false,
            model: ModelConfig::default(),
            decoding: DecodeOptions::default(),
            memory: MemoryConfig::default(),
            instance: None,
        }
    }
}

impl ServiceConfig {
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn retention(&self) -> Result<chrono::Duration, ConfigError> {
        i64::try_from(self.retention_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| ConfigError::Validation {
                message: format!("retention_hours {} is out of range", self.retention_hours),
            })
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }

    /// Overrides upload ceiling, model tier and memory ceiling with the
    /// values tuned for a deployment size.
    pub fn apply_instance_preset(&mut self, instance: InstanceType) {
        let preset = instance.preset();
        self.instance = Some(instance);
        self.max_upload_bytes = preset.max_upload_bytes;
        self.model.preferred_tier = preset.tier;
        self.model.policy = preset.policy;
        self.memory.critical_mb = Some(preset.memory_limit_mb);
        if self.memory.warning_mb.is_none() {
            self.memory.warning_mb = Some(preset.memory_limit_mb * 8 / 9);
        }
    }
}

/// Strategy for choosing which model tiers to try at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Start at the preferred tier and fall back through every lighter tier.
    #[default]
    Cascade,
    /// Load only the preferred tier.
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_preferred_tier")]
    pub preferred_tier: ModelTier,
    #[serde(default)]
    pub policy: LoadPolicy,
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,
    #[serde(default = "default_model_directory")]
    pub model_directory: PathBuf,
}

fn default_preferred_tier() -> ModelTier {
    ModelTier::Base
}

fn default_load_timeout_secs() -> u64 {
    120
}

fn default_model_directory() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("audiosub")
        .join("models")
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            preferred_tier: default_preferred_tier(),
            policy: LoadPolicy::default(),
            load_timeout_secs: default_load_timeout_secs(),
            model_directory: default_model_directory(),
        }
    }
}

impl ModelConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub warning_mb: Option<u64>,
    #[serde(default)]
    pub critical_mb: Option<u64>,
}

/// Deployment size presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceType {
    Free,
    Starter,
    Standard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstancePreset {
    pub max_upload_bytes: u64,
    pub tier: ModelTier,
    pub policy: LoadPolicy,
    pub memory_limit_mb: u64,
}

impl InstanceType {
    pub fn preset(self) -> InstancePreset {
        match self {
            InstanceType::Free => InstancePreset {
                max_upload_bytes: 10 * MIB,
                tier: ModelTier::Tiny,
                policy: LoadPolicy::Cascade,
                memory_limit_mb: 400,
            },
            // base is the heaviest tier that loads reliably in 512MB
            InstanceType::Starter => InstancePreset {
                max_upload_bytes: 25 * MIB,
                tier: ModelTier::Base,
                policy: LoadPolicy::Fixed,
                memory_limit_mb: 450,
            },
            InstanceType::Standard => InstancePreset {
                max_upload_bytes: 50 * MIB,
                tier: ModelTier::Small,
                policy: LoadPolicy::Cascade,
                memory_limit_mb: 1800,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceType::Free => "free",
            InstanceType::Starter => "starter",
            InstanceType::Standard => "standard",
        }
    }
}

impl FromStr for InstanceType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(InstanceType::Free),
            "starter" => Ok(InstanceType::Starter),
            "standard" => Ok(InstanceType::Standard),
            other => Err(ConfigError::UnknownInstance(other.to_string())),
        }
    }
}

impl std::fmt::Display for InstanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
