use std::time::Duration;

use crate::config::ServiceConfig;
use crate::engine::DecodeOptions;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub inference_timeout: Duration,
    pub decoding: DecodeOptions,
}

impl PipelineConfig {
    pub fn from_service_config(config: &ServiceConfig) -> Self {
        Self {
            inference_timeout: config.inference_timeout(),
            decoding: config.decoding.clone(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_service_config(&ServiceConfig::default())
    }
}
