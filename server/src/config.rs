use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use audiosub::config::{load_config, ServiceConfig};
use audiosub::{InstanceType, SpeechEngine, StubEngine, WhisperCliEngine};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineKind {
    /// whisper.cpp command line with ffmpeg for decoding
    WhisperCli,
    /// Deterministic engine for dry runs
    Stub,
}

#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Use JSON formatting for tracing
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Log filter, e.g. `info,audiosub=debug`
    #[arg(long, env = "RUST_LOG")]
    pub rust_log: Option<String>,

    /// Server host
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Path to a JSON service config
    #[arg(long, env = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Deployment preset; overrides upload ceiling, model and memory limits
    #[arg(long, env = "INSTANCE_TYPE")]
    pub instance_type: Option<InstanceType>,

    /// Speech engine backend
    #[arg(long, env = "ENGINE", value_enum, default_value = "whisper-cli")]
    pub engine: EngineKind,

    #[arg(long, env = "WHISPER_BIN", default_value = "whisper-cli")]
    pub whisper_bin: PathBuf,

    #[arg(long, env = "FFMPEG_BIN", default_value = "ffmpeg")]
    pub ffmpeg_bin: PathBuf,
}

impl Cli {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Loads the config file if given, then applies the instance preset.
    pub fn service_config(&self) -> anyhow::Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => ServiceConfig::default(),
        };

        if let Some(instance) = self.instance_type {
            config.apply_instance_preset(instance);
        }

        Ok(config)
    }

    pub fn build_engine(&self, config: &ServiceConfig) -> Arc<dyn SpeechEngine> {
        match self.engine {
            EngineKind::WhisperCli => Arc::new(WhisperCliEngine::new(
                &self.whisper_bin,
                &self.ffmpeg_bin,
                &config.model.model_directory,
                config.work_directory.join("scratch"),
            )),
            EngineKind::Stub => Arc::new(StubEngine::new()),
        }
    }
}
