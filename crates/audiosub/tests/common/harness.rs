use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use audiosub::config::ServiceConfig;
use audiosub::{JobStatus, JobView, StubEngine, TranscriptionService};

/// A running service with its own work directory and a controllable engine.
pub struct TestHarness {
    pub temp: TempDir,
    pub stub: StubEngine,
    pub service: TranscriptionService,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Starts a service after letting the caller adjust the test config.
    pub fn with_config(adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");

        let mut config = ServiceConfig {
            work_directory: temp.path().join("work"),
            worker_count: 2,
            queue_capacity: 8,
            inference_timeout_secs: 5,
            ..ServiceConfig::default()
        };
        config.model.model_directory = temp.path().join("models");
        adjust(&mut config);

        let stub = StubEngine::new();
        let service = TranscriptionService::start(config, Arc::new(stub.clone()))
            .expect("Failed to start service");

        Self {
            temp,
            stub,
            service,
        }
    }

    pub fn inputs_dir(&self) -> PathBuf {
        self.service.config().work_directory.join("inputs")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.service.config().work_directory.join("outputs")
    }

    pub fn input_count(&self) -> usize {
        count_files(&self.inputs_dir())
    }

    pub fn output_count(&self) -> usize {
        count_files(&self.outputs_dir())
    }

    /// Polls until the job reaches a terminal state.
    pub async fn wait_for_terminal(&self, job_id: &str) -> JobView {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let view = self.service.status(job_id).expect("Job disappeared");
            if view.status.is_terminal() {
                return view;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "Job {} stuck in {}",
                job_id,
                view.status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Polls until the job reaches `status`.
    pub async fn wait_for_status(&self, job_id: &str, status: JobStatus) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while self.service.status(job_id).map(|v| v.status).ok() != Some(status) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "Job {} never reached {}",
                job_id,
                status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Zeroed bytes standing in for an audio payload of the given size.
pub fn silent_wav(size: usize) -> Vec<u8> {
    vec![0u8; size]
}

fn count_files(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(Result::ok).count())
        .unwrap_or(0)
}
