use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::error::WorkerError;
use crate::jobs::{JobEvent, JobEventBroadcaster, JobStatus, JobStore};
use crate::pipeline::{Pipeline, PipelineContext};
use crate::storage::TempArtifact;

/// A pending job handed to the pool together with its buffered input.
#[derive(Debug)]
pub struct QueuedJob {
    pub job_id: String,
    pub filename: String,
    pub input: TempArtifact,
}

struct WorkerShared {
    pipeline: Arc<Pipeline>,
    store: Arc<JobStore>,
    events: JobEventBroadcaster,
}

/// Fixed set of async workers pulling from a bounded queue.
///
/// Each queued job is received by exactly one worker, which is the only
/// writer of that job's record from then on.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<QueuedJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: AtomicBool,
    capacity: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Worker pool lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl WorkerPool {
    /// Spawns `worker_count` workers on the current runtime.
    ///
    /// # Panics
    /// Panics if `worker_count` or `capacity` is 0.
    pub fn start(
        pipeline: Arc<Pipeline>,
        store: Arc<JobStore>,
        events: JobEventBroadcaster,
        worker_count: usize,
        capacity: usize,
    ) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        assert!(capacity > 0, "capacity must be > 0");

        let (sender, receiver) = mpsc::channel::<QueuedJob>(capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let shared = Arc::new(WorkerShared {
            pipeline,
            store,
            events,
        });

        let workers = (0..worker_count)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let shared = Arc::clone(&shared);
                tokio::spawn(run_worker(worker_id, receiver, shared))
            })
            .collect();

        info!("Started {} workers (queue capacity {})", worker_count, capacity);

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            shutdown: AtomicBool::new(false),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        lock(&self.sender)
            .as_ref()
            .map_or(0, |s| self.capacity - s.capacity())
    }

    /// Queues a job without waiting.
    ///
    /// On rejection the job is dropped, which releases its input artifact.
    pub fn submit(&self, job: QueuedJob) -> Result<(), WorkerError> {
        if self.is_shutdown() {
            return Err(WorkerError::ChannelClosed);
        }

        let sender = lock(&self.sender);
        let Some(sender) = sender.as_ref() else {
            return Err(WorkerError::ChannelClosed);
        };

        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                debug!("Queue full, rejecting job {}", job.job_id);
                Err(WorkerError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(_)) => Err(WorkerError::ChannelClosed),
        }
    }

    /// Stops accepting jobs. Jobs already queued still run.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Release);
        // Dropping the sender closes the channel once the queue drains
        lock(&self.sender).take();
    }

    /// Waits for every worker to finish. Call after `shutdown`.
    pub async fn wait(&self) {
        let workers: Vec<JoinHandle<()>> = lock(&self.workers).drain(..).collect();

        for (i, worker) in workers.into_iter().enumerate() {
            match worker.await {
                Ok(()) => debug!("Worker {} finished", i),
                Err(e) => error!("Worker {} panicked: {}", i, e),
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedJob>>>,
    shared: Arc<WorkerShared>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        let next = receiver.lock().await.recv().await;
        let Some(job) = next else {
            debug!("Worker {} job channel closed", worker_id);
            break;
        };

        debug!("Worker {} processing job {}", worker_id, job.job_id);
        process_job(&shared, job).await;
    }

    debug!("Worker {} stopped", worker_id);
}

async fn process_job(shared: &WorkerShared, queued: QueuedJob) {
    let QueuedJob {
        job_id,
        filename,
        input,
    } = queued;

    match shared.store.update(&job_id, |job| job.start()) {
        Some(Ok(())) => {}
        Some(Err(e)) => {
            error!("Job {} cannot start: {}", job_id, e);
            return;
        }
        None => {
            warn!("Job {} was removed before processing", job_id);
            return;
        }
    }
    shared
        .events
        .send(JobEvent::new(&job_id, &filename, JobStatus::Processing));

    let ctx = PipelineContext::new(Some(&job_id), &filename, input);
    match shared.pipeline.run(ctx).await {
        Ok(output) => {
            let segments = output.summary.segments_count;
            let reference = output.artifact.persist();
            let summary = output.summary;
            let committed = shared
                .store
                .update(&job_id, |job| job.complete(reference.clone(), summary));

            match committed {
                Some(Ok(())) => {
                    info!("Job {} completed ({} segments)", job_id, segments);
                    shared
                        .events
                        .send(JobEvent::completed(&job_id, &filename, segments));
                }
                other => {
                    // The record is gone (expired) or no longer processing,
                    // so nobody else will ever release this output.
                    warn!(
                        "Discarding output of job {}: {}",
                        job_id,
                        match other {
                            Some(Err(e)) => e.to_string(),
                            _ => "job no longer exists".to_string(),
                        }
                    );
                    if let Err(e) = reference.release() {
                        warn!("{}", e);
                    }
                }
            }
        }
        Err(e) => {
            let failure = e.to_failure();
            warn!("Job {} failed: {}", job_id, failure);
            let kind = failure.kind;
            let message = failure.message.clone();
            if shared.store.update(&job_id, |job| job.fail(failure)).is_none() {
                warn!("Job {} was removed while processing", job_id);
            }
            shared
                .events
                .send(JobEvent::failed(&job_id, &filename, kind, &message));
        }
    }
}
