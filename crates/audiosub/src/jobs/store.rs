//! In-memory job registry.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::jobs::{Job, JobStatus, JobView};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Process-wide map of jobs, shared by the submission path and workers.
///
/// Each job is only ever mutated by the worker that owns it, so the lock
/// only guards the map itself.
pub struct JobStore {
    jobs: RwLock<HashMap<String, Job>>,
    retention: chrono::Duration,
}

impl JobStore {
    pub fn new(retention: chrono::Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn retention(&self) -> chrono::Duration {
        self.retention
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Job>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Job>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn put(&self, job: Job) {
        self.write().insert(job.id.clone(), job);
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.read().get(job_id).cloned()
    }

    pub fn view(&self, job_id: &str) -> Option<JobView> {
        self.read().get(job_id).map(Job::view)
    }

    /// Applies `f` to the job if it is still present.
    pub fn update<R>(&self, job_id: &str, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        self.write().get_mut(job_id).map(f)
    }

    pub fn remove(&self, job_id: &str) -> Option<Job> {
        self.write().remove(job_id)
    }

    /// Jobs newest first, optionally filtered by status, at most `limit`.
    pub fn list(&self, status: Option<JobStatus>, limit: usize) -> Vec<JobView> {
        let jobs = self.read();
        let mut matching: Vec<&Job> = jobs
            .values()
            .filter(|job| status.map_or(true, |s| job.status == s))
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.into_iter().take(limit).map(Job::view).collect()
    }

    /// Removes every job created before the retention window.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_older_than(Utc::now() - self.retention)
    }

    /// Removes every job created before `cutoff` and releases its output.
    pub fn sweep_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let expired: Vec<Job> = {
            let mut jobs = self.write();
            let ids: Vec<String> = jobs
                .values()
                .filter(|job| job.is_expired(cutoff))
                .map(|job| job.id.clone())
                .collect();
            ids.iter().filter_map(|id| jobs.remove(id)).collect()
        };

        for job in &expired {
            if let Some(output) = &job.output {
                if let Err(e) = output.release() {
                    log::warn!("Failed to release output of expired job {}: {}", job.id, e);
                }
            }
        }

        if !expired.is_empty() {
            log::info!("Swept {} expired job(s)", expired.len());
        }

        expired.len()
    }

    pub fn counts(&self) -> JobCounts {
        let jobs = self.read();
        let mut counts = JobCounts::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new(chrono::Duration::hours(24))
    }
}
