//! Status of running and finished units of work.

use dashmap::DashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

pub type JobId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Completed,
    Failed(String),
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
}

#[derive(Debug)]
struct JobRecord {
    name: String,
    status: JobStatus,
    cancel: CancellationToken,
}

/// Job id to status, shared by every unit of work the engine runs.
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: DashMap<JobId, JobRecord>,
    next_id: AtomicU64,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running job. The returned token is cancelled by
    /// [`cancel()`](Self::cancel).
    pub fn start(&self, name: impl Into<String>) -> (JobId, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let name = name.into();
        tracing::debug!(job = id, %name, "job started");
        self.jobs.insert(
            id,
            JobRecord {
                name,
                status: JobStatus::Running,
                cancel: cancel.clone(),
            },
        );
        (id, cancel)
    }

    /// Record how a job ended. A job whose token was cancelled counts as
    /// cancelled whatever it returned.
    pub fn finish<T, E: Display>(&self, id: JobId, result: &Result<T, E>) {
        let Some(mut job) = self.jobs.get_mut(&id) else {
            return;
        };
        job.status = match result {
            _ if job.cancel.is_cancelled() => JobStatus::Cancelled,
            Ok(_) => JobStatus::Completed,
            Err(err) => JobStatus::Failed(err.to_string()),
        };
        tracing::debug!(job = id, name = %job.name, status = ?job.status, "job finished");
    }

    /// Ask a running job to stop at its next checkpoint. Returns `false` if
    /// there is no such job or it already finished.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.jobs.get(&id) {
            Some(job) if !job.status.is_finished() => {
                job.cancel.cancel();
                true
            },
            _ => false,
        }
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.jobs.get(&id).map(|job| job.status.clone())
    }

    /// Every known job, oldest first.
    pub fn list(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self
            .jobs
            .iter()
            .map(|job| JobInfo {
                id: *job.key(),
                name: job.name.clone(),
                status: job.status.clone(),
            })
            .collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }

    /// Forget all but the `keep` most recent finished jobs. Running jobs
    /// are never removed. Returns how many were removed.
    pub fn prune_finished(&self, keep: usize) -> usize {
        let mut finished: Vec<JobId> =
            self.jobs.iter().filter(|job| job.status.is_finished()).map(|job| *job.key()).collect();
        if finished.len() <= keep {
            return 0;
        }
        finished.sort_unstable();
        let stale = finished.len() - keep;
        for id in &finished[..stale] {
            self.jobs.remove(id);
        }
        tracing::debug!(removed = stale, "pruned finished jobs");
        stale
    }
}
