//! Job queue trait and supporting types.

use std::collections::HashMap;
use thiserror::Error;

use super::types::{FailOutcome, Job, JobFailure, JobResult, JobSpec, JobStatus};

/// Error type for queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// The job's current state does not allow the operation.
    #[error("Cannot {operation} job {job_id}: current state is {current_state}")]
    InvalidTransition {
        job_id: String,
        current_state: String,
        operation: String,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

/// Filter for listing jobs.
#[derive(Debug, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub file_id: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl JobFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            file_id: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_file_id(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub(crate) fn matches(&self, job: &Job) -> bool {
        self.status.map_or(true, |s| job.status() == s)
            && self.file_id.as_deref().map_or(true, |f| job.file_id == f)
    }
}

/// Durable queue of conversion jobs.
///
/// The queue owns every state transition. Each mutating call is atomic with
/// respect to the job's current state: a transition that is not allowed from
/// that state fails with [`QueueError::InvalidTransition`], and terminal
/// states never change.
pub trait JobQueue: Send + Sync {
    /// Adds a new job in the `queued` state.
    fn enqueue(&self, spec: JobSpec) -> Result<Job, QueueError>;

    /// Looks up a job. Unknown ids are `None`.
    fn get(&self, id: &str) -> Result<Option<Job>, QueueError>;

    /// Atomically claims the oldest runnable queued job, moving it to `active`.
    fn claim_next(&self) -> Result<Option<Job>, QueueError>;

    /// Moves a specific queued job to `active`.
    fn mark_active(&self, id: &str) -> Result<Job, QueueError>;

    /// Records progress (0-100) on an active job.
    fn set_progress(&self, id: &str, progress: u8) -> Result<Job, QueueError>;

    /// Moves an active job to `completed`.
    fn mark_completed(&self, id: &str, result: JobResult) -> Result<Job, QueueError>;

    /// Reports a failed attempt on an active job. Retryable failures with
    /// attempts left are requeued with backoff; everything else is terminal.
    fn mark_failed(&self, id: &str, failure: JobFailure) -> Result<FailOutcome, QueueError>;

    /// Returns every `active` job to `queued`. Called at startup, when no
    /// worker can legitimately hold a job.
    fn recover_stalled(&self) -> Result<usize, QueueError>;

    /// Lists jobs, oldest first.
    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError>;

    /// Number of jobs per status. Every status is present.
    fn counts(&self) -> Result<HashMap<JobStatus, usize>, QueueError>;

    /// Number of jobs in `status`, or of all jobs.
    fn count(&self, status: Option<JobStatus>) -> Result<usize, QueueError> {
        let counts = self.counts()?;
        Ok(match status {
            Some(status) => counts.get(&status).copied().unwrap_or(0),
            None => counts.values().sum(),
        })
    }
}
