//! Types for the worker pool.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::queue::{FailureKind, QueueError};

/// Errors that stop a worker from taking a job at all.
///
/// Failures of a claimed job are never returned here; they are recorded on
/// the job itself.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

/// What happened to a claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed {
        job_id: String,
        file_id: String,
    },
    /// Failed with a retryable error and went back to the queue.
    Requeued { job_id: String, attempt: u32 },
    /// Terminal failure.
    Failed { job_id: String, kind: FailureKind },
    /// The queue rejected the outcome report. The job stays where it was
    /// and is picked up again by stalled-job recovery.
    Unreported { job_id: String },
}

impl JobOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Completed { job_id, .. }
            | Self::Requeued { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Unreported { job_id } => job_id,
        }
    }

    /// The job reached `completed` or `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Requeued { .. } => "requeued",
            Self::Failed { .. } => "failed",
            Self::Unreported { .. } => "unreported",
        }
    }
}

/// Counters shared by all workers of a pool.
#[derive(Debug, Default)]
pub(crate) struct PoolStats {
    pub active: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub retried: AtomicU64,
}

impl PoolStats {
    pub fn record(&self, outcome: &JobOutcome) {
        let counter = match outcome {
            JobOutcome::Completed { .. } => &self.completed,
            JobOutcome::Requeued { .. } => &self.retried,
            JobOutcome::Failed { .. } => &self.failed,
            JobOutcome::Unreported { .. } => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn to_status(&self, running: bool, workers: usize) -> WorkerStatus {
        let completed = self.completed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        WorkerStatus {
            running,
            workers,
            active_jobs: self.active.load(Ordering::Relaxed) as usize,
            total_processed: completed + failed,
            total_completed: completed,
            total_failed: failed,
            total_retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of the worker pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub running: bool,
    pub workers: usize,
    /// Jobs being processed right now.
    pub active_jobs: usize,
    /// Jobs that reached a terminal state.
    pub total_processed: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    /// Attempts that ended in a requeue.
    pub total_retried: u64,
}
