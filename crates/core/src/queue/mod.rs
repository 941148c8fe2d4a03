//! Durable job queue.
//!
//! Jobs move `queued -> active -> completed | failed`. A retryable failure
//! with attempts remaining moves the job back to `queued` behind an
//! exponential backoff. Only the queue mutates job state; workers report
//! outcomes through the [`JobQueue`] API.

mod memory;
mod retry;
mod sqlite;
mod store;
mod types;

pub use memory::InMemoryJobQueue;
pub use retry::RetryPolicy;
pub use sqlite::SqliteJobQueue;
pub use store::{JobFilter, JobQueue, QueueError};
pub use types::{
    FailOutcome, FailureKind, Job, JobFailure, JobResult, JobSpec, JobState, JobStatus,
};

pub(crate) use sqlite::{format_ts, parse_ts};
