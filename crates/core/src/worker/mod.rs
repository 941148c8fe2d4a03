//! Worker pool.
//!
//! Workers claim jobs from the [`JobQueue`](crate::queue::JobQueue),
//! re-classify the input, resolve a converter through the registry, run the
//! adapter and report the outcome back to the queue. The input upload is
//! deleted once its job reaches a terminal state, on every exit path.

mod guard;
mod pool;
mod types;

pub use pool::{WorkerDeps, WorkerPool};
pub use types::{JobOutcome, WorkerError, WorkerStatus};
