//! In-memory job queue, for tests and single-process setups that do not need
//! jobs to survive a restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::retry::RetryPolicy;
use super::store::{JobFilter, JobQueue, QueueError};
use super::types::{FailOutcome, Job, JobFailure, JobResult, JobSpec, JobState, JobStatus};

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, Job>,
    /// Job ids in enqueue order.
    order: Vec<String>,
}

/// Job queue held entirely in memory.
pub struct InMemoryJobQueue {
    inner: Mutex<Inner>,
    policy: RetryPolicy,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl InMemoryJobQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            policy,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, QueueError> {
        self.inner
            .lock()
            .map_err(|_| QueueError::Database("queue lock poisoned".to_string()))
    }

    fn transition<T>(
        &self,
        id: &str,
        apply: impl FnOnce(&mut Job) -> Result<T, QueueError>,
    ) -> Result<(Job, T), QueueError> {
        let mut inner = self.lock()?;
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        // Apply to a copy so a rejected transition leaves the job untouched.
        let mut updated = job.clone();
        let out = apply(&mut updated)?;
        *job = updated.clone();
        Ok((updated, out))
    }
}

impl JobQueue for InMemoryJobQueue {
    fn enqueue(&self, spec: JobSpec) -> Result<Job, QueueError> {
        let job = Job::new(spec, self.policy.max_attempts(), Utc::now());
        let mut inner = self.lock()?;
        inner.order.push(job.id.clone());
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    fn get(&self, id: &str) -> Result<Option<Job>, QueueError> {
        Ok(self.lock()?.jobs.get(id).cloned())
    }

    fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        let now = Utc::now();
        let mut inner = self.lock()?;
        let Inner { jobs, order } = &mut *inner;

        for id in order.iter() {
            if let Some(job) = jobs.get_mut(id) {
                if job.is_runnable(now) {
                    job.activate(now)?;
                    return Ok(Some(job.clone()));
                }
            }
        }
        Ok(None)
    }

    fn mark_active(&self, id: &str) -> Result<Job, QueueError> {
        let now = Utc::now();
        self.transition(id, |job| job.activate(now)).map(|(job, _)| job)
    }

    fn set_progress(&self, id: &str, progress: u8) -> Result<Job, QueueError> {
        let now = Utc::now();
        self.transition(id, |job| job.update_progress(progress, now))
            .map(|(job, _)| job)
    }

    fn mark_completed(&self, id: &str, result: JobResult) -> Result<Job, QueueError> {
        let now = Utc::now();
        self.transition(id, |job| job.complete(result, now))
            .map(|(job, _)| job)
    }

    fn mark_failed(&self, id: &str, failure: JobFailure) -> Result<FailOutcome, QueueError> {
        let now = Utc::now();
        let policy = &self.policy;
        self.transition(id, |job| job.fail(failure, policy, now))
            .map(|(_, outcome)| outcome)
    }

    fn recover_stalled(&self) -> Result<usize, QueueError> {
        let now = Utc::now();
        let mut inner = self.lock()?;
        let mut recovered = 0;
        for job in inner.jobs.values_mut() {
            if matches!(job.state, JobState::Active { .. }) {
                job.requeue_stalled(now)?;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError> {
        let inner = self.lock()?;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|job| filter.matches(job))
            .skip(filter.offset)
            .take(filter.limit)
            .cloned()
            .collect())
    }

    fn counts(&self) -> Result<HashMap<JobStatus, usize>, QueueError> {
        let inner = self.lock()?;
        let mut counts: HashMap<JobStatus, usize> =
            JobStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for job in inner.jobs.values() {
            *counts.entry(job.status()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::FailureKind;
    use crate::registry::TargetFormat;
    use std::sync::Arc;

    #[test]
    fn test_claim_respects_order() {
        let queue = InMemoryJobQueue::new(RetryPolicy::immediate(0));
        let a = queue.enqueue(JobSpec::new("a.png", TargetFormat::Jpg)).unwrap();
        let b = queue.enqueue(JobSpec::new("b.png", TargetFormat::Jpg)).unwrap();

        assert_eq!(queue.claim_next().unwrap().unwrap().id, a.id);
        assert_eq!(queue.claim_next().unwrap().unwrap().id, b.id);
        assert!(queue.claim_next().unwrap().is_none());
    }

    #[test]
    fn test_rejected_transition_leaves_job_untouched() {
        let queue = InMemoryJobQueue::new(RetryPolicy::immediate(0));
        let job = queue.enqueue(JobSpec::new("a.png", TargetFormat::Jpg)).unwrap();
        queue.claim_next().unwrap();
        let outcome = queue
            .mark_failed(&job.id, JobFailure::new(FailureKind::ConverterError, "boom"))
            .unwrap();
        assert_eq!(outcome, FailOutcome::Failed);

        let before = queue.get(&job.id).unwrap().unwrap();
        assert!(queue.mark_active(&job.id).is_err());
        assert_eq!(queue.get(&job.id).unwrap().unwrap(), before);
    }

    #[test]
    fn test_unknown_job() {
        let queue = InMemoryJobQueue::default();
        assert!(queue.get("missing").unwrap().is_none());
        assert!(matches!(
            queue.set_progress("missing", 5),
            Err(QueueError::NotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_claims_are_exclusive() {
        let queue = Arc::new(InMemoryJobQueue::default());
        for i in 0..50 {
            queue
                .enqueue(JobSpec::new(format!("{}.wav", i), TargetFormat::Mp3))
                .unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    let mut claimed = Vec::new();
                    while let Some(job) = queue.claim_next().unwrap() {
                        claimed.push(job.id);
                    }
                    claimed
                })
            })
            .collect();

        let mut all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(total, 50);
        assert_eq!(all.len(), 50);
    }
}
