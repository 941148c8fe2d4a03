//! Job types and the job state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::retry::RetryPolicy;
use super::store::QueueError;
use crate::registry::{ConverterId, TargetFormat};

/// Why a job attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The adapter or its tool failed.
    ConverterError,
    /// A tool exited but its output never appeared.
    OutputNotFound,
    /// No converter handles the (re-classified) input and target.
    UnsupportedConversion,
    /// The input content could not be classified.
    UnclassifiableInput,
    /// The uploaded file was gone when the job ran.
    InputMissing,
    /// Anything else, including a crashed job task.
    InternalError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConverterError => "converter_error",
            Self::OutputNotFound => "output_not_found",
            Self::UnsupportedConversion => "unsupported_conversion",
            Self::UnclassifiableInput => "unclassifiable_input",
            Self::InputMissing => "input_missing",
            Self::InternalError => "internal_error",
        }
    }

    /// Transient kinds worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConverterError | Self::OutputNotFound)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure recorded on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
    pub retryable: bool,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InternalError, message)
    }
}

impl From<&crate::converter::ConverterError> for JobFailure {
    fn from(err: &crate::converter::ConverterError) -> Self {
        Self::new(err.failure_kind(), err.detail())
    }
}

/// Descriptor of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Handle for the download endpoint.
    pub file_id: String,
    /// Name offered to the client: original base name plus target extension.
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub converter: ConverterId,
    pub duration_ms: u64,
}

/// Coarse job status exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [Self::Queued, Self::Active, Self::Completed, Self::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job state with the data belonging to each state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a worker. `retry_after` is set when waiting out a backoff.
    Queued {
        #[serde(default)]
        retry_after: Option<DateTime<Utc>>,
        #[serde(default)]
        last_error: Option<JobFailure>,
    },
    /// Claimed by a worker.
    Active {
        started_at: DateTime<Utc>,
        progress: u8,
    },
    Completed {
        result: JobResult,
        completed_at: DateTime<Utc>,
    },
    Failed {
        error: JobFailure,
        failed_at: DateTime<Utc>,
    },
}

impl JobState {
    pub fn queued() -> Self {
        Self::Queued {
            retry_after: None,
            last_error: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            Self::Queued { .. } => JobStatus::Queued,
            Self::Active { .. } => JobStatus::Active,
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }

    /// Returns the state type as a string (matches the serialized `type` tag).
    pub fn state_type(&self) -> &'static str {
        self.status().as_str()
    }

    /// Completed and failed jobs never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Outcome of reporting a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Back in the queue, runnable again at `retry_after`.
    Requeued {
        attempt: u32,
        retry_after: DateTime<Utc>,
    },
    /// Terminal failure.
    Failed,
}

/// A request to enqueue a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub file_id: String,
    pub target: TargetFormat,
}

impl JobSpec {
    pub fn new(file_id: impl Into<String>, target: TargetFormat) -> Self {
        Self {
            file_id: file_id.into(),
            target,
        }
    }
}

/// A conversion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub file_id: String,
    pub target: TargetFormat,
    pub state: JobState,
    /// Attempts started so far.
    pub attempts: u32,
    /// Upper bound on attempts, fixed at enqueue time.
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(spec: JobSpec, max_attempts: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_id: spec.file_id,
            target: spec.target,
            state: JobState::queued(),
            attempts: 0,
            max_attempts: max_attempts.max(1),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    /// Progress percentage: live while active, 100 once completed.
    pub fn progress(&self) -> Option<u8> {
        match &self.state {
            JobState::Active { progress, .. } => Some(*progress),
            JobState::Completed { .. } => Some(100),
            _ => None,
        }
    }

    /// Queued and past any backoff delay.
    pub fn is_runnable(&self, now: DateTime<Utc>) -> bool {
        match &self.state {
            JobState::Queued { retry_after, .. } => retry_after.map_or(true, |at| at <= now),
            _ => false,
        }
    }

    fn invalid(&self, operation: &str) -> QueueError {
        QueueError::InvalidTransition {
            job_id: self.id.clone(),
            current_state: self.state.state_type().to_string(),
            operation: operation.to_string(),
        }
    }

    /// queued -> active, counting a new attempt.
    pub(crate) fn activate(&mut self, now: DateTime<Utc>) -> Result<(), QueueError> {
        if !matches!(self.state, JobState::Queued { .. }) {
            return Err(self.invalid("activate"));
        }
        self.attempts += 1;
        self.state = JobState::Active {
            started_at: now,
            progress: 0,
        };
        self.updated_at = now;
        Ok(())
    }

    pub(crate) fn update_progress(
        &mut self,
        percent: u8,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        if let JobState::Active { progress, .. } = &mut self.state {
            *progress = percent.min(100);
            self.updated_at = now;
            return Ok(());
        }
        Err(self.invalid("set progress of"))
    }

    /// active -> completed.
    pub(crate) fn complete(
        &mut self,
        result: JobResult,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        if !matches!(self.state, JobState::Active { .. }) {
            return Err(self.invalid("complete"));
        }
        self.state = JobState::Completed {
            result,
            completed_at: now,
        };
        self.updated_at = now;
        Ok(())
    }

    /// active -> queued (retry) or active -> failed (terminal).
    pub(crate) fn fail(
        &mut self,
        failure: JobFailure,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailOutcome, QueueError> {
        if !matches!(self.state, JobState::Active { .. }) {
            return Err(self.invalid("fail"));
        }

        self.updated_at = now;
        if failure.retryable && self.attempts < self.max_attempts {
            let retry_after = now + policy.delay_for(self.attempts);
            self.state = JobState::Queued {
                retry_after: Some(retry_after),
                last_error: Some(failure),
            };
            return Ok(FailOutcome::Requeued {
                attempt: self.attempts,
                retry_after,
            });
        }

        self.state = JobState::Failed {
            error: failure,
            failed_at: now,
        };
        Ok(FailOutcome::Failed)
    }

    /// active -> queued after a crash, without waiting for backoff.
    ///
    /// The interrupted attempt is not counted, so `attempts` never exceeds
    /// `max_attempts`.
    pub(crate) fn requeue_stalled(&mut self, now: DateTime<Utc>) -> Result<(), QueueError> {
        if !matches!(self.state, JobState::Active { .. }) {
            return Err(self.invalid("requeue"));
        }
        self.attempts = self.attempts.saturating_sub(1);
        self.state = JobState::queued();
        self.updated_at = now;
        Ok(())
    }
}
