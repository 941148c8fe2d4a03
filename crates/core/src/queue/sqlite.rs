//! SQLite-backed job queue implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use super::retry::RetryPolicy;
use super::store::{JobFilter, JobQueue, QueueError};
use super::types::{FailOutcome, Job, JobFailure, JobResult, JobSpec, JobState, JobStatus};
use crate::registry::TargetFormat;

const JOB_COLUMNS: &str =
    "id, file_id, target, state, attempts, max_attempts, created_at, updated_at";

fn db_err(e: impl std::fmt::Display) -> QueueError {
    QueueError::Database(e.to_string())
}

/// Fixed-width UTC timestamps so string comparison orders correctly.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_failure(idx, e))
}

pub(crate) fn conversion_failure(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// The `run_after` column mirrors the backoff deadline of a queued job so the
/// claim query can filter on it.
fn run_after(state: &JobState) -> Option<String> {
    match state {
        JobState::Queued {
            retry_after: Some(at),
            ..
        } => Some(format_ts(at)),
        _ => None,
    }
}

/// SQLite-backed job queue.
pub struct SqliteJobQueue {
    conn: Mutex<Connection>,
    policy: RetryPolicy,
}

impl SqliteJobQueue {
    /// Opens (or creates) the queue database at `path`.
    pub fn new(path: &Path, policy: RetryPolicy) -> Result<Self, QueueError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(db_err)?;
        Self::from_connection(conn, policy)
    }

    /// Create an in-memory queue (useful for testing).
    pub fn in_memory(policy: RetryPolicy) -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn, policy)
    }

    fn from_connection(conn: Connection, policy: RetryPolicy) -> Result<Self, QueueError> {
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            policy,
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), QueueError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                file_id TEXT NOT NULL,
                target TEXT NOT NULL,
                state TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL,
                run_after TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_state_type
                ON jobs(json_extract(state, '$.type'), created_at);
            CREATE INDEX IF NOT EXISTS idx_jobs_file_id ON jobs(file_id);
            "#,
        )
        .map_err(db_err)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, QueueError> {
        self.conn
            .lock()
            .map_err(|_| QueueError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let target: String = row.get(2)?;
        let state_json: String = row.get(3)?;
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;

        Ok(Job {
            id: row.get(0)?,
            file_id: row.get(1)?,
            target: target
                .parse::<TargetFormat>()
                .map_err(|e| conversion_failure(2, e))?,
            state: serde_json::from_str::<JobState>(&state_json)
                .map_err(|e| conversion_failure(3, e))?,
            attempts: row.get(4)?,
            max_attempts: row.get(5)?,
            created_at: parse_ts(6, &created_at)?,
            updated_at: parse_ts(7, &updated_at)?,
        })
    }

    fn load(conn: &Connection, id: &str) -> Result<Job, QueueError> {
        conn.query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS),
            params![id],
            Self::row_to_job,
        )
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| QueueError::NotFound(id.to_string()))
    }

    /// Persists `job`, provided its stored state type is still `expected`.
    fn store(conn: &Connection, job: &Job, expected: &str) -> Result<(), QueueError> {
        let state_json = serde_json::to_string(&job.state).map_err(db_err)?;
        let changed = conn
            .execute(
                "UPDATE jobs SET state = ?, attempts = ?, run_after = ?, updated_at = ?
                 WHERE id = ? AND json_extract(state, '$.type') = ?",
                params![
                    state_json,
                    job.attempts,
                    run_after(&job.state),
                    format_ts(&job.updated_at),
                    job.id,
                    expected,
                ],
            )
            .map_err(db_err)?;

        if changed == 0 {
            let current = Self::load(conn, &job.id)?;
            return Err(QueueError::InvalidTransition {
                job_id: job.id.clone(),
                current_state: current.state.state_type().to_string(),
                operation: "update".to_string(),
            });
        }
        Ok(())
    }

    /// Loads a job, applies `apply`, and writes it back under compare-and-set.
    fn transition<T>(
        &self,
        id: &str,
        apply: impl FnOnce(&mut Job) -> Result<T, QueueError>,
    ) -> Result<(Job, T), QueueError> {
        let conn = self.conn()?;
        let mut job = Self::load(&conn, id)?;
        let expected = job.state.state_type();
        let out = apply(&mut job)?;
        Self::store(&conn, &job, expected)?;
        Ok((job, out))
    }
}

impl JobQueue for SqliteJobQueue {
    fn enqueue(&self, spec: JobSpec) -> Result<Job, QueueError> {
        let conn = self.conn()?;
        let job = Job::new(spec, self.policy.max_attempts(), Utc::now());
        let state_json = serde_json::to_string(&job.state).map_err(db_err)?;

        conn.execute(
            "INSERT INTO jobs (id, file_id, target, state, attempts, max_attempts, run_after, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, NULL, ?, ?)",
            params![
                job.id,
                job.file_id,
                job.target.extension(),
                state_json,
                job.attempts,
                job.max_attempts,
                format_ts(&job.created_at),
                format_ts(&job.updated_at),
            ],
        )
        .map_err(db_err)?;

        Ok(job)
    }

    fn get(&self, id: &str) -> Result<Option<Job>, QueueError> {
        let conn = self.conn()?;
        match Self::load(&conn, id) {
            Ok(job) => Ok(Some(job)),
            Err(QueueError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        let conn = self.conn()?;
        let now = Utc::now();

        let candidate = conn
            .query_row(
                &format!(
                    "SELECT {} FROM jobs
                     WHERE json_extract(state, '$.type') = 'queued'
                       AND (run_after IS NULL OR run_after <= ?)
                     ORDER BY created_at ASC, rowid ASC
                     LIMIT 1",
                    JOB_COLUMNS
                ),
                params![format_ts(&now)],
                Self::row_to_job,
            )
            .optional()
            .map_err(db_err)?;

        let Some(mut job) = candidate else {
            return Ok(None);
        };
        job.activate(now)?;
        Self::store(&conn, &job, JobStatus::Queued.as_str())?;
        Ok(Some(job))
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
        let conn = self.conn()?;
        let now = Utc::now();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM jobs WHERE json_extract(state, '$.type') = 'active'",
                JOB_COLUMNS
            ))
            .map_err(db_err)?;
        let stalled = stmt
            .query_map([], Self::row_to_job)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<Job>>>()
            .map_err(db_err)?;
        drop(stmt);

        for mut job in stalled.iter().cloned() {
            job.requeue_stalled(now)?;
            Self::store(&conn, &job, JobStatus::Active.as_str())?;
        }

        Ok(stalled.len())
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError> {
        let conn = self.conn()?;

        let mut conditions = Vec::new();
        let mut values: Vec<String> = Vec::new();
        if let Some(status) = filter.status {
            conditions.push("json_extract(state, '$.type') = ?");
            values.push(status.as_str().to_string());
        }
        if let Some(ref file_id) = filter.file_id {
            conditions.push("file_id = ?");
            values.push(file_id.clone());
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM jobs {} ORDER BY created_at ASC, rowid ASC LIMIT {} OFFSET {}",
            JOB_COLUMNS, where_clause, filter.limit, filter.offset
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let jobs = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), Self::row_to_job)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<Job>>>()
            .map_err(db_err)?;

        Ok(jobs)
    }

    fn counts(&self) -> Result<HashMap<JobStatus, usize>, QueueError> {
        let conn = self.conn()?;
        let mut counts: HashMap<JobStatus, usize> =
            JobStatus::ALL.into_iter().map(|s| (s, 0)).collect();

        let mut stmt = conn
            .prepare("SELECT json_extract(state, '$.type'), COUNT(*) FROM jobs GROUP BY 1")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(db_err)?;

        for row in rows {
            let (state, count) = row.map_err(db_err)?;
            if let Some(status) = JobStatus::parse(&state) {
                counts.insert(status, count.max(0) as usize);
            }
        }

        Ok(counts)
    }
}
