//! Worker pool implementation.
//!
//! Each worker loop polls the queue, claims one job at a time and processes it
//! in its own task, so a panicking adapter takes down that job only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::classifier::Classifier;
use crate::config::WorkerConfig;
use crate::converter::{AdapterSet, ConversionProgress, ConversionRequest};
use crate::metrics;
use crate::queue::{FailOutcome, FailureKind, Job, JobFailure, JobQueue, JobResult};
use crate::registry::ConversionRegistry;
use crate::storage::{
    converted_file_id, output_file_name, remove_dir_if_exists, ConvertedFile, DiskStorage,
    FileStore,
};

use super::guard::InputGuard;
use super::types::{JobOutcome, PoolStats, WorkerError, WorkerStatus};

/// Everything a worker needs to process a job.
#[derive(Clone)]
pub struct WorkerDeps {
    pub queue: Arc<dyn JobQueue>,
    pub files: Arc<dyn FileStore>,
    pub storage: DiskStorage,
    pub registry: Arc<ConversionRegistry>,
    pub adapters: AdapterSet,
    pub classifier: Classifier,
}

struct Shared {
    deps: WorkerDeps,
    stats: PoolStats,
}

/// Pool of workers consuming the job queue.
pub struct WorkerPool {
    config: WorkerConfig,
    shared: Arc<Shared>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(config: WorkerConfig, deps: WorkerDeps) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            shared: Arc::new(Shared {
                deps,
                stats: PoolStats::default(),
            }),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Start the worker loops.
    ///
    /// Jobs left `active` by a previous process are returned to the queue
    /// first; no worker of this pool can be holding them yet.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Worker pool already running");
            return;
        }

        info!(workers = self.config.workers, "Starting worker pool");

        if let Err(e) = self.recover_stalled() {
            error!(error = %e, "Failed to recover stalled jobs");
        }

        let mut handles = self.handles.lock().await;
        for index in 0..self.config.workers {
            handles.push(self.spawn_worker(index));
        }

        info!("Worker pool started");
    }

    /// Stop the worker loops, waiting for jobs in progress to finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Worker pool not running");
            return;
        }

        info!("Stopping worker pool");

        let _ = self.shutdown_tx.send(());

        let handles = std::mem::take(&mut *self.handles.lock().await);
        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task ended abnormally");
            }
        }

        info!("Worker pool stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> WorkerStatus {
        self.shared
            .stats
            .to_status(self.is_running(), self.config.workers)
    }

    /// Moves every `active` job back to `queued`.
    pub fn recover_stalled(&self) -> Result<usize, WorkerError> {
        let recovered = self.shared.deps.queue.recover_stalled()?;
        if recovered > 0 {
            metrics::JOBS_RECOVERED.inc_by(recovered as u64);
            info!(count = recovered, "Recovered stalled jobs");
        }
        Ok(recovered)
    }

    /// Claims and processes one job. `None` when nothing is runnable.
    pub async fn process_next(&self) -> Result<Option<JobOutcome>, WorkerError> {
        self.shared.process_next().await
    }

    fn spawn_worker(&self, index: usize) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            debug!(worker = index, "Worker started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(worker = index, "Worker received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(poll_interval) => {
                        // Drain everything runnable before sleeping again.
                        while running.load(Ordering::Relaxed) {
                            match shared.process_next().await {
                                Ok(Some(_)) => continue,
                                Ok(None) => break,
                                Err(e) => {
                                    warn!(worker = index, error = %e, "Failed to claim job");
                                    break;
                                }
                            }
                        }
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                    }
                }
            }
            debug!(worker = index, "Worker stopped");
        })
    }
}

impl Shared {
    async fn process_next(self: &Arc<Self>) -> Result<Option<JobOutcome>, WorkerError> {
        let Some(job) = self.deps.queue.claim_next()? else {
            return Ok(None);
        };

        let job_id = job.id.clone();
        let attempt = job.attempts;
        info!(
            job_id = %job.id,
            file_id = %job.file_id,
            target = %job.target,
            attempt,
            max_attempts = job.max_attempts,
            "Processing job"
        );

        self.stats.active.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(self);
        let outcome = match tokio::spawn(async move { shared.run_job(job).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = panic_message(e);
                error!(job_id = %job_id, reason = %reason, "Job task crashed");
                self.report_failure(
                    &job_id,
                    JobFailure::internal(format!("Job crashed: {}", reason)),
                    None,
                )
            }
        };

        let work_dir = self.deps.storage.work_dir(&job_id, attempt);
        if let Err(e) = remove_dir_if_exists(&work_dir).await {
            warn!(job_id = %job_id, error = %e, "Failed to remove work directory");
        }

        self.stats.active.fetch_sub(1, Ordering::Relaxed);
        self.stats.record(&outcome);
        metrics::JOB_OUTCOMES
            .with_label_values(&[outcome.label()])
            .inc();

        Ok(Some(outcome))
    }

    async fn run_job(&self, job: Job) -> JobOutcome {
        let mut guard = InputGuard::new(
            Arc::clone(&self.deps.files),
            job.file_id.clone(),
            self.deps.storage.upload_path(&job.file_id),
        );

        match self.convert(&job, &mut guard).await {
            Ok(result) => {
                let file_id = result.file_id.clone();
                match self.deps.queue.mark_completed(&job.id, result) {
                    Ok(_) => {
                        info!(job_id = %job.id, file_id = %file_id, "Job completed");
                        JobOutcome::Completed {
                            job_id: job.id,
                            file_id,
                        }
                    }
                    Err(e) => {
                        guard.disarm();
                        error!(job_id = %job.id, error = %e, "Failed to record job completion");
                        JobOutcome::Unreported { job_id: job.id }
                    }
                }
            }
            Err(failure) => self.report_failure(&job.id, failure, Some(&mut guard)),
        }
    }

    /// Runs the conversion for a claimed job and records the converted file.
    async fn convert(&self, job: &Job, guard: &mut InputGuard) -> Result<JobResult, JobFailure> {
        let upload = match self.deps.files.get_upload(&job.file_id) {
            Ok(Some(upload)) => upload,
            Ok(None) => {
                return Err(JobFailure::new(
                    FailureKind::InputMissing,
                    format!("Upload {} no longer exists", job.file_id),
                ))
            }
            Err(e) => {
                return Err(JobFailure::internal(format!(
                    "Failed to load upload {}: {}",
                    job.file_id, e
                )))
            }
        };
        guard.set_path(upload.path.clone());

        let bytes = match tokio::fs::read(guard.path()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(JobFailure::new(
                    FailureKind::InputMissing,
                    format!("Input file for {} is missing", job.file_id),
                ))
            }
            Err(e) => {
                return Err(JobFailure::internal(format!(
                    "Failed to read input {}: {}",
                    job.file_id, e
                )))
            }
        };

        // The stored classification may be stale or client-supplied.
        let source = self
            .deps
            .classifier
            .classify(&bytes, upload.declared_mime.as_deref())
            .map_err(|e| JobFailure::new(FailureKind::UnclassifiableInput, e.to_string()))?;
        drop(bytes);

        let converter = self
            .deps
            .registry
            .resolve(&source, job.target)
            .map_err(|e| JobFailure::new(FailureKind::UnsupportedConversion, e.to_string()))?;
        let adapter = self.deps.adapters.get(converter).ok_or_else(|| {
            JobFailure::new(
                FailureKind::UnsupportedConversion,
                format!("No adapter registered for {}", converter),
            )
        })?;

        let work_dir = self
            .deps
            .storage
            .create_work_dir(&job.id, job.attempts)
            .await
            .map_err(|e| JobFailure::internal(format!("Failed to create work directory: {}", e)))?;

        let request = ConversionRequest {
            job_id: job.id.clone(),
            input_path: upload.path.clone(),
            output_path: work_dir.join(format!("output.{}", job.target.extension())),
            work_dir,
            source: source.clone(),
            target: job.target,
        };

        debug!(
            job_id = %job.id,
            source = %source,
            target = %job.target,
            converter = %converter,
            "Invoking converter"
        );

        let (progress_tx, progress_rx) = mpsc::channel(16);
        let forwarder =
            spawn_progress_forwarder(Arc::clone(&self.deps.queue), job.id.clone(), progress_rx);

        let started = Instant::now();
        let converted = adapter.convert_with_progress(&request, progress_tx).await;
        let _ = forwarder.await;

        metrics::CONVERSION_DURATION
            .with_label_values(&[
                converter.as_str(),
                if converted.is_ok() { "success" } else { "failed" },
            ])
            .observe(started.elapsed().as_secs_f64());

        let output = converted.map_err(|e| {
            warn!(
                job_id = %job.id,
                converter = %converter,
                attempt = job.attempts,
                error = %e,
                "Conversion failed"
            );
            JobFailure::from(&e)
        })?;

        let file_id = converted_file_id(&upload.id, job.target);
        let path = self
            .deps
            .storage
            .promote(&output.output_path, &file_id)
            .await
            .map_err(|e| JobFailure::internal(format!("Failed to store output: {}", e)))?;

        let file_name = output_file_name(&upload.original_name, job.target);
        let content_type = job.target.content_type().to_string();
        self.deps
            .files
            .insert_converted(&ConvertedFile {
                id: file_id.clone(),
                job_id: job.id.clone(),
                file_name: file_name.clone(),
                content_type: content_type.clone(),
                size_bytes: output.size_bytes,
                path,
                created_at: Utc::now(),
            })
            .map_err(|e| JobFailure::internal(format!("Failed to record output: {}", e)))?;

        Ok(JobResult {
            file_id,
            file_name,
            content_type,
            size_bytes: output.size_bytes,
            converter,
            duration_ms: output.duration_ms,
        })
    }

    /// Reports a failed attempt. The input survives only when the job goes
    /// back to the queue or its state could not be updated.
    fn report_failure(
        &self,
        job_id: &str,
        failure: JobFailure,
        guard: Option<&mut InputGuard>,
    ) -> JobOutcome {
        let kind = failure.kind;
        let message = failure.message.clone();

        match self.deps.queue.mark_failed(job_id, failure) {
            Ok(FailOutcome::Requeued {
                attempt,
                retry_after,
            }) => {
                if let Some(guard) = guard {
                    guard.disarm();
                }
                metrics::JOB_RETRIES.inc();
                info!(
                    job_id = %job_id,
                    attempt,
                    retry_after = %retry_after,
                    kind = %kind,
                    "Job requeued for retry"
                );
                JobOutcome::Requeued {
                    job_id: job_id.to_string(),
                    attempt,
                }
            }
            Ok(FailOutcome::Failed) => {
                metrics::JOB_FAILURES.with_label_values(&[kind.as_str()]).inc();
                warn!(job_id = %job_id, kind = %kind, error = %message, "Job failed");
                JobOutcome::Failed {
                    job_id: job_id.to_string(),
                    kind,
                }
            }
            Err(e) => {
                if let Some(guard) = guard {
                    guard.disarm();
                }
                error!(job_id = %job_id, error = %e, "Failed to record job failure");
                JobOutcome::Unreported {
                    job_id: job_id.to_string(),
                }
            }
        }
    }
}

/// Copies adapter progress onto the job until the adapter drops its sender.
fn spawn_progress_forwarder(
    queue: Arc<dyn JobQueue>,
    job_id: String,
    mut progress_rx: mpsc::Receiver<ConversionProgress>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = 0u8;
        while let Some(progress) = progress_rx.recv().await {
            let percent = progress.percent.round().clamp(0.0, 100.0) as u8;
            if percent <= last {
                continue;
            }
            last = percent;
            if let Err(e) = queue.set_progress(&job_id, percent) {
                debug!(job_id = %job_id, error = %e, "Dropped progress update");
            }
        }
    })
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return "task was cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
