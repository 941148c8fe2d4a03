//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Uploads and job intake
//! - Job outcomes and retries
//! - Converter durations

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Intake Metrics
// =============================================================================

/// Uploads accepted, by whether the content could be classified.
pub static UPLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_uploads_total", "Total uploads accepted"),
        &["classified"], // "true", "false"
    )
    .unwrap()
});

/// Upload sizes in bytes.
pub static UPLOAD_BYTES: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("convertino_upload_bytes", "Size of accepted uploads").buckets(vec![
            1024.0,
            16_384.0,
            131_072.0,
            1_048_576.0,
            8_388_608.0,
            33_554_432.0,
            104_857_600.0,
        ]),
        &[],
    )
    .unwrap()
});

/// Jobs enqueued, by target format.
pub static JOBS_ENQUEUED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_jobs_enqueued_total", "Total conversion jobs enqueued"),
        &["target"],
    )
    .unwrap()
});

/// Convert requests rejected before enqueueing.
pub static CONVERT_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "convertino_convert_rejected_total",
            "Convert requests rejected before a job was created",
        ),
        &["reason"], // "not_found", "unsupported", "conflict", "invalid"
    )
    .unwrap()
});

// =============================================================================
// Worker Metrics
// =============================================================================

/// Finished job attempts, by result.
pub static JOB_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_job_outcomes_total", "Total finished job attempts"),
        &["result"], // "completed", "requeued", "failed"
    )
    .unwrap()
});

/// Terminal failures, by failure kind.
pub static JOB_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_job_failures_total", "Total terminally failed jobs"),
        &["kind"],
    )
    .unwrap()
});

/// Retries scheduled.
pub static JOB_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("convertino_job_retries_total", "Total job retries scheduled").unwrap()
});

/// Jobs recovered from `active` at startup.
pub static JOBS_RECOVERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertino_jobs_recovered_total",
        "Total stalled jobs returned to the queue at startup",
    )
    .unwrap()
});

/// Conversion duration in seconds, by converter and result.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "convertino_conversion_duration_seconds",
            "Duration of converter invocations",
        )
        .buckets(vec![
            0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
        ]),
        &["converter", "result"], // result: "success", "failed"
    )
    .unwrap()
});

/// Input files removed after their job finished.
pub static INPUTS_CLEANED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertino_inputs_cleaned_total",
        "Total input files deleted after a terminal job outcome",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Intake
        Box::new(UPLOADS_TOTAL.clone()),
        Box::new(UPLOAD_BYTES.clone()),
        Box::new(JOBS_ENQUEUED.clone()),
        Box::new(CONVERT_REJECTED.clone()),
        // Worker
        Box::new(JOB_OUTCOMES.clone()),
        Box::new(JOB_FAILURES.clone()),
        Box::new(JOB_RETRIES.clone()),
        Box::new(JOBS_RECOVERED.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(INPUTS_CLEANED.clone()),
    ]
}
