//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the convertino server:
//! - HTTP request metrics (latency, counts, in flight)
//! - Job counts by status and worker pool state (collected on scrape)
//! - Core pipeline metrics registered from `convertino_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;
use tracing::warn;

use convertino_core::JobStatus;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "convertino_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "convertino_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Queue and Worker Metrics (collected dynamically)
// =============================================================================

/// Jobs by current status.
pub static JOBS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("convertino_jobs_by_status", "Current job count by status"),
        &["status"],
    )
    .unwrap()
});

/// Worker pool running state (1 = running, 0 = stopped).
pub static WORKERS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "convertino_workers_running",
        "Whether the worker pool is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Configured worker loops.
pub static WORKERS_CONFIGURED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("convertino_workers_configured", "Number of worker loops").unwrap()
});

/// Jobs currently being converted.
pub static WORKERS_ACTIVE_JOBS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "convertino_workers_active_jobs",
        "Number of jobs currently being converted",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Queue and workers
    registry.register(Box::new(JOBS_BY_STATUS.clone())).unwrap();
    registry.register(Box::new(WORKERS_RUNNING.clone())).unwrap();
    registry
        .register(Box::new(WORKERS_CONFIGURED.clone()))
        .unwrap();
    registry
        .register(Box::new(WORKERS_ACTIVE_JOBS.clone()))
        .unwrap();

    // Core metrics (uploads, jobs, conversions)
    for metric in convertino_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the queue and the worker
/// pool at scrape time.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.workers().status();
    WORKERS_RUNNING.set(if status.running { 1 } else { 0 });
    WORKERS_CONFIGURED.set(status.workers as i64);
    WORKERS_ACTIVE_JOBS.set(status.active_jobs as i64);

    let queue = state.service().queue();
    for job_status in JobStatus::ALL {
        match queue.count(Some(job_status)) {
            Ok(count) => JOBS_BY_STATUS
                .with_label_values(&[job_status.as_str()])
                .set(count as i64),
            Err(e) => warn!(status = %job_status, error = %e, "Failed to count jobs"),
        }
    }
}

static UUID_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}(\.[0-9A-Za-z]+)?",
    )
    .unwrap()
});

static NUMERIC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace file and job ids with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_ID.replace_all(path, "{id}");
    let result = NUMERIC_ID.replace_all(&result, "/{id}$1");
    result.to_string()
}
