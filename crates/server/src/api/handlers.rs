use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use convertino_core::{
    registry::ConversionRoute, JobQueue, JobStatus, QueueError, SanitizedConfig, WorkerStatus,
};

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

#[derive(Serialize)]
pub struct ConversionsResponse {
    pub conversions: Vec<ConversionRoute>,
}

/// GET /api/conversions
///
/// The conversion table, one row per source type.
pub async fn list_conversions(State(state): State<Arc<AppState>>) -> Json<ConversionsResponse> {
    Json(ConversionsResponse {
        conversions: state.service().conversions(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkersResponse {
    #[serde(flatten)]
    pub pool: WorkerStatus,
    /// Job counts by status. Missing when the queue could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueCounts>,
}

#[derive(Serialize, Default)]
pub struct QueueCounts {
    pub queued: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// GET /api/workers/status
pub async fn worker_status(State(state): State<Arc<AppState>>) -> Json<WorkersResponse> {
    let counts = queue_counts(state.service().queue().as_ref());
    if let Err(ref e) = counts {
        warn!(error = %e, "Failed to count jobs");
    }

    Json(WorkersResponse {
        pool: state.workers().status(),
        queue: counts.ok(),
    })
}

fn queue_counts(queue: &dyn JobQueue) -> Result<QueueCounts, QueueError> {
    Ok(QueueCounts {
        queued: queue.count(Some(JobStatus::Queued))?,
        active: queue.count(Some(JobStatus::Active))?,
        completed: queue.count(Some(JobStatus::Completed))?,
        failed: queue.count(Some(JobStatus::Failed))?,
    })
}

/// GET /metrics
///
/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
