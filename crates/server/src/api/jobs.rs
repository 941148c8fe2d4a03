//! Conversion request and job status handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use convertino_core::{
    ConverterId, Job, JobFailure, JobFilter, JobResult, JobState, JobStatus,
};

use super::error::{api_error, bad_request, ApiResult};
use crate::state::AppState;

/// Maximum allowed limit for job queries
const MAX_LIMIT: usize = 1000;

/// Default limit for job queries
const DEFAULT_LIMIT: usize = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for `POST /api/convert`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertBody {
    pub file_id: Option<String>,
    pub target_format: Option<String>,
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsParams {
    /// Filter by status (queued, active, completed, failed)
    pub status: Option<String>,
    /// Filter by input file
    pub file_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobStatusResponse>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub success: bool,
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResultBody>,
    /// Set once the job has failed for good.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorBody>,
    /// Failure of the previous attempt while a retry is pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<JobErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<String>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResultBody {
    pub file_id: String,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub converter: ConverterId,
    pub duration_ms: u64,
    pub download_url: String,
}

#[derive(Debug, Serialize)]
pub struct JobErrorBody {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&JobResult> for JobResultBody {
    fn from(result: &JobResult) -> Self {
        Self {
            file_id: result.file_id.clone(),
            file_name: result.file_name.clone(),
            content_type: result.content_type.clone(),
            size: result.size_bytes,
            converter: result.converter,
            duration_ms: result.duration_ms,
            download_url: format!("/api/download/{}", result.file_id),
        }
    }
}

impl From<&JobFailure> for JobErrorBody {
    fn from(failure: &JobFailure) -> Self {
        Self {
            kind: failure.kind.as_str().to_string(),
            message: failure.message.clone(),
            retryable: failure.retryable,
        }
    }
}

impl From<&Job> for JobStatusResponse {
    fn from(job: &Job) -> Self {
        let (result, error, last_error, retry_after) = match &job.state {
            JobState::Completed { result, .. } => {
                (Some(JobResultBody::from(result)), None, None, None)
            }
            JobState::Failed { error, .. } => (None, Some(JobErrorBody::from(error)), None, None),
            JobState::Queued {
                retry_after,
                last_error,
            } => (
                None,
                None,
                last_error.as_ref().map(JobErrorBody::from),
                retry_after.map(|at| at.to_rfc3339()),
            ),
            JobState::Active { .. } => (None, None, None, None),
        };

        Self {
            job_id: job.id.clone(),
            status: job.status(),
            progress: job.progress(),
            result,
            error,
            last_error,
            retry_after,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/convert
///
/// Validate a conversion request and enqueue the job. Conversion itself
/// happens in the worker pool; poll the status endpoint for the outcome.
pub async fn convert(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ConvertBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ConvertResponse>)> {
    let Json(body) = body.map_err(|e| bad_request(e.body_text()))?;

    let job = state
        .service()
        .request_conversion(
            body.file_id.as_deref().unwrap_or_default(),
            body.target_format.as_deref().unwrap_or_default(),
        )
        .map_err(api_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ConvertResponse {
            success: true,
            job_id: job.id.clone(),
            status: job.status(),
        }),
    ))
}

/// GET /api/job/{job_id}/status
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state.service().job_status(&job_id).map_err(api_error)?;
    Ok(Json(JobStatusResponse::from(&job)))
}

/// GET /api/jobs
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> ApiResult<Json<ListJobsResponse>> {
    let mut filter = JobFilter::new()
        .with_limit(params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT))
        .with_offset(params.offset.unwrap_or(0));

    if let Some(status) = params.status.as_deref() {
        let status = JobStatus::parse(status)
            .ok_or_else(|| bad_request(format!("Unknown job status: {}", status)))?;
        filter = filter.with_status(status);
    }
    if let Some(file_id) = params.file_id {
        filter = filter.with_file_id(file_id);
    }

    let jobs: Vec<JobStatusResponse> = state
        .service()
        .list_jobs(&filter)
        .map_err(api_error)?
        .iter()
        .map(JobStatusResponse::from)
        .collect();

    Ok(Json(ListJobsResponse {
        count: jobs.len(),
        jobs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use convertino_core::{FailureKind, JobSpec, TargetFormat};

    fn job() -> Job {
        Job::new(JobSpec::new("file-1.png", TargetFormat::Webp), 3, Utc::now())
    }

    #[test]
    fn test_queued_job_has_no_result_or_error() {
        let body = serde_json::to_value(JobStatusResponse::from(&job())).unwrap();
        assert_eq!(body["status"], "queued");
        assert_eq!(body["attempts"], 0);
        assert_eq!(body["maxAttempts"], 3);
        assert!(body.get("result").is_none());
        assert!(body.get("error").is_none());
        assert!(body.get("progress").is_none());
    }

    #[test]
    fn test_failed_job_exposes_kind_and_message() {
        let mut job = job();
        job.state = JobState::Failed {
            error: JobFailure::new(FailureKind::InputMissing, "upload vanished"),
            failed_at: Utc::now(),
        };
        let body = serde_json::to_value(JobStatusResponse::from(&job)).unwrap();
        assert_eq!(body["status"], "failed");
        assert_eq!(body["error"]["kind"], "input_missing");
        assert_eq!(body["error"]["message"], "upload vanished");
        assert_eq!(body["error"]["retryable"], false);
    }

    #[test]
    fn test_completed_job_links_download() {
        let mut job = job();
        job.state = JobState::Completed {
            result: JobResult {
                file_id: "out-1.webp".into(),
                file_name: "photo.webp".into(),
                content_type: "image/webp".into(),
                size_bytes: 42,
                converter: ConverterId::ImageCodec,
                duration_ms: 7,
            },
            completed_at: Utc::now(),
        };
        let body = serde_json::to_value(JobStatusResponse::from(&job)).unwrap();
        assert_eq!(body["progress"], 100);
        assert_eq!(body["result"]["fileName"], "photo.webp");
        assert_eq!(body["result"]["downloadUrl"], "/api/download/out-1.webp");
    }

    #[test]
    fn test_retry_pending_reports_last_error() {
        let mut job = job();
        job.state = JobState::Queued {
            retry_after: Some(Utc::now()),
            last_error: Some(JobFailure::new(FailureKind::ConverterError, "tool crashed")),
        };
        let body = serde_json::to_value(JobStatusResponse::from(&job)).unwrap();
        assert_eq!(body["status"], "queued");
        assert!(body.get("error").is_none());
        assert_eq!(body["lastError"]["kind"], "converter_error");
        assert!(body["retryAfter"].is_string());
    }
}
