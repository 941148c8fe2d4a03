//! Error responses shared by the API handlers.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::error;

use convertino_core::ServiceError;

/// JSON body of every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub kind: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type ApiResult<T> = Result<T, ApiError>;

pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::InvalidRequest(_) | ServiceError::UnsupportedConversion(_) => {
            StatusCode::BAD_REQUEST
        }
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Conflict(_) => StatusCode::CONFLICT,
        ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Maps a service error onto its status code and JSON body.
pub fn api_error(err: ServiceError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(error = %err, "Request failed");
    }
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: err.to_string(),
            kind: err.kind().to_string(),
        }),
    )
}

/// 400 with an `invalid_request` kind.
pub fn bad_request(message: impl Into<String>) -> ApiError {
    api_error(ServiceError::invalid(message))
}
