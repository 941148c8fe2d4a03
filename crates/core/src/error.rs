//! Errors surfaced synchronously to API callers.

use thiserror::Error;

use crate::queue::QueueError;
use crate::registry::RegistryError;
use crate::storage::StorageError;

/// Error type for [`ConversionService`](crate::service::ConversionService)
/// operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing or malformed request fields.
    #[error("{0}")]
    InvalidRequest(String),

    /// Unknown file or job id.
    #[error("{0}")]
    NotFound(String),

    /// No registry entry for the requested pair.
    #[error("{0}")]
    UnsupportedConversion(String),

    /// The upload is already claimed by another job.
    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable machine-readable name, used as the `kind` of error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::UnsupportedConversion(_) => "unsupported_conversion",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        Self::UnsupportedConversion(err.to_string())
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => Self::NotFound(format!("File not found: {}", id)),
            StorageError::AlreadyReserved(_) => Self::Conflict(err.to_string()),
            StorageError::Io(_) | StorageError::Database(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<QueueError> for ServiceError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NotFound(id) => Self::NotFound(format!("Job not found: {}", id)),
            other => Self::Internal(other.to_string()),
        }
    }
}
