//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

use crate::queue::FailureKind;

/// Errors that can occur during conversion.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// External tool binary not found.
    #[error("{tool} not found at path: {path}")]
    ToolNotFound { tool: String, path: PathBuf },

    /// External tool ran but reported failure.
    #[error("{tool} failed: {reason}")]
    ToolFailed {
        tool: String,
        reason: String,
        stderr: Option<String>,
    },

    /// External tool did not finish in time and was killed.
    #[error("{tool} timed out after {timeout_secs} seconds")]
    Timeout { tool: String, timeout_secs: u64 },

    /// In-process codec could not decode or encode the content.
    #[error("Codec error: {reason}")]
    Codec { reason: String },

    /// The tool exited but the expected output never appeared.
    #[error("Output not found at {path} after waiting {waited_ms} ms")]
    OutputNotFound { path: PathBuf, waited_ms: u64 },

    /// The adapter was asked for a conversion it does not perform.
    #[error("Adapter cannot convert {source_type} to {target}")]
    Unsupported { source_type: String, target: String },

    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConverterError {
    /// Creates a tool failure with captured stderr.
    pub fn tool_failed(
        tool: impl Into<String>,
        reason: impl Into<String>,
        stderr: Option<String>,
    ) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            reason: reason.into(),
            stderr,
        }
    }

    /// Creates a codec error.
    pub fn codec(reason: impl Into<String>) -> Self {
        Self::Codec {
            reason: reason.into(),
        }
    }

    pub fn unsupported(source_type: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Unsupported {
            source_type: source_type.into(),
            target: target.into(),
        }
    }

    /// Maps the error onto the job failure taxonomy.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::OutputNotFound { .. } => FailureKind::OutputNotFound,
            Self::Unsupported { .. } => FailureKind::UnsupportedConversion,
            Self::InputNotFound { .. } => FailureKind::InputMissing,
            _ => FailureKind::ConverterError,
        }
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.failure_kind().is_retryable()
    }

    /// Message suitable for the job's error field, including a stderr excerpt
    /// when the tool produced one.
    pub fn detail(&self) -> String {
        match self {
            Self::ToolFailed {
                stderr: Some(stderr),
                ..
            } if !stderr.trim().is_empty() => {
                format!("{}: {}", self, tail(stderr.trim(), 500))
            }
            _ => self.to_string(),
        }
    }
}

fn tail(s: &str, max_chars: usize) -> &str {
    let count = s.chars().count();
    if count <= max_chars {
        return s;
    }
    let skip = count - max_chars;
    let idx = s.char_indices().nth(skip).map(|(i, _)| i).unwrap_or(0);
    &s[idx..]
}
