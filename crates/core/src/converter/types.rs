//! Request and result types shared by all adapters.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classifier::SourceType;
use crate::registry::TargetFormat;

/// One conversion to perform.
///
/// `output_path` and `work_dir` are unique to the job attempt, so an adapter
/// may write there freely and a rerun never sees leftovers.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub job_id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Scratch directory for tools that write next to their output.
    pub work_dir: PathBuf,
    pub source: SourceType,
    pub target: TargetFormat,
}

impl ConversionRequest {
    /// File name of the input without its extension.
    pub fn input_stem(&self) -> String {
        file_stem(&self.input_path)
    }
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string())
}

/// Result of a successful conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub output_path: PathBuf,
    pub size_bytes: u64,
    pub duration_ms: u64,
}

/// Progress update sent while a conversion runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionProgress {
    pub job_id: String,
    /// 0.0 to 100.0
    pub percent: f32,
}

impl ConversionProgress {
    pub fn new(job_id: impl Into<String>, percent: f32) -> Self {
        Self {
            job_id: job_id.into(),
            percent: percent.clamp(0.0, 100.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_stem() {
        let request = ConversionRequest {
            job_id: "job".to_string(),
            input_path: PathBuf::from("/uploads/abc-123.report.docx"),
            output_path: PathBuf::from("/work/out.pdf"),
            work_dir: PathBuf::from("/work"),
            source: SourceType::Docx,
            target: TargetFormat::Pdf,
        };
        assert_eq!(request.input_stem(), "abc-123.report");
    }

    #[test]
    fn test_progress_is_clamped() {
        assert_eq!(ConversionProgress::new("j", 140.0).percent, 100.0);
        assert_eq!(ConversionProgress::new("j", -3.0).percent, 0.0);
    }
}
