//! Document conversion through the LibreOffice command line.
//!
//! `soffice --convert-to` writes `<input stem>.<ext>` into an output
//! directory rather than to a path we choose, and it may do so slightly after
//! the process exits. The adapter waits a bounded time for that file and then
//! moves it to the requested output path.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, warn};

use super::error::ConverterError;
use super::process::{probe_tool, run_tool, wait_for_file};
use super::traits::ConverterAdapter;
use super::types::{ConversionOutput, ConversionRequest};
use crate::config::ConvertersConfig;
use crate::registry::{ConverterId, TargetFormat};

const TOOL: &str = "soffice";

/// LibreOffice-backed document converter.
#[derive(Debug, Clone)]
pub struct OfficeSuiteAdapter {
    soffice_path: PathBuf,
    timeout_secs: u64,
    output_wait_ms: u64,
}

impl OfficeSuiteAdapter {
    pub fn new(config: &ConvertersConfig) -> Self {
        Self {
            soffice_path: config.soffice_path.clone(),
            timeout_secs: config.timeout_secs,
            output_wait_ms: config.output_wait_ms,
        }
    }

    fn build_args(&self, request: &ConversionRequest, out_dir: &std::path::Path) -> Vec<String> {
        // A private profile lets several conversions run side by side.
        let profile = request.work_dir.join("lo-profile");
        vec![
            "--headless".to_string(),
            format!("-env:UserInstallation=file://{}", profile.display()),
            "--convert-to".to_string(),
            request.target.extension().to_string(),
            "--outdir".to_string(),
            out_dir.to_string_lossy().to_string(),
            request.input_path.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl ConverterAdapter for OfficeSuiteAdapter {
    fn id(&self) -> ConverterId {
        ConverterId::OfficeSuite
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionOutput, ConverterError> {
        if request.target != TargetFormat::Pdf {
            return Err(ConverterError::unsupported(
                request.source.to_string(),
                request.target.to_string(),
            ));
        }
        if !tokio::fs::try_exists(&request.input_path).await? {
            return Err(ConverterError::InputNotFound {
                path: request.input_path.clone(),
            });
        }

        let start = Instant::now();
        let out_dir = request.work_dir.join("office-out");
        tokio::fs::create_dir_all(&out_dir).await?;

        let mut command = Command::new(&self.soffice_path);
        command.args(self.build_args(request, &out_dir));

        let output = run_tool(TOOL, &self.soffice_path, command, self.timeout_secs).await?;
        debug!(
            job_id = %request.job_id,
            stdout = %String::from_utf8_lossy(&output.stdout).trim(),
            "soffice finished"
        );

        let produced = out_dir.join(format!(
            "{}.{}",
            request.input_stem(),
            request.target.extension()
        ));
        if let Err(e) = wait_for_file(&produced, self.output_wait_ms).await {
            warn!(
                job_id = %request.job_id,
                expected = %produced.display(),
                "soffice exited without producing output"
            );
            return Err(e);
        }

        tokio::fs::rename(&produced, &request.output_path).await?;
        let size_bytes = tokio::fs::metadata(&request.output_path).await?.len();

        Ok(ConversionOutput {
            output_path: request.output_path.clone(),
            size_bytes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        probe_tool(TOOL, &self.soffice_path, "--version").await
    }
}
