//! PDF to DOCX by text extraction.
//!
//! The result keeps the text only: every non-blank line of extracted text
//! becomes one paragraph. Layout, images and styling are dropped.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::docx;
use super::error::ConverterError;
use super::traits::ConverterAdapter;
use super::types::{ConversionOutput, ConversionRequest};
use crate::registry::{ConverterId, TargetFormat};

/// Extracts plain text from document bytes.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ConverterError>;
}

/// [`TextExtractor`] backed by `pdf-extract`.
#[derive(Debug, Clone, Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ConverterError> {
        pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ConverterError::codec(format!("failed to extract PDF text: {}", e)))
    }
}

/// Splits extracted text into paragraphs: one per line, blank lines removed.
///
/// Line endings may be `\n` or `\r\n`. Otherwise non-blank lines are kept
/// verbatim, including surrounding whitespace.
pub fn paragraphs(text: &str) -> Vec<&str> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
        .collect()
}

/// Converts PDF files into DOCX documents holding their text.
pub struct PdfToDocxAdapter {
    extractor: Arc<dyn TextExtractor>,
}

impl Default for PdfToDocxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfToDocxAdapter {
    pub fn new() -> Self {
        Self::with_extractor(Arc::new(PdfTextExtractor))
    }

    pub fn with_extractor(extractor: Arc<dyn TextExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl ConverterAdapter for PdfToDocxAdapter {
    fn id(&self) -> ConverterId {
        ConverterId::PdfToDocx
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionOutput, ConverterError> {
        if request.target != TargetFormat::Docx {
            return Err(ConverterError::unsupported(
                request.source.to_string(),
                request.target.to_string(),
            ));
        }

        let start = Instant::now();
        let bytes = tokio::fs::read(&request.input_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ConverterError::InputNotFound {
                    path: request.input_path.clone(),
                },
                _ => ConverterError::Io(e),
            })?;

        let extractor = Arc::clone(&self.extractor);
        let output_path = request.output_path.clone();
        let paragraph_count = tokio::task::spawn_blocking(move || {
            let text = extractor.extract_text(&bytes)?;
            let paragraphs = paragraphs(&text);
            docx::write_paragraphs(&output_path, &paragraphs)?;
            Ok::<usize, ConverterError>(paragraphs.len())
        })
        .await
        .map_err(|e| ConverterError::codec(format!("text extraction aborted: {}", e)))??;

        let size_bytes = tokio::fs::metadata(&request.output_path).await?.len();
        debug!(job_id = %request.job_id, paragraph_count, "Wrote DOCX from PDF text");

        Ok(ConversionOutput {
            output_path: request.output_path.clone(),
            size_bytes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
