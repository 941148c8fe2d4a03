//! Trait definitions for the converter module.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::ConverterError;
use super::types::{ConversionOutput, ConversionProgress, ConversionRequest};
use crate::registry::ConverterId;

/// Performs one family of conversions, usually by driving an external tool.
#[async_trait]
pub trait ConverterAdapter: Send + Sync {
    /// The registry id this adapter serves.
    fn id(&self) -> ConverterId;

    /// Converts `request.input_path` into `request.output_path`.
    async fn convert(&self, request: &ConversionRequest)
        -> Result<ConversionOutput, ConverterError>;

    /// Converts with progress reporting.
    ///
    /// Adapters that cannot measure progress fall back to [`convert`](Self::convert).
    /// If the receiver is dropped, conversion continues without reporting.
    async fn convert_with_progress(
        &self,
        request: &ConversionRequest,
        _progress_tx: mpsc::Sender<ConversionProgress>,
    ) -> Result<ConversionOutput, ConverterError> {
        self.convert(request).await
    }

    /// Checks that the adapter's tools are available.
    async fn validate(&self) -> Result<(), ConverterError> {
        Ok(())
    }
}
