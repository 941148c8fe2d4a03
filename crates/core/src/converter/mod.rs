//! Converter adapters.
//!
//! Each adapter implements [`ConverterAdapter`] for one [`ConverterId`] of the
//! conversion registry and turns an input file into an output file:
//!
//! - [`ImageCodecAdapter`]: raster re-encoding in-process (`image` crate)
//! - [`OfficeSuiteAdapter`]: DOCX to PDF through the LibreOffice CLI
//! - [`PdfToDocxAdapter`]: PDF text extraction written out as DOCX
//! - [`FfmpegAdapter`]: audio transcoding and audio extraction from video
//!
//! # Example
//!
//! ```ignore
//! use convertino_core::converter::{AdapterSet, ConversionRequest};
//!
//! let adapters = AdapterSet::from_config(&config.converters);
//! let adapter = adapters.get(ConverterId::ImageCodec).unwrap();
//! let output = adapter.convert(&request).await?;
//! println!("Converted in {} ms", output.duration_ms);
//! ```

pub mod docx;
mod error;
mod ffmpeg;
mod image_codec;
mod office;
mod pdf_docx;
mod process;
mod traits;
mod types;

pub use error::ConverterError;
pub use ffmpeg::{FfmpegAdapter, FfmpegMode};
pub use image_codec::ImageCodecAdapter;
pub use office::OfficeSuiteAdapter;
pub use pdf_docx::{paragraphs, PdfTextExtractor, PdfToDocxAdapter, TextExtractor};
pub use traits::ConverterAdapter;
pub use types::{ConversionOutput, ConversionProgress, ConversionRequest};

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::config::ConvertersConfig;
use crate::registry::ConverterId;

/// Adapters keyed by the registry id they serve.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<ConverterId, Arc<dyn ConverterAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One adapter for every built-in converter id.
    pub fn from_config(config: &ConvertersConfig) -> Self {
        Self::new()
            .with(Arc::new(ImageCodecAdapter::new()))
            .with(Arc::new(OfficeSuiteAdapter::new(config)))
            .with(Arc::new(PdfToDocxAdapter::new()))
            .with(Arc::new(FfmpegAdapter::transcoder(config)))
            .with(Arc::new(FfmpegAdapter::audio_extractor(config)))
    }

    /// Adds an adapter, replacing any previous one with the same id.
    pub fn with(mut self, adapter: Arc<dyn ConverterAdapter>) -> Self {
        self.insert(adapter);
        self
    }

    pub fn insert(&mut self, adapter: Arc<dyn ConverterAdapter>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn get(&self, id: ConverterId) -> Option<Arc<dyn ConverterAdapter>> {
        self.adapters.get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<ConverterId> {
        let mut ids: Vec<ConverterId> = self.adapters.keys().copied().collect();
        ids.sort_by_key(|id| id.as_str());
        ids
    }

    /// Validates every adapter, logging and returning the ones that are not ready.
    pub async fn validate_all(&self) -> Vec<(ConverterId, ConverterError)> {
        let mut failures = Vec::new();
        for id in self.ids() {
            if let Some(adapter) = self.adapters.get(&id) {
                if let Err(e) = adapter.validate().await {
                    warn!(converter = %id, error = %e, "Converter not available");
                    failures.push((id, e));
                }
            }
        }
        failures
    }
}

impl std::fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSet").field("ids", &self.ids()).finish()
    }
}
