//! Raster image re-encoding with the `image` crate.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

use super::error::ConverterError;
use super::traits::ConverterAdapter;
use super::types::{ConversionOutput, ConversionRequest};
use crate::registry::{ConverterId, TargetFormat};

/// Decodes any supported raster format and re-encodes it as the target.
#[derive(Debug, Clone, Default)]
pub struct ImageCodecAdapter;

impl ImageCodecAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn image_format(target: TargetFormat) -> Option<ImageFormat> {
    match target {
        TargetFormat::Jpg => Some(ImageFormat::Jpeg),
        TargetFormat::Png => Some(ImageFormat::Png),
        TargetFormat::Webp => Some(ImageFormat::WebP),
        _ => None,
    }
}

/// Blocking decode + encode.
fn transcode(input: &Path, output: &Path, target: TargetFormat) -> Result<(), ConverterError> {
    let format = image_format(target)
        .ok_or_else(|| ConverterError::unsupported("image", target.to_string()))?;

    let bytes = std::fs::read(input).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConverterError::InputNotFound {
            path: input.to_path_buf(),
        },
        _ => ConverterError::Io(e),
    })?;

    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| ConverterError::codec(format!("failed to decode image: {}", e)))?;

    // JPEG has no alpha channel; the lossless WebP and PNG encoders take RGBA.
    let prepared = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(decoded.to_rgb8()),
        _ => DynamicImage::ImageRgba8(decoded.to_rgba8()),
    };

    prepared
        .save_with_format(output, format)
        .map_err(|e| ConverterError::codec(format!("failed to encode {}: {}", target, e)))
}

#[async_trait]
impl ConverterAdapter for ImageCodecAdapter {
    fn id(&self) -> ConverterId {
        ConverterId::ImageCodec
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionOutput, ConverterError> {
        let start = Instant::now();
        let input = request.input_path.clone();
        let output = request.output_path.clone();
        let target = request.target;

        tokio::task::spawn_blocking(move || transcode(&input, &output, target))
            .await
            .map_err(|e| ConverterError::codec(format!("image task aborted: {}", e)))??;

        let size_bytes = tokio::fs::metadata(&request.output_path).await?.len();
        debug!(
            job_id = %request.job_id,
            source = %request.source,
            target = %request.target,
            size_bytes,
            "Image re-encoded"
        );

        Ok(ConversionOutput {
            output_path: request.output_path.clone(),
            size_bytes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
