//! Testing utilities and mock implementations.
//!
//! This module provides a mock converter adapter and fixture builders so the
//! job pipeline can be exercised end to end without external tools.
//!
//! # Example
//!
//! ```rust,ignore
//! use convertino_core::testing::{fixtures, MockAdapter};
//!
//! let adapter = Arc::new(MockAdapter::new(ConverterId::ImageCodec));
//! let adapters = AdapterSet::new().with(adapter.clone());
//!
//! let png = fixtures::png_bytes(8, 6);
//! // Upload, convert, run the worker pool...
//! ```

mod mock_adapter;

pub use mock_adapter::{MockAdapter, RecordedCall};

use crate::converter::{ConverterError, TextExtractor};

/// [`TextExtractor`] returning fixed text, for PDF inputs without a real PDF.
#[derive(Debug, Clone)]
pub struct StaticTextExtractor {
    text: String,
}

impl StaticTextExtractor {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl TextExtractor for StaticTextExtractor {
    fn extract_text(&self, _bytes: &[u8]) -> Result<String, ConverterError> {
        Ok(self.text.clone())
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::{Cursor, Read};
    use std::path::Path;

    /// A PNG image with a simple gradient.
    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 30 % 256) as u8, (y * 40 % 256) as u8, 128, 255])
        });
        let mut bytes = Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, ImageFormat::Png)
            .expect("encode png fixture");
        bytes.into_inner()
    }

    /// Bytes carrying a PDF signature. Only useful with a stubbed extractor.
    pub fn pdf_bytes() -> Vec<u8> {
        b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n1 0 obj\n<< /Type /Catalog >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n%%EOF\n"
            .to_vec()
    }

    /// Paragraph texts of a `.docx` file, in document order.
    pub fn docx_paragraphs(path: &Path) -> Vec<String> {
        let bytes = std::fs::read(path).expect("read docx");
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("open docx");
        let mut document = String::new();
        archive
            .by_name("word/document.xml")
            .expect("docx has word/document.xml")
            .read_to_string(&mut document)
            .expect("read document.xml");

        let text = regex_lite::Regex::new(r"<w:t[^>]*>(.*?)</w:t>").expect("valid regex");
        text.captures_iter(&document)
            .map(|c| unescape(&c[1]))
            .collect()
    }

    fn unescape(text: &str) -> String {
        text.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&")
    }

}
