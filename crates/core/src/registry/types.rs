use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::classifier::DOCX_MIME;

/// Format a client may ask a file to be converted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Jpg,
    Png,
    Webp,
    Pdf,
    Docx,
    Mp3,
    Wav,
    Ogg,
    Flac,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 9] = [
        Self::Jpg,
        Self::Png,
        Self::Webp,
        Self::Pdf,
        Self::Docx,
        Self::Mp3,
        Self::Wav,
        Self::Ogg,
        Self::Flac,
    ];

    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
        }
    }

    /// MIME type of a converted file in this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Pdf => "application/pdf",
            Self::Docx => DOCX_MIME,
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Ogg => "audio/ogg",
            Self::Flac => "audio/flac",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Error returned when a string does not name a target format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFormat(pub String);

impl fmt::Display for UnknownFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown target format: {}", self.0)
    }
}

impl std::error::Error for UnknownFormat {}

impl FromStr for TargetFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "mp3" => Ok(Self::Mp3),
            "wav" => Ok(Self::Wav),
            "ogg" => Ok(Self::Ogg),
            "flac" => Ok(Self::Flac),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

/// Identifies a converter adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConverterId {
    /// Raster image re-encoding.
    ImageCodec,
    /// Word-processing document to PDF via the office suite.
    OfficeSuite,
    /// PDF text extraction into a generated DOCX.
    PdfToDocx,
    /// Audio to audio.
    AudioTranscode,
    /// Audio track pulled out of a video container.
    AudioExtract,
}

impl ConverterId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageCodec => "image_codec",
            Self::OfficeSuite => "office_suite",
            Self::PdfToDocx => "pdf_to_docx",
            Self::AudioTranscode => "audio_transcode",
            Self::AudioExtract => "audio_extract",
        }
    }
}

impl fmt::Display for ConverterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_format() {
        assert_eq!("webp".parse::<TargetFormat>().unwrap(), TargetFormat::Webp);
        assert_eq!("JPEG".parse::<TargetFormat>().unwrap(), TargetFormat::Jpg);
        assert_eq!(".flac".parse::<TargetFormat>().unwrap(), TargetFormat::Flac);
        assert!("bmp".parse::<TargetFormat>().is_err());
        assert!("".parse::<TargetFormat>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ConverterId::PdfToDocx).unwrap();
        assert_eq!(json, "\"pdf_to_docx\"");
        let json = serde_json::to_string(&TargetFormat::Ogg).unwrap();
        assert_eq!(json, "\"ogg\"");
    }
}
