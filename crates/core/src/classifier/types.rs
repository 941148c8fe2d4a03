use std::fmt;

pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Content type of an uploaded file, normalized to one canonical MIME string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceType {
    Jpeg,
    Png,
    Webp,
    Gif,
    Pdf,
    Docx,
    Mp3,
    Wav,
    Ogg,
    Flac,
    Mp4,
    /// Anything the service has no converter for, kept as its lowercase MIME type.
    Other(String),
}

impl SourceType {
    /// Normalizes a MIME string, folding the common aliases onto one variant.
    ///
    /// Parameters such as `; charset=binary` are ignored.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Self::Jpeg,
            "image/png" | "image/x-png" => Self::Png,
            "image/webp" => Self::Webp,
            "image/gif" => Self::Gif,
            "application/pdf" | "application/x-pdf" => Self::Pdf,
            DOCX_MIME => Self::Docx,
            "audio/mpeg" | "audio/mp3" | "audio/mpeg3" | "audio/x-mpeg-3" => Self::Mp3,
            "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => Self::Wav,
            "audio/ogg" | "application/ogg" | "audio/vorbis" => Self::Ogg,
            "audio/flac" | "audio/x-flac" => Self::Flac,
            "video/mp4" | "application/mp4" => Self::Mp4,
            _ => Self::Other(essence),
        }
    }

    /// Canonical MIME type.
    pub fn mime(&self) -> &str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Pdf => "application/pdf",
            Self::Docx => DOCX_MIME,
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Ogg => "audio/ogg",
            Self::Flac => "audio/flac",
            Self::Mp4 => "video/mp4",
            Self::Other(mime) => mime,
        }
    }

    /// Top-level MIME category (`image`, `audio`, ...).
    pub fn category(&self) -> &str {
        category_of(self.mime())
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

pub(crate) fn category_of(mime: &str) -> &str {
    mime.split('/').next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_fold_to_canonical() {
        assert_eq!(SourceType::from_mime("image/jpg"), SourceType::Jpeg);
        assert_eq!(SourceType::from_mime("audio/x-wav"), SourceType::Wav);
        assert_eq!(SourceType::from_mime("audio/x-flac"), SourceType::Flac);
        assert_eq!(SourceType::from_mime("Audio/MP3"), SourceType::Mp3);
        assert_eq!(SourceType::Mp3.mime(), "audio/mpeg");
    }

    #[test]
    fn test_parameters_are_ignored() {
        assert_eq!(
            SourceType::from_mime("application/pdf; charset=binary"),
            SourceType::Pdf
        );
    }

    #[test]
    fn test_unknown_keeps_mime() {
        let other = SourceType::from_mime("text/Plain");
        assert_eq!(other, SourceType::Other("text/plain".to_string()));
        assert_eq!(other.mime(), "text/plain");
        assert_eq!(other.category(), "text");
        assert!(!other.is_known());
    }

    #[test]
    fn test_category() {
        assert_eq!(SourceType::Docx.category(), "application");
        assert_eq!(SourceType::Mp4.category(), "video");
    }
}
