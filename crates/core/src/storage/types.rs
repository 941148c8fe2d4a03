use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::registry::TargetFormat;

/// Error type for file storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    /// The upload is already claimed by a conversion job.
    #[error("File {0} is already being converted")]
    AlreadyReserved(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),
}

/// A stored upload awaiting conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Opaque handle: a uuid plus the original extension.
    pub id: String,
    /// Client-supplied file name, reduced to its last path component.
    pub original_name: String,
    /// Classified MIME type, or the declared one when classification failed.
    pub mime_type: String,
    pub declared_mime: Option<String>,
    pub size_bytes: u64,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Set once a conversion job has claimed this upload.
    pub reserved: bool,
}

/// A conversion result available for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedFile {
    pub id: String,
    pub job_id: String,
    /// Name offered to the client on download.
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Reduces a client-supplied name to a bare file name.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches('.');
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Lowercase extension of `name`, if it is a plausible one.
fn extension_of(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    let plausible = !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    plausible.then_some(ext)
}

/// New upload handle: `<uuid>.<ext>`, or a bare uuid when the name has no
/// usable extension.
pub fn new_upload_id(original_name: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    match extension_of(original_name) {
        Some(ext) => format!("{}.{}", id, ext),
        None => id,
    }
}

fn stem_of(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("converted")
}

/// Handle of the converted file produced from `upload_id`.
pub fn converted_file_id(upload_id: &str, target: TargetFormat) -> String {
    format!("{}.{}", stem_of(upload_id), target.extension())
}

/// Download name: the original base name with the target extension.
pub fn output_file_name(original_name: &str, target: TargetFormat) -> String {
    format!("{}.{}", stem_of(original_name), target.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\cv.docx"), "cv.docx");
        assert_eq!(sanitize_file_name("  report.pdf "), "report.pdf");
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name(".."), "upload");
    }

    #[test]
    fn test_new_upload_id_keeps_extension() {
        let id = new_upload_id("Holiday.JPG");
        assert!(id.ends_with(".jpg"));
        assert_eq!(id.len(), 36 + 4);
        assert_ne!(new_upload_id("a.jpg"), new_upload_id("a.jpg"));
    }

    #[test]
    fn test_new_upload_id_without_extension() {
        assert_eq!(new_upload_id("README").len(), 36);
        assert_eq!(new_upload_id("weird.ex t").len(), 36);
    }

    #[test]
    fn test_derived_names() {
        assert_eq!(
            converted_file_id("0b9e.png", TargetFormat::Webp),
            "0b9e.webp"
        );
        assert_eq!(
            output_file_name("holiday photo.png", TargetFormat::Jpg),
            "holiday photo.jpg"
        );
        assert_eq!(output_file_name("archive.tar.gz", TargetFormat::Pdf), "archive.tar.pdf");
    }
}
