//! Content-type classification of uploaded bytes.
//!
//! Sniffing the content wins over whatever the client declared. The declared
//! type is only a fallback for formats without a recognizable signature.

mod types;

pub use types::{SourceType, DOCX_MIME, OCTET_STREAM};

use thiserror::Error;

use crate::config::ClassifierConfig;
use types::category_of;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    /// Neither the content nor the declared type identify the file.
    #[error("Unable to classify input: {reason}")]
    UnclassifiableInput { reason: String },
}

impl ClassifyError {
    fn unclassifiable(reason: impl Into<String>) -> Self {
        Self::UnclassifiableInput {
            reason: reason.into(),
        }
    }
}

/// Classifies file content, consulting `declared` only when sniffing fails.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    reject_mismatched_declared: bool,
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            reject_mismatched_declared: config.reject_mismatched_declared,
        }
    }

    /// Rejects inputs whose content category contradicts the declared one.
    pub fn strict() -> Self {
        Self {
            reject_mismatched_declared: true,
        }
    }

    pub fn classify(
        &self,
        bytes: &[u8],
        declared: Option<&str>,
    ) -> Result<SourceType, ClassifyError> {
        let declared = declared
            .map(str::trim)
            .filter(|d| !d.is_empty() && !d.eq_ignore_ascii_case(OCTET_STREAM));

        let Some(sniffed) = sniff(bytes) else {
            return match declared {
                Some(mime) => Ok(SourceType::from_mime(mime)),
                None => Err(ClassifyError::unclassifiable(
                    "content has no known signature and no type was declared",
                )),
            };
        };

        if self.reject_mismatched_declared {
            if let Some(mime) = declared {
                let declared_type = SourceType::from_mime(mime);
                let declared_category = category_of(declared_type.mime());
                if declared_category != sniffed.category() {
                    return Err(ClassifyError::unclassifiable(format!(
                        "content looks like {} but was declared as {}",
                        sniffed, declared_type
                    )));
                }
            }
        }

        Ok(sniffed)
    }
}

/// Identifies content by its magic bytes.
fn sniff(bytes: &[u8]) -> Option<SourceType> {
    if bytes.is_empty() {
        return None;
    }

    // DOCX is a ZIP container; check it before the generic archive match.
    if infer::doc::is_docx(bytes) {
        return Some(SourceType::Docx);
    }

    infer::get(bytes).map(|kind| SourceType::from_mime(kind.mime_type()))
}

/// Classifies with the default tolerant policy.
pub fn classify(bytes: &[u8], declared: Option<&str>) -> Result<SourceType, ClassifyError> {
    Classifier::default().classify(bytes, declared)
}
