//! Dispatch table from `(source type, target format)` to a converter.
//!
//! The table is plain data. Adding a conversion means adding a row to
//! [`BUILTIN_CONVERSIONS`] and, if needed, a new adapter.

mod types;

pub use types::{ConverterId, TargetFormat, UnknownFormat};

use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

use crate::classifier::SourceType;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Conversion from {source_type} to {target} is not supported")]
    NotSupported { source_type: String, target: String },
}

/// One row of the conversion table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub source: SourceType,
    pub target: TargetFormat,
    pub converter: ConverterId,
}

impl RegistryEntry {
    pub fn new(source: SourceType, target: TargetFormat, converter: ConverterId) -> Self {
        Self {
            source,
            target,
            converter,
        }
    }
}

macro_rules! row {
    ($source:ident => $target:ident via $converter:ident) => {
        (
            SourceType::$source,
            TargetFormat::$target,
            ConverterId::$converter,
        )
    };
}

/// The conversions the service offers out of the box.
pub static BUILTIN_CONVERSIONS: &[(SourceType, TargetFormat, ConverterId)] = &[
    row!(Jpeg => Png via ImageCodec),
    row!(Jpeg => Webp via ImageCodec),
    row!(Png => Jpg via ImageCodec),
    row!(Png => Webp via ImageCodec),
    row!(Webp => Png via ImageCodec),
    row!(Webp => Jpg via ImageCodec),
    row!(Gif => Png via ImageCodec),
    row!(Pdf => Docx via PdfToDocx),
    row!(Docx => Pdf via OfficeSuite),
    row!(Mp3 => Wav via AudioTranscode),
    row!(Mp3 => Ogg via AudioTranscode),
    row!(Mp3 => Flac via AudioTranscode),
    row!(Wav => Mp3 via AudioTranscode),
    row!(Wav => Ogg via AudioTranscode),
    row!(Wav => Flac via AudioTranscode),
    row!(Mp4 => Mp3 via AudioExtract),
];

/// Serializable row for listing the table over the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRoute {
    pub source_mime: String,
    pub targets: Vec<TargetFormat>,
}

/// Read-only lookup over the conversion table.
#[derive(Debug, Clone)]
pub struct ConversionRegistry {
    routes: HashMap<SourceType, Vec<(TargetFormat, ConverterId)>>,
}

impl Default for ConversionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ConversionRegistry {
    /// Registry over [`BUILTIN_CONVERSIONS`].
    pub fn builtin() -> Self {
        Self::from_entries(
            BUILTIN_CONVERSIONS
                .iter()
                .cloned()
                .map(|(source, target, converter)| RegistryEntry::new(source, target, converter)),
        )
    }

    /// Builds a registry from arbitrary rows. A later row for the same pair
    /// replaces the earlier one.
    pub fn from_entries(entries: impl IntoIterator<Item = RegistryEntry>) -> Self {
        let mut routes: HashMap<SourceType, Vec<(TargetFormat, ConverterId)>> = HashMap::new();
        for entry in entries {
            let targets = routes.entry(entry.source).or_default();
            match targets.iter_mut().find(|(t, _)| *t == entry.target) {
                Some(existing) => existing.1 = entry.converter,
                None => targets.push((entry.target, entry.converter)),
            }
        }
        Self { routes }
    }

    /// Targets a source type can be converted into, in table order.
    /// Empty for types the service does not handle.
    pub fn permitted_targets(&self, source: &SourceType) -> Vec<TargetFormat> {
        self.routes
            .get(source)
            .map(|targets| targets.iter().map(|(t, _)| *t).collect())
            .unwrap_or_default()
    }

    /// Converter responsible for `source -> target`.
    pub fn resolve(
        &self,
        source: &SourceType,
        target: TargetFormat,
    ) -> Result<ConverterId, RegistryError> {
        self.routes
            .get(source)
            .and_then(|targets| targets.iter().find(|(t, _)| *t == target))
            .map(|(_, converter)| *converter)
            .ok_or_else(|| RegistryError::NotSupported {
                source_type: source.to_string(),
                target: target.to_string(),
            })
    }

    /// Every converter referenced by the table.
    pub fn converters(&self) -> Vec<ConverterId> {
        let mut ids: Vec<ConverterId> = self
            .routes
            .values()
            .flat_map(|targets| targets.iter().map(|(_, c)| *c))
            .collect();
        ids.sort_by_key(|id| id.as_str());
        ids.dedup();
        ids
    }

    /// The table grouped by source, sorted by MIME type.
    pub fn routes(&self) -> Vec<ConversionRoute> {
        let mut routes: Vec<ConversionRoute> = self
            .routes
            .iter()
            .map(|(source, targets)| ConversionRoute {
                source_mime: source.mime().to_string(),
                targets: targets.iter().map(|(t, _)| *t).collect(),
            })
            .collect();
        routes.sort_by(|a, b| a.source_mime.cmp(&b.source_mime));
        routes
    }
}
