//! Conversion service: the operations behind the HTTP API.
//!
//! Validation that can be done synchronously happens here, before a job is
//! created: unknown files are `NotFound`, pairs without a registry entry are
//! `UnsupportedConversion`, and an upload already claimed by a job is a
//! `Conflict`. Everything after enqueueing is reported through job status.

use std::sync::Arc;
use tracing::{info, warn};

use crate::classifier::{Classifier, SourceType, OCTET_STREAM};
use crate::error::ServiceError;
use crate::metrics;
use crate::queue::{Job, JobFilter, JobQueue, JobSpec};
use crate::registry::{ConversionRegistry, ConversionRoute, TargetFormat};
use crate::storage::{
    new_upload_id, remove_file_if_exists, sanitize_file_name, ConvertedFile, DiskStorage,
    FileStore, StorageError, UploadedFile,
};

/// A stored upload together with the formats it can be converted into.
#[derive(Debug, Clone)]
pub struct UploadSummary {
    pub file: UploadedFile,
    /// Empty when the content could not be classified or has no routes.
    pub conversions: Vec<TargetFormat>,
}

/// An opened converted file, ready to stream.
#[derive(Debug)]
pub struct Download {
    pub file: ConvertedFile,
    pub handle: tokio::fs::File,
}

pub struct ConversionService {
    files: Arc<dyn FileStore>,
    queue: Arc<dyn JobQueue>,
    storage: DiskStorage,
    registry: Arc<ConversionRegistry>,
    classifier: Classifier,
}

impl ConversionService {
    pub fn new(
        files: Arc<dyn FileStore>,
        queue: Arc<dyn JobQueue>,
        storage: DiskStorage,
        registry: Arc<ConversionRegistry>,
        classifier: Classifier,
    ) -> Self {
        Self {
            files,
            queue,
            storage,
            registry,
            classifier,
        }
    }

    pub fn registry(&self) -> &ConversionRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Stores an upload and reports the conversions available for it.
    ///
    /// Content that cannot be classified is still accepted; it simply has no
    /// conversions.
    pub async fn upload(
        &self,
        original_name: Option<&str>,
        declared_mime: Option<&str>,
        bytes: &[u8],
    ) -> Result<UploadSummary, ServiceError> {
        let original_name = sanitize_file_name(original_name.unwrap_or_default());
        let declared_mime = declared_mime
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        let (mime_type, conversions) =
            match self.classifier.classify(bytes, declared_mime.as_deref()) {
                Ok(source) => (
                    source.mime().to_string(),
                    self.registry.permitted_targets(&source),
                ),
                Err(e) => {
                    info!(name = %original_name, reason = %e, "Accepting unclassified upload");
                    (
                        declared_mime
                            .clone()
                            .unwrap_or_else(|| OCTET_STREAM.to_string()),
                        Vec::new(),
                    )
                }
            };

        let id = new_upload_id(&original_name);
        let path = self
            .storage
            .save_upload(&id, bytes)
            .await
            .map_err(|e| ServiceError::internal(format!("Failed to store upload: {}", e)))?;

        let file = UploadedFile {
            id,
            original_name,
            mime_type,
            declared_mime,
            size_bytes: bytes.len() as u64,
            path,
            created_at: chrono::Utc::now(),
            reserved: false,
        };

        if let Err(e) = self.files.insert_upload(&file) {
            if let Err(cleanup) = remove_file_if_exists(&file.path).await {
                warn!(file_id = %file.id, error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }

        metrics::UPLOADS_TOTAL
            .with_label_values(&[if conversions.is_empty() { "false" } else { "true" }])
            .inc();
        metrics::UPLOAD_BYTES
            .with_label_values(&[])
            .observe(file.size_bytes as f64);
        info!(
            file_id = %file.id,
            mime_type = %file.mime_type,
            size = file.size_bytes,
            conversions = conversions.len(),
            "Upload stored"
        );

        Ok(UploadSummary { file, conversions })
    }

    /// Validates a conversion request and enqueues the job.
    pub fn request_conversion(
        &self,
        file_id: &str,
        target_format: &str,
    ) -> Result<Job, ServiceError> {
        let (file_id, target_format) = (file_id.trim(), target_format.trim());
        if file_id.is_empty() || target_format.is_empty() {
            return Err(reject(
                "invalid",
                ServiceError::invalid("fileId and targetFormat are required"),
            ));
        }

        let upload = self
            .files
            .get_upload(file_id)?
            .ok_or_else(|| {
                reject(
                    "not_found",
                    ServiceError::not_found(format!("File not found: {}", file_id)),
                )
            })?;

        let source = SourceType::from_mime(&upload.mime_type);
        let target = target_format.parse::<TargetFormat>().map_err(|_| {
            reject(
                "unsupported",
                ServiceError::UnsupportedConversion(format!(
                    "Conversion from {} to {} is not supported",
                    source, target_format
                )),
            )
        })?;
        self.registry
            .resolve(&source, target)
            .map_err(|e| reject("unsupported", e.into()))?;

        self.files.reserve_upload(file_id).map_err(|e| {
            let reason = match e {
                StorageError::AlreadyReserved(_) => "conflict",
                StorageError::NotFound(_) => "not_found",
                _ => "internal",
            };
            reject(reason, e.into())
        })?;

        let job = match self.queue.enqueue(JobSpec::new(file_id, target)) {
            Ok(job) => job,
            Err(e) => {
                if let Err(release) = self.files.release_upload(file_id) {
                    warn!(file_id = %file_id, error = %release, "Failed to release upload");
                }
                return Err(e.into());
            }
        };

        metrics::JOBS_ENQUEUED
            .with_label_values(&[target.extension()])
            .inc();
        info!(
            job_id = %job.id,
            file_id = %file_id,
            source = %source,
            target = %target,
            "Conversion job enqueued"
        );

        Ok(job)
    }

    /// Current state of a job.
    pub fn job_status(&self, job_id: &str) -> Result<Job, ServiceError> {
        self.queue
            .get(job_id.trim())?
            .ok_or_else(|| ServiceError::not_found(format!("Job not found: {}", job_id)))
    }

    /// Jobs matching `filter`, in enqueue order.
    pub fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, ServiceError> {
        Ok(self.queue.list(filter)?)
    }

    /// Opens a converted file for streaming.
    pub async fn open_download(&self, file_id: &str) -> Result<Download, ServiceError> {
        let not_found = || ServiceError::not_found(format!("File not found: {}", file_id));

        let file = self.files.get_converted(file_id)?.ok_or_else(not_found)?;
        let handle = match tokio::fs::File::open(&file.path).await {
            Ok(handle) => handle,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(file_id = %file_id, path = %file.path.display(), "Converted file missing on disk");
                return Err(not_found());
            }
            Err(e) => {
                return Err(ServiceError::internal(format!(
                    "Failed to open {}: {}",
                    file_id, e
                )))
            }
        };

        Ok(Download { file, handle })
    }

    /// The conversion table, grouped by source type.
    pub fn conversions(&self) -> Vec<ConversionRoute> {
        self.registry.routes()
    }
}

fn reject(reason: &str, err: ServiceError) -> ServiceError {
    metrics::CONVERT_REJECTED.with_label_values(&[reason]).inc();
    err
}
