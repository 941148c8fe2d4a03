pub mod classifier;
pub mod config;
pub mod converter;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod service;
pub mod storage;
pub mod testing;
pub mod worker;

pub use classifier::{classify, Classifier, ClassifyError, SourceType};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use converter::{AdapterSet, ConverterAdapter, ConverterError};
pub use error::ServiceError;
pub use queue::{
    FailOutcome, FailureKind, InMemoryJobQueue, Job, JobFailure, JobFilter, JobQueue, JobResult,
    JobSpec, JobState, JobStatus, QueueError, RetryPolicy, SqliteJobQueue,
};
pub use registry::{ConversionRegistry, ConverterId, RegistryError, TargetFormat};
pub use service::{ConversionService, Download, UploadSummary};
pub use storage::{ConvertedFile, DiskStorage, FileStore, SqliteFileStore, UploadedFile};
pub use worker::{JobOutcome, WorkerDeps, WorkerPool, WorkerStatus};
