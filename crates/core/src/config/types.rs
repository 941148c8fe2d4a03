use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub converters: ConvertersConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted upload body, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

/// Where uploaded and converted files live on disk.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    #[serde(default = "default_converted_dir")]
    pub converted_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            converted_dir: default_converted_dir(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("data/uploads")
}

fn default_converted_dir() -> PathBuf {
    PathBuf::from("data/converted")
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/convertino.db")
}

/// Retry behaviour of the job queue.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Retries after the first attempt. A job runs at most `max_retries + 1` times.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Number of concurrent worker loops.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// How often an idle worker polls the queue.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_workers() -> usize {
    2
}

fn default_poll_interval_ms() -> u64 {
    500
}

/// Content classification policy.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClassifierConfig {
    /// Reject inputs whose sniffed category contradicts the declared MIME type.
    #[serde(default)]
    pub reject_mismatched_declared: bool,
}

/// External tool configuration for the converter adapters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConvertersConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
    #[serde(default = "default_soffice_path")]
    pub soffice_path: PathBuf,
    /// Timeout for a single external tool invocation.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// How long to wait for a directory-output tool to produce its file.
    #[serde(default = "default_output_wait_ms")]
    pub output_wait_ms: u64,
    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_ffmpeg_log_level")]
    pub ffmpeg_log_level: String,
}

impl Default for ConvertersConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            soffice_path: default_soffice_path(),
            timeout_secs: default_timeout_secs(),
            output_wait_ms: default_output_wait_ms(),
            ffmpeg_log_level: default_ffmpeg_log_level(),
        }
    }
}

impl ConvertersConfig {
    /// Sets the tool timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Sets the output wait in milliseconds.
    pub fn with_output_wait(mut self, output_wait_ms: u64) -> Self {
        self.output_wait_ms = output_wait_ms;
        self
    }

    pub fn with_soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.soffice_path = path.into();
        self
    }
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_soffice_path() -> PathBuf {
    PathBuf::from("soffice")
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_output_wait_ms() -> u64 {
    5_000
}

fn default_ffmpeg_log_level() -> String {
    "warning".to_string()
}

/// Config view returned by the API. Nothing here is secret, but paths to
/// external tools are reduced to their file names.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub classifier: ClassifierConfig,
    pub tools: SanitizedTools,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTools {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub soffice: String,
    pub timeout_secs: u64,
}

fn tool_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            queue: config.queue.clone(),
            worker: config.worker.clone(),
            classifier: config.classifier.clone(),
            tools: SanitizedTools {
                ffmpeg: tool_name(&config.converters.ffmpeg_path),
                ffprobe: tool_name(&config.converters.ffprobe_path),
                soffice: tool_name(&config.converters.soffice_path),
                timeout_secs: config.converters.timeout_secs,
            },
        }
    }
}
