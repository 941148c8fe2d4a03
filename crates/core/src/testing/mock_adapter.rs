//! Mock converter adapter for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::converter::{
    ConversionOutput, ConversionProgress, ConversionRequest, ConverterAdapter, ConverterError,
};
use crate::registry::ConverterId;

/// A recorded adapter invocation for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// The request that was submitted.
    pub request: ConversionRequest,
    /// Whether the conversion succeeded.
    pub success: bool,
}

/// Mock implementation of the ConverterAdapter trait.
///
/// Provides controllable behavior for testing:
/// - Track invocations for assertions
/// - Fail the first N calls with a retryable tool error
/// - Inject a specific error for the next call
/// - Simulate slow conversions and progress updates
/// - Panic mid-conversion
///
/// # Example
///
/// ```rust,ignore
/// use convertino_core::testing::MockAdapter;
///
/// let adapter = MockAdapter::new(ConverterId::ImageCodec);
/// adapter.fail_first(2);
///
/// // ... run jobs through a worker pool ...
///
/// assert_eq!(adapter.call_count().await, 3);
/// ```
#[derive(Debug)]
pub struct MockAdapter {
    id: ConverterId,
    /// Recorded calls.
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    /// Remaining calls that fail with a tool error.
    failures_left: AtomicU32,
    /// If set, the next call fails with this error.
    next_error: Arc<RwLock<Option<ConverterError>>>,
    /// Bytes written to the output path on success.
    output: Arc<RwLock<Vec<u8>>>,
    /// Simulated conversion duration.
    delay: Arc<RwLock<Duration>>,
    panic_on_convert: AtomicBool,
}

impl MockAdapter {
    /// Create a mock serving `id` that always succeeds.
    pub fn new(id: ConverterId) -> Self {
        Self {
            id,
            calls: Arc::new(RwLock::new(Vec::new())),
            failures_left: AtomicU32::new(0),
            next_error: Arc::new(RwLock::new(None)),
            output: Arc::new(RwLock::new(b"converted".to_vec())),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            panic_on_convert: AtomicBool::new(false),
        }
    }

    /// Fail the next `n` calls with a retryable tool error.
    pub fn fail_first(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Fail every call.
    pub fn always_fail(&self) {
        self.fail_first(u32::MAX);
    }

    /// Panic inside every subsequent conversion.
    pub fn panic_on_convert(&self, enabled: bool) {
        self.panic_on_convert.store(enabled, Ordering::SeqCst);
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: ConverterError) {
        *self.next_error.write().await = Some(error);
    }

    /// Set the bytes written on success.
    pub async fn set_output(&self, bytes: impl Into<Vec<u8>>) {
        *self.output.write().await = bytes.into();
    }

    /// Set the simulated conversion duration.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Get all recorded calls.
    pub async fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Get the number of calls made.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    async fn scripted_error(&self) -> Option<ConverterError> {
        if let Some(err) = self.next_error.write().await.take() {
            return Some(err);
        }
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining == 0 {
            return None;
        }
        if remaining != u32::MAX {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
        }
        Some(ConverterError::tool_failed(
            "mock",
            "scripted failure",
            Some("mock: simulated tool crash".to_string()),
        ))
    }

    async fn record(&self, request: &ConversionRequest, success: bool) {
        self.calls.write().await.push(RecordedCall {
            request: request.clone(),
            success,
        });
    }
}

#[async_trait]
impl ConverterAdapter for MockAdapter {
    fn id(&self) -> ConverterId {
        self.id
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionOutput, ConverterError> {
        if self.panic_on_convert.load(Ordering::SeqCst) {
            self.record(request, false).await;
            panic!("mock adapter panicked converting {}", request.job_id);
        }

        if let Some(err) = self.scripted_error().await {
            self.record(request, false).await;
            return Err(err);
        }

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let bytes = self.output.read().await.clone();
        tokio::fs::write(&request.output_path, &bytes).await?;
        self.record(request, true).await;

        Ok(ConversionOutput {
            output_path: request.output_path.clone(),
            size_bytes: bytes.len() as u64,
            duration_ms: delay.as_millis() as u64,
        })
    }

    async fn convert_with_progress(
        &self,
        request: &ConversionRequest,
        progress_tx: mpsc::Sender<ConversionProgress>,
    ) -> Result<ConversionOutput, ConverterError> {
        let _ = progress_tx
            .send(ConversionProgress::new(request.job_id.clone(), 50.0))
            .await;
        let output = self.convert(request).await?;
        let _ = progress_tx
            .send(ConversionProgress::new(request.job_id.clone(), 100.0))
            .await;
        Ok(output)
    }
}
