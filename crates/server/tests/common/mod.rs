//! Common test utilities for API testing.
//!
//! This module provides a test fixture that builds the full router over
//! temporary storage, a SQLite queue and a running worker pool, so requests
//! can be driven in-process without binding a port.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use convertino_core::{
    config::{ConvertersConfig, DatabaseConfig, ServerConfig, StorageConfig, WorkerConfig},
    AdapterSet, Classifier, Config, ConversionRegistry, ConversionService, ConverterAdapter,
    DiskStorage, FileStore, JobQueue, RetryPolicy, SqliteFileStore,
    SqliteJobQueue, WorkerDeps, WorkerPool,
};

/// Re-export fixtures for test convenience
pub use convertino_core::testing::fixtures;

const BOUNDARY: &str = "convertino-test-boundary";

/// Test fixture for API testing.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_upload() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture
///         .upload("photo.png", "image/png", &fixtures::png_bytes(4, 4))
///         .await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub workers: Arc<WorkerPool>,
    pub queue: Arc<dyn JobQueue>,
    pub files: Arc<dyn FileStore>,
    pub storage: DiskStorage,
    /// Temporary directory for the database and stored files
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Raw response, for endpoints that do not return JSON.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestFixture {
    /// Create a new test fixture with the built-in adapters and running workers.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a fixture whose worker pool is never started, so jobs stay queued.
    pub async fn without_workers() -> Self {
        Self::with_config(TestConfig::without_workers()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
                max_upload_bytes: test_config.max_upload_bytes,
            },
            storage: StorageConfig {
                uploads_dir: temp_dir.path().join("uploads"),
                converted_dir: temp_dir.path().join("converted"),
            },
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            worker: WorkerConfig {
                workers: 2,
                poll_interval_ms: 20,
            },
            ..Default::default()
        };

        let storage = DiskStorage::new(&config.storage);
        storage
            .ensure_dirs()
            .await
            .expect("Failed to create storage dirs");

        let queue: Arc<dyn JobQueue> = Arc::new(
            SqliteJobQueue::new(&db_path, test_config.retry_policy.clone())
                .expect("Failed to create job queue"),
        );
        let files: Arc<dyn FileStore> =
            Arc::new(SqliteFileStore::new(&db_path).expect("Failed to create file store"));

        let mut adapters = AdapterSet::from_config(&ConvertersConfig::default());
        for adapter in &test_config.adapters {
            adapters.insert(Arc::clone(adapter));
        }

        let registry = Arc::new(ConversionRegistry::builtin());
        let service = Arc::new(ConversionService::new(
            Arc::clone(&files),
            Arc::clone(&queue),
            storage.clone(),
            Arc::clone(&registry),
            Classifier::default(),
        ));

        let workers = Arc::new(WorkerPool::new(
            config.worker.clone(),
            WorkerDeps {
                queue: Arc::clone(&queue),
                files: Arc::clone(&files),
                storage: storage.clone(),
                registry,
                adapters,
                classifier: Classifier::default(),
            },
        ));
        if test_config.start_workers {
            workers.start().await;
        }

        let state = Arc::new(convertino_server::state::AppState::new(
            config,
            service,
            Arc::clone(&workers),
        ));
        let router = convertino_server::api::create_router(state);

        Self {
            router,
            workers,
            queue,
            files,
            storage,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let response = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await;
        json_response(response)
    }

    /// Upload a file as the `file` field of a multipart form.
    pub async fn upload(&self, file_name: &str, content_type: &str, bytes: &[u8]) -> TestResponse {
        self.upload_field("file", file_name, content_type, bytes)
            .await
    }

    /// Upload a file under an arbitrary multipart field name.
    pub async fn upload_field(
        &self,
        field: &str,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> TestResponse {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header("Content-Length", body.len())
            .body(Body::from(body))
            .unwrap();

        json_response(self.send(request).await)
    }

    /// GET returning the raw body and headers.
    pub async fn get_raw(&self, path: &str) -> RawResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Upload a file and request a conversion, returning the job id.
    pub async fn submit(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
        target: &str,
    ) -> String {
        let upload = self.upload(file_name, content_type, bytes).await;
        assert_eq!(upload.status, StatusCode::OK, "upload failed: {}", upload.body);
        let file_id = upload.body["file"]["fileId"]
            .as_str()
            .expect("fileId in upload response")
            .to_string();

        let convert = self
            .post(
                "/api/convert",
                serde_json::json!({ "fileId": file_id, "targetFormat": target }),
            )
            .await;
        assert_eq!(
            convert.status,
            StatusCode::ACCEPTED,
            "convert failed: {}",
            convert.body
        );
        convert.body["jobId"]
            .as_str()
            .expect("jobId in convert response")
            .to_string()
    }

    /// Poll the status endpoint until the job is completed or failed.
    pub async fn wait_for_terminal(&self, job_id: &str) -> TestResponse {
        let path = format!("/api/job/{}/status", job_id);
        for _ in 0..200 {
            let response = self.get(&path).await;
            let status = response.body["status"].as_str().unwrap_or_default();
            if status == "completed" || status == "failed" {
                return response;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("job {} did not reach a terminal state", job_id);
    }

    /// Stop the worker pool.
    pub async fn shutdown(&self) {
        if self.workers.is_running() {
            self.workers.stop().await;
        }
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();
        json_response(self.send(request).await)
    }

    async fn send(&self, request: Request<Body>) -> RawResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        RawResponse {
            status,
            headers,
            body,
        }
    }
}

fn json_response(raw: RawResponse) -> TestResponse {
    let body: Value = if raw.body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&raw.body).unwrap_or(Value::Null)
    };

    TestResponse {
        status: raw.status,
        body,
    }
}

/// Configuration for test fixture.
#[derive(Clone)]
pub struct TestConfig {
    /// Start the worker pool with the fixture
    pub start_workers: bool,
    pub max_upload_bytes: usize,
    pub retry_policy: RetryPolicy,
    /// Adapters replacing the built-in ones with the same id
    pub adapters: Vec<Arc<dyn ConverterAdapter>>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            start_workers: true,
            max_upload_bytes: 10 * 1024 * 1024,
            retry_policy: RetryPolicy::immediate(2),
            adapters: Vec::new(),
        }
    }
}

impl TestConfig {
    /// Create config whose workers are never started.
    pub fn without_workers() -> Self {
        Self {
            start_workers: false,
            ..Default::default()
        }
    }

    /// Replace the built-in adapter serving the same id.
    pub fn with_adapter(mut self, adapter: Arc<dyn ConverterAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
