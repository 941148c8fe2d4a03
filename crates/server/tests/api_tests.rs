//! API tests driving the router in-process.
//!
//! These tests exercise the HTTP surface end to end with real storage, a
//! SQLite queue and running workers:
//! - Upload, convert, poll and download
//! - Fail-fast validation at `/api/convert`
//! - Error bodies and status codes
//! - Failed jobs surfaced through the status endpoint

mod common;

use std::sync::Arc;

use axum::http::{header, StatusCode};
use serde_json::json;

use common::{fixtures, TestConfig, TestFixture};
use convertino_core::{testing::MockAdapter, ConverterId, JobStatus};

// =============================================================================
// Service endpoints
// =============================================================================

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/health").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_conversions_lists_registry_table() {
    let fixture = TestFixture::without_workers().await;

    let response = fixture.get("/api/conversions").await;
    assert_status!(response, StatusCode::OK);

    let rows = response.body["conversions"].as_array().unwrap();
    let png = rows
        .iter()
        .find(|row| row["sourceMime"] == "image/png")
        .expect("png row");
    let targets: Vec<&str> = png["targets"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t.as_str())
        .collect();
    assert!(targets.contains(&"webp"));
    assert!(targets.contains(&"jpg"));
}

#[tokio::test]
async fn test_workers_status_reports_pool_and_queue() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/workers/status").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["running"], true);
    assert_eq!(response.body["workers"], 2);
    assert_eq!(response.body["queue"]["queued"], 0);

    fixture.shutdown().await;
}

#[tokio::test]
async fn test_config_endpoint() {
    let fixture = TestFixture::without_workers().await;

    let response = fixture.get("/api/config").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["worker"]["workers"], 2);
    assert_eq!(response.body["tools"]["soffice"], "soffice");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::without_workers().await;
    fixture.get("/api/health").await;

    let response = fixture.get_raw("/metrics").await;
    assert_eq!(response.status, StatusCode::OK);
    let text = String::from_utf8(response.body.to_vec()).unwrap();
    assert!(text.contains("convertino_http_requests_total"));
    assert!(text.contains("convertino_jobs_by_status"));
}

// =============================================================================
// Upload
// =============================================================================

#[tokio::test]
async fn test_upload_png_reports_conversions() {
    let fixture = TestFixture::without_workers().await;

    let response = fixture
        .upload("photo.png", "image/png", &fixtures::png_bytes(8, 6))
        .await;
    assert_status!(response, StatusCode::OK);

    let file = &response.body["file"];
    assert_eq!(response.body["success"], true);
    assert_eq!(file["originalName"], "photo.png");
    assert_eq!(file["mimetype"], "image/png");
    assert!(file["size"].as_u64().unwrap() > 0);
    assert!(file["fileId"].as_str().unwrap().ends_with(".png"));

    let conversions = file["conversions"].as_array().unwrap();
    assert!(conversions.contains(&json!("webp")));
    assert!(!conversions.contains(&json!("docx")));
}

#[tokio::test]
async fn test_upload_unknown_type_has_no_conversions() {
    let fixture = TestFixture::without_workers().await;

    let response = fixture
        .upload("notes.txt", "text/plain", b"just a few words")
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["file"]["mimetype"], "text/plain");
    assert_eq!(response.body["file"]["conversions"], json!([]));
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let fixture = TestFixture::without_workers().await;

    let response = fixture
        .upload_field("attachment", "photo.png", "image/png", &fixtures::png_bytes(2, 2))
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.body["kind"], "invalid_request");
}

#[tokio::test]
async fn test_upload_over_limit_is_rejected() {
    let fixture = TestFixture::with_config(TestConfig {
        start_workers: false,
        max_upload_bytes: 1024,
        ..Default::default()
    })
    .await;

    let response = fixture
        .upload("big.bin", "application/octet-stream", &vec![7u8; 8 * 1024])
        .await;
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
}

// =============================================================================
// Convert
// =============================================================================

#[tokio::test]
async fn test_png_to_webp_end_to_end() {
    let fixture = TestFixture::new().await;

    let job_id = fixture
        .submit("photo.png", "image/png", &fixtures::png_bytes(8, 6), "webp")
        .await;

    let status = fixture.wait_for_terminal(&job_id).await;
    assert_status!(status, StatusCode::OK);
    assert_eq!(status.body["jobId"], job_id.as_str());
    assert_eq!(status.body["status"], "completed");
    assert_eq!(status.body["progress"], 100);
    assert_eq!(status.body["attempts"], 1);

    let result = &status.body["result"];
    assert_eq!(result["fileName"], "photo.webp");
    assert_eq!(result["contentType"], "image/webp");
    assert_eq!(result["converter"], "image_codec");

    let download = fixture
        .get_raw(result["downloadUrl"].as_str().unwrap())
        .await;
    assert_eq!(download.status, StatusCode::OK);
    assert_eq!(download.headers[header::CONTENT_TYPE], "image/webp");
    assert_eq!(
        download.headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"photo.webp\"; filename*=UTF-8''photo.webp"
    );

    let image = image::load_from_memory(&download.body).expect("decodes as an image");
    assert_eq!((image.width(), image.height()), (8, 6));
    assert_eq!(
        image::guess_format(&download.body).unwrap(),
        image::ImageFormat::WebP
    );

    fixture.shutdown().await;
}

#[tokio::test]
async fn test_input_removed_after_completion() {
    let fixture = TestFixture::new().await;

    let upload = fixture
        .upload("photo.png", "image/png", &fixtures::png_bytes(4, 4))
        .await;
    let file_id = upload.body["file"]["fileId"].as_str().unwrap().to_string();
    let input_path = fixture.storage.upload_path(&file_id);
    assert!(input_path.exists());

    let convert = fixture
        .post(
            "/api/convert",
            json!({ "fileId": file_id, "targetFormat": "jpg" }),
        )
        .await;
    assert_status!(convert, StatusCode::ACCEPTED);
    assert_eq!(convert.body["status"], "queued");

    let job_id = convert.body["jobId"].as_str().unwrap();
    let status = fixture.wait_for_terminal(job_id).await;
    assert_eq!(status.body["status"], "completed");

    assert!(!input_path.exists());
    assert!(fixture.files.get_upload(&file_id).unwrap().is_none());

    fixture.shutdown().await;
}

#[tokio::test]
async fn test_unsupported_pair_fails_fast() {
    let fixture = TestFixture::without_workers().await;

    let upload = fixture
        .upload("photo.png", "image/png", &fixtures::png_bytes(4, 4))
        .await;
    let file_id = upload.body["file"]["fileId"].as_str().unwrap();

    let response = fixture
        .post(
            "/api/convert",
            json!({ "fileId": file_id, "targetFormat": "docx" }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.body["kind"], "unsupported_conversion");

    assert_eq!(fixture.queue.count(None).unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_target_format_is_unsupported() {
    let fixture = TestFixture::without_workers().await;

    let upload = fixture
        .upload("photo.png", "image/png", &fixtures::png_bytes(4, 4))
        .await;
    let file_id = upload.body["file"]["fileId"].as_str().unwrap();

    let response = fixture
        .post(
            "/api/convert",
            json!({ "fileId": file_id, "targetFormat": "bmp" }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["kind"], "unsupported_conversion");
}

#[tokio::test]
async fn test_convert_unknown_file() {
    let fixture = TestFixture::without_workers().await;

    let response = fixture
        .post(
            "/api/convert",
            json!({ "fileId": "does-not-exist.png", "targetFormat": "webp" }),
        )
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);
    assert_eq!(response.body["kind"], "not_found");
}

#[tokio::test]
async fn test_convert_missing_fields() {
    let fixture = TestFixture::without_workers().await;

    let response = fixture
        .post("/api/convert", json!({ "targetFormat": "webp" }))
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["kind"], "invalid_request");

    let response = fixture
        .post("/api/convert", json!({ "fileId": "  ", "targetFormat": "webp" }))
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_convert_malformed_json() {
    let fixture = TestFixture::without_workers().await;

    let response = fixture.post_raw("/api/convert", "{ not json").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.body["kind"], "invalid_request");
}

#[tokio::test]
async fn test_second_convert_of_same_upload_conflicts() {
    let fixture = TestFixture::without_workers().await;

    let upload = fixture
        .upload("photo.png", "image/png", &fixtures::png_bytes(4, 4))
        .await;
    let file_id = upload.body["file"]["fileId"].as_str().unwrap();
    let body = json!({ "fileId": file_id, "targetFormat": "webp" });

    let first = fixture.post("/api/convert", body.clone()).await;
    assert_status!(first, StatusCode::ACCEPTED);

    let second = fixture.post("/api/convert", body).await;
    assert_status!(second, StatusCode::CONFLICT);
    assert_eq!(second.body["kind"], "conflict");

    assert_eq!(fixture.queue.count(Some(JobStatus::Queued)).unwrap(), 1);
}

// =============================================================================
// Status and download
// =============================================================================

#[tokio::test]
async fn test_status_of_unknown_job() {
    let fixture = TestFixture::without_workers().await;

    let response = fixture
        .get("/api/job/550e8400-e29b-41d4-a716-446655440000/status")
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);
    assert_eq!(response.body["kind"], "not_found");
}

#[tokio::test]
async fn test_queued_job_status() {
    let fixture = TestFixture::without_workers().await;

    let job_id = fixture
        .submit("photo.png", "image/png", &fixtures::png_bytes(4, 4), "webp")
        .await;

    let response = fixture.get(&format!("/api/job/{}/status", job_id)).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "queued");
    assert_eq!(response.body["attempts"], 0);
    assert!(response.body.get("result").is_none());
    assert!(response.body.get("error").is_none());
}

#[tokio::test]
async fn test_failed_job_reports_error_and_stays_failed() {
    let adapter = Arc::new(MockAdapter::new(ConverterId::ImageCodec));
    adapter.always_fail();
    let fixture =
        TestFixture::with_config(TestConfig::default().with_adapter(adapter.clone())).await;

    let job_id = fixture
        .submit("photo.png", "image/png", &fixtures::png_bytes(4, 4), "webp")
        .await;

    let status = fixture.wait_for_terminal(&job_id).await;
    assert_eq!(status.body["status"], "failed");
    assert_eq!(status.body["error"]["kind"], "converter_error");
    assert_eq!(status.body["attempts"], 3);
    assert!(status.body.get("result").is_none());
    assert_eq!(adapter.call_count().await, 3);

    fixture.shutdown().await;

    let again = fixture.get(&format!("/api/job/{}/status", job_id)).await;
    assert_eq!(again.body, status.body);
}

#[tokio::test]
async fn test_download_unknown_file() {
    let fixture = TestFixture::without_workers().await;

    let response = fixture.get("/api/download/nothing-here.webp").await;
    assert_status!(response, StatusCode::NOT_FOUND);
    assert_eq!(response.body["kind"], "not_found");
}

#[tokio::test]
async fn test_list_jobs_by_status() {
    let fixture = TestFixture::without_workers().await;

    let job_id = fixture
        .submit("photo.png", "image/png", &fixtures::png_bytes(4, 4), "webp")
        .await;

    let response = fixture.get("/api/jobs?status=queued").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["count"], 1);
    assert_eq!(response.body["jobs"][0]["jobId"], job_id.as_str());

    let response = fixture.get("/api/jobs?status=completed").await;
    assert_eq!(response.body["count"], 0);

    let response = fixture.get("/api/jobs?status=sleeping").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}
