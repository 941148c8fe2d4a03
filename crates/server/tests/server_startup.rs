use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tempfile::{NamedTempFile, TempDir};
use tokio::time::{sleep, timeout};

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Create a minimal valid config keeping all state under `data_dir`
fn minimal_config(port: u16, data_dir: &Path) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = {port}

[storage]
uploads_dir = "{uploads}"
converted_dir = "{converted}"

[database]
path = "{db}"

[worker]
workers = 1
"#,
        port = port,
        uploads = data_dir.join("uploads").display(),
        converted = data_dir.join("converted").display(),
        db = data_dir.join("db/convertino.db").display(),
    )
}

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

/// Spawn the server and return a handle
async fn spawn_server(config_path: &Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_convertino"))
        .env("CONVERTINO_CONFIG", config_path)
        .env("RUST_LOG", "error") // Quiet logs during tests
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

/// Wait for server to be ready
async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_health_endpoint() {
    let data_dir = TempDir::new().unwrap();
    let port = get_available_port();
    let config_file = write_config(&minimal_config(port, data_dir.path()));

    // Start server
    let mut server = spawn_server(config_file.path()).await;

    assert!(
        wait_for_server(port, 100).await,
        "Server did not start in time"
    );

    let client = Client::new();
    let response = client
        .get(format!("http://127.0.0.1:{}/api/health", port))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["status"], "ok");

    // Startup created the storage layout
    assert!(data_dir.path().join("uploads").is_dir());
    assert!(data_dir.path().join("converted").is_dir());
    assert!(data_dir.path().join("db/convertino.db").exists());

    // Cleanup
    server.kill().await.ok();
}

#[tokio::test]
async fn test_upload_and_status_over_http() {
    let data_dir = TempDir::new().unwrap();
    let port = get_available_port();
    let config_file = write_config(&minimal_config(port, data_dir.path()));

    let mut server = spawn_server(config_file.path()).await;
    assert!(
        wait_for_server(port, 100).await,
        "Server did not start in time"
    );

    let client = Client::new();
    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(b"plain words".to_vec())
            .file_name("notes.txt")
            .mime_str("text/plain")
            .unwrap(),
    );
    let response = client
        .post(format!("http://127.0.0.1:{}/api/upload", port))
        .multipart(form)
        .send()
        .await
        .expect("Failed to upload");
    assert!(response.status().is_success());

    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["file"]["originalName"], "notes.txt");
    assert_eq!(json["file"]["conversions"], serde_json::json!([]));

    let response = client
        .get(format!(
            "http://127.0.0.1:{}/api/job/00000000-0000-0000-0000-000000000000/status",
            port
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    server.kill().await.ok();
}

#[tokio::test]
async fn test_config_endpoint_returns_sanitized() {
    let data_dir = TempDir::new().unwrap();
    let port = get_available_port();
    let config_file = write_config(&minimal_config(port, data_dir.path()));

    let mut server = spawn_server(config_file.path()).await;
    assert!(
        wait_for_server(port, 100).await,
        "Server did not start in time"
    );

    let client = Client::new();
    let response = client
        .get(format!("http://127.0.0.1:{}/api/config", port))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["server"]["port"], port);
    assert_eq!(json["worker"]["workers"], 1);
    assert!(json.get("database").is_none());

    server.kill().await.ok();
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_convertino"))
            .env("CONVERTINO_CONFIG", "/nonexistent/config.toml")
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}

#[tokio::test]
async fn test_invalid_config_exits_with_error() {
    let data_dir = TempDir::new().unwrap();
    let config = minimal_config(get_available_port(), data_dir.path())
        .replace("workers = 1", "workers = 0");
    let config_file = write_config(&config);

    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_convertino"))
            .env("CONVERTINO_CONFIG", config_file.path())
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}
