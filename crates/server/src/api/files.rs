//! Upload and download handlers.

use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use convertino_core::TargetFormat;

use super::error::{api_error, bad_request, ApiError, ApiResult, ErrorResponse};
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub file: UploadedFileBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFileBody {
    pub file_id: String,
    pub original_name: String,
    /// Classified MIME type.
    pub mimetype: String,
    pub size: u64,
    /// Formats this file can be converted into.
    pub conversions: Vec<TargetFormat>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/upload
///
/// Store a file sent as the `file` field of a multipart form.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut upload: Option<(Option<String>, Option<String>, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(multipart_error(e)),
        };

        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, content_type, bytes.to_vec()));
        break;
    }

    let Some((file_name, content_type, bytes)) = upload else {
        return Err(bad_request("No file uploaded"));
    };

    let summary = state
        .service()
        .upload(file_name.as_deref(), content_type.as_deref(), &bytes)
        .await
        .map_err(api_error)?;

    Ok(Json(UploadResponse {
        success: true,
        file: UploadedFileBody {
            file_id: summary.file.id,
            original_name: summary.file.original_name,
            mimetype: summary.file.mime_type,
            size: summary.file.size_bytes,
            conversions: summary.conversions,
        },
    }))
}

/// GET /api/download/{file_id}
///
/// Stream a converted file as an attachment.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> ApiResult<Response> {
    let download = state
        .service()
        .open_download(&file_id)
        .await
        .map_err(api_error)?;

    let content_type = HeaderValue::from_str(&download.file.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&content_disposition(&download.file.file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let body = Body::from_stream(ReaderStream::new(download.handle));
    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(download.file.size_bytes),
    );

    Ok(response)
}

// ============================================================================
// Helpers
// ============================================================================

fn multipart_error(err: MultipartError) -> ApiError {
    let status = err.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return (
            status,
            Json(ErrorResponse {
                success: false,
                error: "Upload exceeds the size limit".to_string(),
                kind: "invalid_request".to_string(),
            }),
        );
    }
    bad_request(format!("Invalid multipart body: {}", err.body_text()))
}

/// `attachment` disposition with an ASCII fallback name and the exact name
/// percent-encoded as UTF-8.
pub fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("photo.webp"),
            "attachment; filename=\"photo.webp\"; filename*=UTF-8''photo.webp"
        );
    }

    #[test]
    fn test_content_disposition_escapes() {
        let value = content_disposition("résumé \"final\".pdf");
        assert!(value.starts_with("attachment; filename=\"r_sum_ _final_.pdf\";"));
        assert!(value.ends_with("filename*=UTF-8''r%C3%A9sum%C3%A9%20%22final%22.pdf"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }
}
