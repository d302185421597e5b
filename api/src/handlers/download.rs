use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use serde::Deserialize;
use std::time::Instant;

use common::errors::{ErrorKind, TransferError};
use common::transfer::{DownloadMode, RemoteFilePayload};

use crate::handlers::ErrorResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub path: Option<String>,
}

/// Download one recording
///
/// Files above the streaming threshold are sent chunk by chunk; smaller ones
/// are fetched whole (with retry) so the browser sees a complete response.
#[tracing::instrument(skip(state, params), fields(remote_path))]
pub async fn download_file(
    State(state): State<AppState>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, ErrorResponse> {
    let path = validate_path(params.path.as_deref())?;
    tracing::Span::current().record("remote_path", path);

    let started = Instant::now();
    let payload = state.transfer.download(path).await.map_err(|e| {
        tracing::error!(
            error = %e,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Download failed"
        );
        download_error(&e, state.config.is_development())
    })?;

    tracing::info!(
        mode = payload.mode().as_str(),
        size = ?payload.total_size(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Download ready"
    );

    let chunk_size = state.transfer.limits().chunk_size;
    file_response(path, payload, chunk_size)
}

/// Reject missing paths and anything that could leave the library
pub fn validate_path(path: Option<&str>) -> Result<&str, ErrorResponse> {
    let path = match path {
        Some(path) if !path.is_empty() => path,
        _ => return Err(ErrorResponse::bad_request("File path is required")),
    };

    if path.contains("..") || path.contains('~') {
        tracing::warn!(remote_path = %path, "Rejected download path");
        return Err(ErrorResponse::bad_request("Invalid file path"));
    }

    Ok(path)
}

/// Download name for the browser: `.ts` recordings are offered as `.mp4`
pub fn playback_filename(path: &str) -> String {
    let name = path
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("download.ts");

    match name.strip_suffix(".ts") {
        Some(stem) => format!("{}.mp4", stem),
        None => name.to_string(),
    }
}

fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

fn file_response(
    path: &str,
    payload: RemoteFilePayload,
    chunk_size: usize,
) -> Result<Response, ErrorResponse> {
    let disposition = HeaderValue::from_str(&content_disposition(&playback_filename(path)))
        .map_err(|e| ErrorResponse::internal(format!("Invalid download filename: {}", e)))?;

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CACHE_CONTROL, "no-cache");

    if let Some(size) = payload.total_size() {
        response = response.header(header::CONTENT_LENGTH, size);
    }

    let body = match payload.mode() {
        DownloadMode::Streaming => {
            response = response.header(header::ACCEPT_RANGES, "bytes");
            Body::from_stream(payload.into_chunks(chunk_size))
        }
        DownloadMode::Buffered => match payload.into_bytes() {
            Ok(data) => Body::from(data),
            Err(payload) => Body::from_stream(payload.into_chunks(chunk_size)),
        },
    };

    response
        .body(body)
        .map_err(|e| ErrorResponse::internal(format!("Failed to build response: {}", e)))
}

/// Map a transfer failure to the status and message the client shows
pub fn download_error(error: &TransferError, development: bool) -> ErrorResponse {
    let response = match error.kind() {
        ErrorKind::NotFound => ErrorResponse::new(StatusCode::NOT_FOUND, "File not found on server"),
        ErrorKind::FileTooLarge => ErrorResponse::new(StatusCode::PAYLOAD_TOO_LARGE, error.to_string()),
        ErrorKind::Timeout => ErrorResponse::new(
            StatusCode::REQUEST_TIMEOUT,
            "Download timeout - please try again",
        ),
        ErrorKind::Connection => ErrorResponse::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Server connection error - please try again",
        ),
        ErrorKind::Configuration => ErrorResponse::internal(error.to_string()),
        ErrorKind::EmptyFile | ErrorKind::PartialRead => {
            ErrorResponse::internal("Failed to download file")
        }
    };

    if development {
        response.with_details(error.to_string())
    } else {
        response
    }
}

