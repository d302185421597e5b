use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use common::errors::ValidationError;
use common::recorder::RecorderEntry;

use crate::handlers::ErrorResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RecorderConfigResponse {
    pub config: String,
}

#[derive(Debug, Deserialize)]
pub struct AddUrlRequest {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUrlResponse {
    pub success: bool,
    pub message: String,
    pub url: String,
    pub display_name: String,
    pub identifier: String,
}

/// Current content of the recorder's URL list
#[tracing::instrument(skip(state))]
pub async fn get_config(
    State(state): State<AppState>,
) -> Result<Json<RecorderConfigResponse>, ErrorResponse> {
    let path = &state.config.recorder.url_config_path;
    let config = state.transfer.read_text_file(path).await.map_err(|e| {
        tracing::error!(error = %e, remote_path = %path, "Failed to read recorder config");
        ErrorResponse::internal(e.to_string())
    })?;

    Ok(Json(RecorderConfigResponse { config }))
}

/// Append a TikTok live URL to the recorder's list
#[tracing::instrument(skip(state, request))]
pub async fn add_url(
    State(state): State<AppState>,
    Json(request): Json<AddUrlRequest>,
) -> Result<Json<AddUrlResponse>, ErrorResponse> {
    let entry = RecorderEntry::parse(request.url.as_deref().unwrap_or_default()).map_err(|e| {
        tracing::warn!(error = %e, "Rejected recorder URL");
        match e {
            ValidationError::MissingField(_) => ErrorResponse::bad_request("URL is required"),
            ValidationError::InvalidFieldValue { reason, .. } => ErrorResponse::bad_request(reason),
        }
    })?;

    let path = &state.config.recorder.url_config_path;
    state
        .transfer
        .append_text(path, &entry.config_line())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, remote_path = %path, "Failed to write recorder config");
            ErrorResponse::internal(e.to_string())
        })?;

    tracing::info!(username = %entry.username, "Recorder URL added");
    Ok(Json(AddUrlResponse {
        success: true,
        message: "URL added successfully".to_string(),
        url: entry.live_url(),
        display_name: entry.display_name,
        identifier: entry.identifier,
    }))
}
