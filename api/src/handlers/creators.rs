use axum::{extract::State, Json};
use serde::Serialize;

use common::models::Creator;

use crate::handlers::ErrorResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CreatorsResponse {
    pub creators: Vec<Creator>,
}

/// List creator folders and their recordings
///
/// Every request re-enumerates the remote host; nothing is cached.
#[tracing::instrument(skip(state))]
pub async fn list_creators(
    State(state): State<AppState>,
) -> Result<Json<CreatorsResponse>, ErrorResponse> {
    let creators = state.transfer.list_creators().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to fetch creators");
        ErrorResponse::internal(e.to_string())
    })?;

    tracing::info!(creators = creators.len(), "Creators fetched");
    Ok(Json(CreatorsResponse { creators }))
}
