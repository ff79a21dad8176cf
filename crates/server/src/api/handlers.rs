use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use darunner_core::{
    FinalResult, MergeRequest, OrchestratorError, ReferenceRequest, ReferenceResult,
    SanitizedConfig,
};

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Bad input is the caller's problem; anything else failed remotely.
fn error_response(err: OrchestratorError) -> ApiError {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::BAD_GATEWAY
    };
    warn!("Request failed with {}: {}", status, err);
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Run the merge pipeline and wait for its result.
pub async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MergeRequest>,
) -> Result<Json<FinalResult>, ApiError> {
    info!(
        "Merge run requested: {} parts into {}",
        request.parts.len(),
        request.output_key
    );
    state
        .orchestrator()
        .run_merge(&request)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Run a reference-fetch work item and wait for its result.
pub async fn create_work_item(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReferenceRequest>,
) -> Result<Json<ReferenceResult>, ApiError> {
    info!("Reference fetch requested for {}", request.item_url);
    state
        .orchestrator()
        .run_reference(&request)
        .await
        .map(Json)
        .map_err(error_response)
}
