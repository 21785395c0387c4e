//! Request handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::analysis::{AnalyzeError, AnalyzeOptions};
use crate::storage::StorageError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub key: String,
    #[serde(default)]
    pub preview_only: bool,
}

/// Run one analysis. Degraded analyses still return 200 with a well-formed
/// body; only a failed byte load surfaces as an error status.
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Response {
    if request.key.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "key must not be empty" })),
        )
            .into_response();
    }

    let options = AnalyzeOptions {
        preview_only: request.preview_only,
    };
    match state.analyzer.analyze(&request.key, &options).await {
        Ok(result) => Json(result).into_response(),
        Err(AnalyzeError::Storage(StorageError::NotFound(key))) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("document not found: {}", key) })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Analysis failed for {}: {}", request.key, e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "capabilities": state.capabilities,
    }))
}
