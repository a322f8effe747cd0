use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub whisper_model: String,
    pub whisper_model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whisper_model_warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whisper_model_error: Option<String>,
}

/// Liveness plus model status. Never triggers a model load.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let model = state.orchestrator.model_status().await;
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        whisper_model: model.variant.name().to_string(),
        whisper_model_loaded: model.loaded,
        whisper_model_warning: model.warning,
        whisper_model_error: model.last_error,
    })
}
