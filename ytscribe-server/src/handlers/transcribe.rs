use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;
use ytscribe::TranscriptResult;

use super::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    /// YouTube URL or bare video ID.
    pub url: String,
    pub language: Option<String>,
    /// `null` and absent both mean captions first.
    pub use_whisper: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TranscribeQuery {
    pub language: Option<String>,
    /// `null` and absent both mean captions first.
    pub use_whisper: Option<bool>,
}

pub async fn transcribe_handler(
    State(state): State<AppState>,
    payload: Result<Json<TranscribeRequest>, JsonRejection>,
) -> Result<Json<TranscriptResult>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let use_whisper = request.use_whisper.unwrap_or(false);
    run(&state, &request.url, request.language.as_deref(), use_whisper).await
}

pub async fn transcribe_by_id_handler(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    query: Result<Query<TranscribeQuery>, axum::extract::rejection::QueryRejection>,
) -> Result<Json<TranscriptResult>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let use_whisper = query.use_whisper.unwrap_or(false);
    run(&state, &video_id, query.language.as_deref(), use_whisper).await
}

async fn run(
    state: &AppState,
    input: &str,
    language: Option<&str>,
    use_whisper: bool,
) -> Result<Json<TranscriptResult>, ApiError> {
    info!(input, ?language, use_whisper, "transcription requested");
    let result = state
        .orchestrator
        .transcribe_input(input, language, use_whisper)
        .await?;
    Ok(Json(result))
}
