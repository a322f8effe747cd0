use axum::Json;
use serde_json::{json, Value};

pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "name": "ytscribe",
        "message": "YouTube Transcription API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "transcribe": "POST /transcribe - Transcribe a YouTube video",
            "transcribe_by_id": "GET /transcribe/{video_id} - Transcribe by video ID",
            "health": "GET /health - Health check",
        }
    }))
}
