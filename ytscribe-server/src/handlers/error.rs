use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable kind, e.g. `invalid_reference`.
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
}

/// Engine error plus the HTTP status it maps to.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                error: "invalid_request".to_string(),
                message: message.into(),
                video_id: None,
            },
        }
    }
}

impl From<ytscribe::Error> for ApiError {
    fn from(err: ytscribe::Error) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let video_id = match &err {
            ytscribe::Error::MediaUnavailable { video_id, .. } => Some(video_id.clone()),
            _ => None,
        };
        Self {
            status,
            body: ErrorResponse {
                error: err.kind().to_string(),
                message: err.to_string(),
                video_id,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(error = %self.body.error, message = %self.body.message, "request failed");
        }
        (self.status, Json(self.body)).into_response()
    }
}
