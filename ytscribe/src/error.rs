use std::fmt;

/// Why the audio for a video could not be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFailure {
    /// Network or extractor failure while talking to the platform.
    Network,
    /// Private, age-gated, members-only or geo-blocked video.
    Restricted,
    /// The video does not exist or was removed.
    NotFound,
    /// The download did not finish inside its time budget.
    Timeout,
    /// yt-dlp is not installed.
    ToolMissing,
    /// Local filesystem failure around the scratch directory.
    Io,
}

impl MediaFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFailure::Network => "network",
            MediaFailure::Restricted => "restricted",
            MediaFailure::NotFound => "not_found",
            MediaFailure::Timeout => "timeout",
            MediaFailure::ToolMissing => "tool_missing",
            MediaFailure::Io => "io",
        }
    }
}

impl fmt::Display for MediaFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors that can occur in ytscribe.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid YouTube URL or video ID: {0}")]
    InvalidReference(String),

    #[error("media unavailable for {video_id} ({kind}): {message}")]
    MediaUnavailable {
        video_id: String,
        kind: MediaFailure,
        message: String,
    },

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("transcription failed: {0}")]
    InferenceFailed(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable machine-readable name, used as the `error` field of API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidReference(_) => "invalid_reference",
            Error::MediaUnavailable { .. } => "media_unavailable",
            Error::ModelLoadFailed(_) => "model_load_failed",
            Error::InferenceFailed(_) => "transcription_failed",
            Error::InvalidOption(_) => "invalid_option",
            Error::Io(_) | Error::Http(_) | Error::Json(_) => "internal_error",
        }
    }

    /// Errors caused by the caller's input rather than by processing.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidReference(_) | Error::InvalidOption(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
