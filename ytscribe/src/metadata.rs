//! Best-effort video metadata (title, duration).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::MediaFailure;
use crate::media::MediaError;
use crate::reference::watch_url;
use crate::ytdlp::{self, RunError};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoMetadata {
    pub title: Option<String>,
    /// Seconds.
    pub duration: Option<f64>,
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn lookup(&self, video_id: &str) -> Result<VideoMetadata, MediaError>;
}

/// Always returns empty metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

#[async_trait]
impl MetadataSource for NoMetadata {
    async fn lookup(&self, _video_id: &str) -> Result<VideoMetadata, MediaError> {
        Ok(VideoMetadata::default())
    }
}

/// Metadata via `yt-dlp --dump-json`.
pub struct YtDlpMetadataSource {
    program: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct InfoJson {
    title: Option<String>,
    duration: Option<f64>,
}

impl YtDlpMetadataSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: ytdlp::DEFAULT_PROGRAM.to_string(),
            timeout,
        }
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl MetadataSource for YtDlpMetadataSource {
    async fn lookup(&self, video_id: &str) -> Result<VideoMetadata, MediaError> {
        let url = watch_url(video_id);
        let args = [
            "--dump-json",
            "--skip-download",
            "--no-playlist",
            "--no-exec",
            "--no-warnings",
            url.as_str(),
        ];

        let output = ytdlp::run(&self.program, args, self.timeout)
            .await
            .map_err(|e| match e {
                RunError::NotInstalled => MediaError::new(MediaFailure::ToolMissing, "yt-dlp not found"),
                RunError::TimedOut(t) => {
                    MediaError::new(MediaFailure::Timeout, format!("metadata lookup timed out after {t:?}"))
                }
                RunError::Io(e) => MediaError::new(MediaFailure::Network, e.to_string()),
            })?;

        if !output.status.success() {
            let stderr = ytdlp::stderr_excerpt(&output);
            return Err(MediaError::new(ytdlp::classify_failure(&stderr), stderr));
        }

        let metadata = parse_info_json(&output.stdout)?;
        debug!(video_id, title = ?metadata.title, duration = ?metadata.duration, "metadata resolved");
        Ok(metadata)
    }
}

fn parse_info_json(bytes: &[u8]) -> Result<VideoMetadata, MediaError> {
    let info: InfoJson = serde_json::from_slice(bytes).map_err(|e| {
        MediaError::new(MediaFailure::Network, format!("unreadable yt-dlp metadata: {e}"))
    })?;
    Ok(VideoMetadata {
        title: info.title.filter(|t| !t.trim().is_empty()),
        duration: info.duration.filter(|d| d.is_finite() && *d >= 0.0),
    })
}
