//! Media Fetcher: audio download via yt-dlp into a transient scratch directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::audio::{ScratchDir, TransientAudio};
use crate::error::MediaFailure;
use crate::reference::watch_url;
use crate::ytdlp::{self, RunError};

/// A failed download, already classified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct MediaError {
    pub kind: MediaFailure,
    pub message: String,
}

impl MediaError {
    pub fn new(kind: MediaFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download the audio of `video_id`. The returned handle owns the file.
    async fn download(&self, video_id: &str) -> Result<TransientAudio, MediaError>;
}

/// Media fetcher backed by `yt-dlp --extract-audio`.
///
/// - Arguments are passed via `.args()` (no shell expansion)
/// - `--no-exec` prevents yt-dlp from running post-processing commands
/// - The reported file path is checked to be inside the scratch directory
pub struct YtDlpMediaFetcher {
    program: String,
    scratch_root: PathBuf,
    timeout: Duration,
}

impl YtDlpMediaFetcher {
    pub fn new(scratch_root: PathBuf, timeout: Duration) -> Self {
        Self {
            program: ytdlp::DEFAULT_PROGRAM.to_string(),
            scratch_root,
            timeout,
        }
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl MediaFetcher for YtDlpMediaFetcher {
    async fn download(&self, video_id: &str) -> Result<TransientAudio, MediaError> {
        let url = watch_url(video_id);
        info!(video_id, "downloading audio");

        let scratch = ScratchDir::create(&self.scratch_root, "audio").map_err(|e| {
            MediaError::new(MediaFailure::Io, format!("failed to create scratch dir: {e}"))
        })?;

        let output_template = scratch.path().join("%(id)s.%(ext)s");
        let output_template = output_template.to_str().ok_or_else(|| {
            MediaError::new(
                MediaFailure::Io,
                "scratch path contains invalid UTF-8",
            )
        })?;

        // Best audio, extracted as WAV for ffmpeg/whisper
        let args = [
            "--format",
            "bestaudio/best",
            "--extract-audio",
            "--audio-format",
            "wav",
            "--audio-quality",
            "0",
            "--no-playlist",
            "--no-exec",
            "--no-warnings",
            "--output",
            output_template,
            "--print",
            "after_move:filepath",
            url.as_str(),
        ];

        let output = ytdlp::run(&self.program, args, self.timeout)
            .await
            .map_err(|e| match e {
                RunError::NotInstalled => MediaError::new(
                    MediaFailure::ToolMissing,
                    "yt-dlp not found, install with: pip install yt-dlp",
                ),
                RunError::TimedOut(t) => {
                    MediaError::new(MediaFailure::Timeout, format!("download timed out after {t:?}"))
                }
                RunError::Io(e) => {
                    MediaError::new(MediaFailure::Io, format!("failed to run yt-dlp: {e}"))
                }
            })?;

        if !output.status.success() {
            let stderr = ytdlp::stderr_excerpt(&output);
            return Err(MediaError::new(
                ytdlp::classify_failure(&stderr),
                format!("yt-dlp failed: {stderr}"),
            ));
        }

        let printed = String::from_utf8_lossy(&output.stdout).trim().to_string();

        // --print after_move:filepath gives the final path; older versions may print nothing
        let audio_path = match printed.lines().last() {
            Some(line) if !line.trim().is_empty() => {
                let candidate = PathBuf::from(line.trim());
                validate_path_in_dir(&candidate, scratch.path())?;
                candidate
            }
            _ => find_audio_file(scratch.path())?,
        };

        if !audio_path.exists() {
            return Err(MediaError::new(
                MediaFailure::Network,
                format!("downloaded file not found at {}", audio_path.display()),
            ));
        }

        debug!(video_id, path = %audio_path.display(), "audio downloaded");
        Ok(TransientAudio::new(scratch, audio_path))
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir => {}
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

/// Reject paths outside the expected directory (path traversal).
fn validate_path_in_dir(path: &Path, expected_dir: &Path) -> Result<(), MediaError> {
    let canonical_dir = expected_dir
        .canonicalize()
        .unwrap_or_else(|_| normalize_path(expected_dir));
    let canonical_path = path
        .canonicalize()
        .unwrap_or_else(|_| normalize_path(path));

    if canonical_path.starts_with(&canonical_dir) {
        Ok(())
    } else {
        warn!(
            path = %path.display(),
            expected_dir = %expected_dir.display(),
            "downloaded file path outside expected directory"
        );
        Err(MediaError::new(
            MediaFailure::Io,
            "downloaded file path is outside the scratch directory",
        ))
    }
}

/// Most recently modified audio file in `dir`.
fn find_audio_file(dir: &Path) -> Result<PathBuf, MediaError> {
    let read_err = |e: std::io::Error| {
        MediaError::new(MediaFailure::Io, format!("failed to read scratch dir: {e}"))
    };

    let mut best: Option<(PathBuf, std::time::SystemTime)> = None;
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let path = entry.path();
        let is_audio = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| matches!(ext, "wav" | "mp3" | "ogg" | "m4a" | "opus" | "flac" | "webm"));
        if !is_audio {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            if best.as_ref().is_none_or(|(_, t)| modified > *t) {
                best = Some((path, modified));
            }
        }
    }

    best.map(|(p, _)| p).ok_or_else(|| {
        MediaError::new(MediaFailure::Network, "no audio file found after download")
    })
}
