//! YouTube transcription engine: video URL or ID in, timed transcript out.
//!
//! **ytscribe** prefers the captions a video already has and falls back to
//! downloading the audio (via yt-dlp) and running it through whisper.cpp.
//! Whichever path succeeds, the result has the same shape and says which
//! source produced it. Output as plain text, SRT, WebVTT, or JSON.
//!
//! # Quick start
//!
//! ```rust,no_run
//! # #[tokio::main]
//! # async fn main() -> ytscribe::Result<()> {
//! let transcript = ytscribe::transcribe("https://youtu.be/dQw4w9WgXcQ").await?;
//! println!("[{}] {}", transcript.source, transcript.text());
//!
//! // Skip captions and always run the speech model
//! let orchestrator = ytscribe::Orchestrator::from_settings(&ytscribe::Settings::from_env());
//! let transcript = orchestrator
//!     .transcribe_input("dQw4w9WgXcQ", Some("en"), true)
//!     .await?;
//! println!("{}", transcript.to_srt());
//! # Ok(())
//! # }
//! ```
//!
//! The capabilities the orchestrator calls ([`CaptionSource`],
//! [`MediaFetcher`], [`MetadataSource`], [`ModelLoader`]) are traits, so tests
//! and embedders can substitute their own.

pub(crate) mod audio;
pub mod captions;
pub mod config;
pub mod error;
pub mod media;
pub mod metadata;
pub mod model;
pub mod orchestrator;
pub mod reference;
pub mod types;
pub mod whisper;
pub(crate) mod ytdlp;

pub use audio::{ScratchDir, TransientAudio};
pub use captions::{CaptionError, CaptionSource, CaptionTrack, YtDlpCaptionSource};
pub use config::{ModelVariant, Settings, StageTimeouts, VariantSelection};
pub use error::{Error, MediaFailure, Result};
pub use media::{MediaError, MediaFetcher, YtDlpMediaFetcher};
pub use metadata::{MetadataSource, NoMetadata, VideoMetadata, YtDlpMetadataSource};
pub use model::{Inference, ModelError, ModelHandle, ModelLoader, ModelStatus, SpeechModel};
pub use orchestrator::Orchestrator;
pub use reference::VideoReference;
pub use types::{TranscriptResult, TranscriptSegment, TranscriptSource};
pub use whisper::{WhisperLoader, WhisperModel};

/// Transcribe a video with settings taken from the environment.
///
/// Builds a fresh orchestrator, so the model is loaded for this call only.
/// Long-running processes should keep one [`Orchestrator`] instead.
pub async fn transcribe(input: &str) -> Result<TranscriptResult> {
    transcribe_with_settings(input, &Settings::from_env()).await
}

/// Transcribe a video with explicit settings.
pub async fn transcribe_with_settings(input: &str, settings: &Settings) -> Result<TranscriptResult> {
    Orchestrator::from_settings(settings)
        .transcribe_input(input, None, false)
        .await
}
