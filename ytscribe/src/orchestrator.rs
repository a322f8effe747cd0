//! Request orchestration: captions first, whisper as the fallback.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::audio::TransientAudio;
use crate::captions::{CaptionError, CaptionSource, YtDlpCaptionSource};
use crate::config::{Settings, StageTimeouts};
use crate::error::{Error, MediaFailure, Result};
use crate::media::{MediaFetcher, YtDlpMediaFetcher};
use crate::metadata::{MetadataSource, NoMetadata, VideoMetadata, YtDlpMetadataSource};
use crate::model::{ModelHandle, ModelStatus};
use crate::reference::VideoReference;
use crate::types::{normalize_segments, TranscriptResult, TranscriptSegment, TranscriptSource};
use crate::whisper::WhisperLoader;

/// Per-request states. Each stage hands over to the next; only `Done` and
/// `Failed` end the request.
enum Stage {
    CaptionFetch,
    AudioAcquire,
    Transcribe(TransientAudio),
    Done(Acquired),
    Failed(Error),
}

/// Segments produced by whichever path succeeded.
struct Acquired {
    segments: Vec<TranscriptSegment>,
    language: String,
    source: TranscriptSource,
}

/// Runs transcription requests against injected capabilities.
///
/// Cheap to share behind an `Arc`; requests hold no state beyond the model
/// handle and the inference permits.
pub struct Orchestrator {
    captions: Arc<dyn CaptionSource>,
    media: Arc<dyn MediaFetcher>,
    metadata: Arc<dyn MetadataSource>,
    model: Arc<ModelHandle>,
    inference_permits: Arc<Semaphore>,
    timeouts: StageTimeouts,
}

impl Orchestrator {
    pub fn new(
        captions: Arc<dyn CaptionSource>,
        media: Arc<dyn MediaFetcher>,
        model: Arc<ModelHandle>,
    ) -> Self {
        Self {
            captions,
            media,
            metadata: Arc::new(NoMetadata),
            model,
            inference_permits: Arc::new(Semaphore::new(1)),
            timeouts: StageTimeouts::default(),
        }
    }

    /// Wire up the yt-dlp and whisper.cpp backends from `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let scratch = settings.resolve_scratch_dir();
        let captions = YtDlpCaptionSource::new(
            scratch.clone(),
            settings.timeouts.captions,
            settings.default_caption_languages.clone(),
        );
        let media = YtDlpMediaFetcher::new(scratch, settings.timeouts.download);
        let metadata = YtDlpMetadataSource::new(settings.timeouts.metadata);
        let model = ModelHandle::new(settings.model, Arc::new(WhisperLoader::from_settings(settings)))
            .with_warning(settings.model_warning.clone());

        Self::new(Arc::new(captions), Arc::new(media), Arc::new(model))
            .with_metadata(Arc::new(metadata))
            .with_timeouts(settings.timeouts)
            .with_max_concurrent_inference(settings.max_concurrent_inference)
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataSource>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Bound the number of inference calls running at once (at least 1).
    pub fn with_max_concurrent_inference(mut self, n: usize) -> Self {
        self.inference_permits = Arc::new(Semaphore::new(n.max(1)));
        self
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    pub async fn model_status(&self) -> ModelStatus {
        self.model.status().await
    }

    /// Resolve `input` (URL or bare ID) and transcribe it.
    pub async fn transcribe_input(
        &self,
        input: &str,
        language_hint: Option<&str>,
        force_whisper: bool,
    ) -> Result<TranscriptResult> {
        let reference = VideoReference::resolve(input)?;
        self.transcribe(&reference, language_hint, force_whisper).await
    }

    /// Produce a transcript for `reference`.
    ///
    /// Captions are used when available unless `force_whisper` is set; any
    /// caption miss or caption failure falls through to download plus
    /// inference. Title and duration are looked up alongside and never fail
    /// the request.
    pub async fn transcribe(
        &self,
        reference: &VideoReference,
        language_hint: Option<&str>,
        force_whisper: bool,
    ) -> Result<TranscriptResult> {
        let video_id = reference.video_id();
        let hint = language_hint.map(str::trim).filter(|h| !h.is_empty());
        let span = info_span!("transcribe", video_id, language = ?hint, force_whisper);

        async move {
            // A failed acquisition drops the pending metadata lookup.
            let (acquired, metadata) = tokio::try_join!(
                self.acquire(video_id, hint, force_whisper),
                async { Ok::<_, Error>(self.lookup_metadata(video_id).await) },
            )?;

            info!(
                source = %acquired.source,
                language = %acquired.language,
                segments = acquired.segments.len(),
                "transcript ready"
            );

            Ok(TranscriptResult {
                video_id: video_id.to_string(),
                title: metadata.title,
                duration: metadata.duration,
                language: acquired.language,
                source: acquired.source,
                segments: acquired.segments,
                created_at: Utc::now(),
            })
        }
        .instrument(span)
        .await
    }

    async fn acquire(
        &self,
        video_id: &str,
        hint: Option<&str>,
        force_whisper: bool,
    ) -> Result<Acquired> {
        let mut stage = if force_whisper {
            Stage::AudioAcquire
        } else {
            Stage::CaptionFetch
        };

        loop {
            stage = match stage {
                Stage::CaptionFetch => self.fetch_captions(video_id, hint).await,
                Stage::AudioAcquire => self.acquire_audio(video_id).await,
                Stage::Transcribe(audio) => self.transcribe_audio(audio, hint).await,
                Stage::Done(acquired) => return Ok(acquired),
                Stage::Failed(err) => {
                    warn!(error = %err, kind = err.kind(), "transcription failed");
                    return Err(err);
                }
            };
        }
    }

    async fn fetch_captions(&self, video_id: &str, hint: Option<&str>) -> Stage {
        let fetch = self.captions.fetch(video_id, hint);
        match tokio::time::timeout(self.timeouts.captions, fetch).await {
            Ok(Ok(track)) => {
                let segments = normalize_segments(track.segments);
                if segments.is_empty() {
                    info!(language = %track.language, "caption track has no text, falling back to whisper");
                    return Stage::AudioAcquire;
                }
                debug!(language = %track.language, segments = segments.len(), "using captions");
                Stage::Done(Acquired {
                    segments,
                    language: track.language,
                    source: TranscriptSource::Captions,
                })
            }
            Ok(Err(CaptionError::NotFound(reason))) => {
                info!(%reason, "no captions, falling back to whisper");
                Stage::AudioAcquire
            }
            Ok(Err(CaptionError::Transport(reason))) => {
                warn!(%reason, "caption fetch failed, falling back to whisper");
                Stage::AudioAcquire
            }
            Err(_) => {
                warn!(timeout = ?self.timeouts.captions, "caption fetch timed out, falling back to whisper");
                Stage::AudioAcquire
            }
        }
    }

    async fn acquire_audio(&self, video_id: &str) -> Stage {
        let download = self.media.download(video_id);
        match tokio::time::timeout(self.timeouts.download, download).await {
            Ok(Ok(audio)) => Stage::Transcribe(audio),
            Ok(Err(e)) => Stage::Failed(Error::MediaUnavailable {
                video_id: video_id.to_string(),
                kind: e.kind,
                message: e.message,
            }),
            Err(_) => Stage::Failed(Error::MediaUnavailable {
                video_id: video_id.to_string(),
                kind: MediaFailure::Timeout,
                message: format!("download timed out after {:?}", self.timeouts.download),
            }),
        }
    }

    /// Owns `audio` for the whole stage and releases it before returning,
    /// whatever the outcome. Dropping this future releases it as well.
    async fn transcribe_audio(&self, audio: TransientAudio, hint: Option<&str>) -> Stage {
        let outcome = self.infer(&audio, hint).await;
        audio.release();
        match outcome {
            Ok(acquired) => Stage::Done(acquired),
            Err(err) => Stage::Failed(err),
        }
    }

    async fn infer(&self, audio: &TransientAudio, hint: Option<&str>) -> Result<Acquired> {
        let model = self.model.get_or_load().await?;

        let permit = Arc::clone(&self.inference_permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::InferenceFailed("inference pool closed".into()))?;

        let path = audio.path().to_path_buf();
        let language = hint.map(str::to_string);
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            model.transcribe(&path, language.as_deref())
        });

        let inference = match tokio::time::timeout(self.timeouts.inference, task).await {
            Ok(Ok(Ok(inference))) => inference,
            Ok(Ok(Err(e))) => return Err(Error::InferenceFailed(e.to_string())),
            Ok(Err(join_err)) => {
                return Err(Error::InferenceFailed(format!("inference task aborted: {join_err}")))
            }
            Err(_) => {
                return Err(Error::InferenceFailed(format!(
                    "inference timed out after {:?}",
                    self.timeouts.inference
                )))
            }
        };

        let segments = normalize_segments(inference.segments);
        let language = inference
            .language
            .or_else(|| hint.map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Acquired {
            segments,
            language,
            source: TranscriptSource::Whisper,
        })
    }

    async fn lookup_metadata(&self, video_id: &str) -> VideoMetadata {
        let lookup = self.metadata.lookup(video_id);
        match tokio::time::timeout(self.timeouts.metadata, lookup).await {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(e)) => {
                warn!(error = %e, "metadata lookup failed, continuing without title");
                VideoMetadata::default()
            }
            Err(_) => {
                warn!("metadata lookup timed out, continuing without title");
                VideoMetadata::default()
            }
        }
    }
}
