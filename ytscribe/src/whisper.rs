//! whisper.cpp backend for [`SpeechModel`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::{self, WHISPER_SAMPLE_RATE};
use crate::config::{ModelVariant, Settings};
use crate::error::Error;
use crate::model::{ensure_model, Inference, ModelError, ModelLoader, SpeechModel};
use crate::types::TranscriptSegment;

/// Provisions ggml weights and loads them into a whisper.cpp context.
#[derive(Debug, Clone)]
pub struct WhisperLoader {
    model_dir: PathBuf,
    gpu: bool,
    n_threads: Option<u32>,
}

impl WhisperLoader {
    pub fn new(model_dir: PathBuf) -> Self {
        Self {
            model_dir,
            gpu: true,
            n_threads: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model_dir: settings.resolve_model_dir(),
            gpu: settings.gpu,
            n_threads: settings.n_threads,
        }
    }
}

#[async_trait]
impl ModelLoader for WhisperLoader {
    async fn load(&self, variant: ModelVariant) -> Result<Arc<dyn SpeechModel>, ModelError> {
        let path = ensure_model(variant, &self.model_dir)
            .await
            .map_err(|e| ModelError::Load(e.to_string()))?;

        let gpu = self.gpu;
        let n_threads = self.n_threads;
        let model = tokio::task::spawn_blocking(move || WhisperModel::open(&path, gpu, n_threads))
            .await
            .map_err(|e| ModelError::Load(format!("model loader task failed: {e}")))??;

        Ok(Arc::new(model))
    }
}

/// A loaded whisper.cpp context. One state is created per inference call,
/// so the context itself is shared freely between threads.
pub struct WhisperModel {
    ctx: WhisperContext,
    n_threads: Option<u32>,
}

impl WhisperModel {
    pub fn open(path: &Path, gpu: bool, n_threads: Option<u32>) -> Result<Self, ModelError> {
        info!(model = %path.display(), gpu, "loading whisper model");

        let path_str = path
            .to_str()
            .ok_or_else(|| ModelError::Load("model path contains invalid UTF-8".into()))?;

        let mut ctx_params = WhisperContextParameters::new();
        ctx_params.use_gpu(gpu);

        let ctx = WhisperContext::new_with_params(path_str, ctx_params)
            .map_err(|e| ModelError::Load(format!("{}: {e}", path.display())))?;

        Ok(Self { ctx, n_threads })
    }
}

impl SpeechModel for WhisperModel {
    fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<Inference, ModelError> {
        let samples = audio::load_audio(audio).map_err(|e| match e {
            Error::InferenceFailed(message) => ModelError::Inference(message),
            other => ModelError::Inference(other.to_string()),
        })?;

        let infer_err = |e: whisper_rs::WhisperError| ModelError::Inference(e.to_string());

        let decode_as = decoding_language(language);
        let mut state = self.ctx.create_state().map_err(infer_err)?;
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 5 });

        // "auto" detects the language and still decodes
        params.set_language(Some(decode_as.as_str()));

        if let Some(n) = self.n_threads {
            params.set_n_threads(n as i32);
        }

        // Keep whisper.cpp off stderr
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_print_special(false);

        info!(
            samples = samples.len(),
            audio_secs = samples.len() as f64 / WHISPER_SAMPLE_RATE as f64,
            "running whisper"
        );
        state.full(params, &samples).map_err(infer_err)?;

        let num_segments = state.full_n_segments();
        debug!(num_segments, "whisper finished");

        let mut segments = Vec::with_capacity(num_segments.max(0) as usize);
        for i in 0..num_segments {
            let segment = state
                .get_segment(i)
                .ok_or_else(|| ModelError::Inference(format!("segment {i} not found")))?;

            // whisper timestamps are in centiseconds
            let start = segment.start_timestamp() as f64 / 100.0;
            let end = segment.end_timestamp() as f64 / 100.0;
            let text = segment
                .to_str_lossy()
                .map_err(|e| ModelError::Inference(format!("segment text error: {e}")))?
                .into_owned();

            segments.push(TranscriptSegment::new(start, (end - start).max(0.0), text));
        }

        let detected = whisper_rs::get_lang_str(state.full_lang_id_from_state()).map(str::to_string);

        Ok(Inference {
            segments,
            language: detected.or(Some(decode_as).filter(|code| code != AUTO_LANGUAGE)),
        })
    }
}

const AUTO_LANGUAGE: &str = "auto";

/// The language whisper decodes with: the mapped hint, or `"auto"`.
fn decoding_language(hint: Option<&str>) -> String {
    hint.and_then(whisper_language)
        .unwrap_or_else(|| AUTO_LANGUAGE.to_string())
}

/// Map a language hint such as `"de"` or `"pt-BR"` to a code whisper knows.
/// Unknown hints fall back to auto-detection.
fn whisper_language(hint: &str) -> Option<String> {
    let primary = hint
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    if primary.is_empty() || primary == AUTO_LANGUAGE {
        return None;
    }
    if whisper_rs::get_lang_id(&primary).is_some() {
        Some(primary)
    } else {
        warn!(hint, "language not supported by whisper, auto-detecting");
        None
    }
}
