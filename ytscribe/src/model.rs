//! Speech model provisioning and the shared, lazily loaded model handle.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::ModelVariant;
use crate::error::{Error, Result};
use crate::types::TranscriptSegment;

const HUGGINGFACE_BASE: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// How long a failed load is reported to callers before it is attempted again.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Raw output of one inference run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inference {
    pub segments: Vec<TranscriptSegment>,
    /// Language the model detected, if it reports one.
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("{0}")]
    Load(String),
    #[error("{0}")]
    Inference(String),
}

/// A loaded speech-to-text model. Inference is CPU/GPU bound and blocking;
/// callers run it on a blocking thread.
pub trait SpeechModel: Send + Sync {
    fn transcribe(
        &self,
        audio: &Path,
        language: Option<&str>,
    ) -> std::result::Result<Inference, ModelError>;
}

/// Loads a model variant into memory.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, variant: ModelVariant) -> std::result::Result<Arc<dyn SpeechModel>, ModelError>;
}

/// Snapshot of the model handle for health reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStatus {
    pub variant: ModelVariant,
    pub loaded: bool,
    /// Set when the configured selector was invalid and the default was used.
    pub warning: Option<String>,
    pub last_error: Option<String>,
}

/// The process-wide model: loaded at most once, on first use, and shared by
/// every request afterwards.
///
/// Concurrent first callers wait on one load attempt. A failed attempt is
/// cached for `retry_after` so a broken model does not cause a load storm;
/// requests that never need the model are unaffected either way.
pub struct ModelHandle {
    variant: ModelVariant,
    warning: Option<String>,
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<Arc<dyn SpeechModel>>,
    /// Held for the duration of a load attempt.
    load_gate: Mutex<()>,
    /// Only locked briefly, never across an await.
    last_failure: StdMutex<Option<(String, Instant)>>,
    retry_after: Duration,
}

impl ModelHandle {
    pub fn new(variant: ModelVariant, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            variant,
            warning: None,
            loader,
            model: OnceCell::new(),
            load_gate: Mutex::new(()),
            last_failure: StdMutex::new(None),
            retry_after: DEFAULT_RETRY_AFTER,
        }
    }

    /// Attach the warning produced while resolving the configured variant.
    pub fn with_warning(mut self, warning: Option<String>) -> Self {
        self.warning = warning;
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Return the loaded model, loading it first if nobody has yet.
    pub async fn get_or_load(&self) -> Result<Arc<dyn SpeechModel>> {
        if let Some(model) = self.model.get() {
            return Ok(Arc::clone(model));
        }

        // Serializes load attempts; waiters re-check the cell once they get in.
        let _gate = self.load_gate.lock().await;
        if let Some(model) = self.model.get() {
            return Ok(Arc::clone(model));
        }

        if let Some(message) = self.recent_failure() {
            return Err(Error::ModelLoadFailed(message));
        }

        info!(model = %self.variant, "loading speech model");
        let started = Instant::now();
        match self.loader.load(self.variant).await {
            Ok(model) => {
                // The gate guarantees nobody else set the cell meanwhile.
                let _ = self.model.set(Arc::clone(&model));
                *self.failure_slot() = None;
                info!(
                    model = %self.variant,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "speech model ready"
                );
                Ok(model)
            }
            Err(e) => {
                let message = e.to_string();
                error!(model = %self.variant, error = %message, "speech model failed to load");
                *self.failure_slot() = Some((message.clone(), Instant::now()));
                Err(Error::ModelLoadFailed(message))
            }
        }
    }

    /// Never waits on an in-flight load.
    pub async fn status(&self) -> ModelStatus {
        let last_error = self
            .failure_slot()
            .as_ref()
            .map(|(message, _)| message.clone());
        ModelStatus {
            variant: self.variant,
            loaded: self.is_loaded(),
            warning: self.warning.clone(),
            last_error,
        }
    }
}

impl ModelHandle {
    fn failure_slot(&self) -> std::sync::MutexGuard<'_, Option<(String, Instant)>> {
        self.last_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The cached failure message, if it is still inside the retry window.
    fn recent_failure(&self) -> Option<String> {
        self.failure_slot()
            .as_ref()
            .filter(|(_, at)| at.elapsed() < self.retry_after)
            .map(|(message, _)| message.clone())
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("variant", &self.variant)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

/// Ensure the weights for `variant` are in `cache_dir`, downloading them if needed.
/// Returns the path to the model file.
pub async fn ensure_model(variant: ModelVariant, cache_dir: &Path) -> Result<PathBuf> {
    let filename = variant.filename();
    let model_path = cache_dir.join(filename);

    if model_path.exists() {
        info!(path = %model_path.display(), "model already cached");
        return Ok(model_path);
    }

    std::fs::create_dir_all(cache_dir).map_err(|e| {
        Error::ModelLoadFailed(format!(
            "failed to create model dir {}: {e}",
            cache_dir.display()
        ))
    })?;

    let url = format!("{HUGGINGFACE_BASE}/{filename}");
    info!(%url, size = variant.approx_size(), "downloading model");
    download_model(&url, &model_path).await?;

    Ok(model_path)
}

async fn download_model(url: &str, dest: &Path) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| Error::ModelLoadFailed(format!("model download failed: {e}")))?;

    let total_size = response.content_length().unwrap_or(0);

    let pb = ProgressBar::new(total_size);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!(
        "Downloading {}",
        dest.file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default()
    ));

    // Partial downloads never carry the final name
    let tmp_path = dest.with_extension("bin.part");
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                tokio::fs::remove_file(&tmp_path).await.ok();
                return Err(e.into());
            }
        };
        if let Err(e) = file.write_all(&chunk).await {
            drop(file);
            tokio::fs::remove_file(&tmp_path).await.ok();
            return Err(e.into());
        }
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    file.flush().await?;
    drop(file);

    let file_size = tokio::fs::metadata(&tmp_path).await?.len();
    if file_size < 1_000_000 {
        tokio::fs::remove_file(&tmp_path).await.ok();
        return Err(Error::ModelLoadFailed(format!(
            "downloaded model too small ({file_size} bytes), likely an error page"
        )));
    }

    tokio::fs::rename(&tmp_path, dest).await?;
    pb.finish_with_message("Download complete");

    if total_size > 0 && file_size != total_size {
        warn!(
            expected = total_size,
            actual = file_size,
            "model size mismatch, file may be corrupt"
        );
    }

    info!(path = %dest.display(), size = file_size, "model saved");
    Ok(())
}

/// List the model files present in `cache_dir`.
pub fn list_cached_models(cache_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(cache_dir) else {
        return Vec::new();
    };

    let mut models: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "bin"))
        .collect();
    models.sort();
    models
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoModel;

    impl SpeechModel for EchoModel {
        fn transcribe(
            &self,
            _audio: &Path,
            language: Option<&str>,
        ) -> std::result::Result<Inference, ModelError> {
            Ok(Inference {
                segments: vec![TranscriptSegment::new(0.0, 1.0, "hello")],
                language: language.map(str::to_string),
            })
        }
    }

    struct CountingLoader {
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl CountingLoader {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
                delay: Duration::from_millis(20),
            })
        }
    }

    #[async_trait]
    impl ModelLoader for CountingLoader {
        async fn load(
            &self,
            _variant: ModelVariant,
        ) -> std::result::Result<Arc<dyn SpeechModel>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(ModelError::Load("weights corrupt".into()))
            } else {
                Ok(Arc::new(EchoModel))
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_use_loads_once() {
        let loader = CountingLoader::new(false);
        let handle = Arc::new(ModelHandle::new(ModelVariant::Tiny, loader.clone()));
        assert!(!handle.is_loaded());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                tokio::spawn(async move { handle.get_or_load().await.map(|_| ()) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_loaded());

        // later calls reuse the same instance
        let a = handle.get_or_load().await.unwrap();
        let b = handle.get_or_load().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_shared_then_retried() {
        let loader = CountingLoader::new(true);
        let handle = Arc::new(
            ModelHandle::new(ModelVariant::Base, loader.clone())
                .with_retry_after(Duration::from_millis(50)),
        );

        let (a, b) = tokio::join!(handle.get_or_load(), handle.get_or_load());
        assert!(matches!(a, Err(Error::ModelLoadFailed(_))));
        assert!(matches!(b, Err(Error::ModelLoadFailed(_))));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);

        let status = handle.status().await;
        assert!(!status.loaded);
        assert_eq!(status.last_error.as_deref(), Some("weights corrupt"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(handle.get_or_load().await.is_err());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_status_does_not_wait_for_load_in_progress() {
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            fail: false,
            delay: Duration::from_secs(5),
        });
        let handle = Arc::new(ModelHandle::new(ModelVariant::Large, loader.clone()));

        let loading = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.get_or_load().await.map(|_| ()) })
        };
        while loader.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let status = tokio::time::timeout(Duration::from_secs(1), handle.status())
            .await
            .expect("status waited on the load");
        assert!(!status.loaded);
        assert!(status.last_error.is_none());

        loading.abort();
    }

    #[tokio::test]
    async fn test_status_carries_config_warning() {
        let handle = ModelHandle::new(ModelVariant::Base, CountingLoader::new(false))
            .with_warning(Some("unknown model 'huge'".into()));
        let status = handle.status().await;
        assert_eq!(status.variant, ModelVariant::Base);
        assert_eq!(status.warning.as_deref(), Some("unknown model 'huge'"));
        assert!(status.last_error.is_none());
    }

    #[test]
    fn test_list_cached_models_nonexistent_dir() {
        assert!(list_cached_models(Path::new("/nonexistent/ytscribe/models")).is_empty());
    }

    #[test]
    fn test_list_cached_models_finds_bin_files() {
        let tmp = std::env::temp_dir().join("ytscribe_test_list_cache");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        fs::write(tmp.join("ggml-tiny.bin"), b"fake model").unwrap();
        fs::write(tmp.join("ggml-base.bin"), b"fake model").unwrap();
        fs::write(tmp.join("ggml-tiny.bin.part"), b"partial").unwrap();
        fs::write(tmp.join("readme.txt"), b"not a model").unwrap();

        let models = list_cached_models(&tmp);
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].file_name().unwrap(), "ggml-base.bin");

        fs::remove_dir_all(&tmp).ok();
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_files() {
        let tmp = std::env::temp_dir().join("ytscribe_test_model_download_fail");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        let dest = tmp.join("ggml-tiny.bin");

        // nothing listens on the discard port
        let result = download_model("http://127.0.0.1:9/ggml-tiny.bin", &dest).await;
        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("bin.part").exists());

        fs::remove_dir_all(&tmp).ok();
    }

    #[tokio::test]
    async fn test_ensure_model_uses_cache() {
        let tmp = std::env::temp_dir().join("ytscribe_test_model_cache");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let model_path = tmp.join("ggml-tiny.bin");
        fs::write(&model_path, b"fake cached model").unwrap();

        let result = ensure_model(ModelVariant::Tiny, &tmp).await.unwrap();
        assert_eq!(result, model_path);

        fs::remove_dir_all(&tmp).ok();
    }
}
