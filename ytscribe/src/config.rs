use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

/// Whisper model variants accepted by the `WHISPER_MODEL` selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelVariant {
    Tiny,
    #[default]
    Base,
    Small,
    Medium,
    Large,
}

/// Outcome of resolving a configured variant selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSelection {
    pub variant: ModelVariant,
    /// Set when the selector was not recognized and the default was used instead.
    pub warning: Option<String>,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 5] = [
        ModelVariant::Tiny,
        ModelVariant::Base,
        ModelVariant::Small,
        ModelVariant::Medium,
        ModelVariant::Large,
    ];

    /// Parse a selector such as `"small"` or `" Medium "`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "tiny" => Some(ModelVariant::Tiny),
            "base" => Some(ModelVariant::Base),
            "small" => Some(ModelVariant::Small),
            "medium" => Some(ModelVariant::Medium),
            "large" => Some(ModelVariant::Large),
            _ => None,
        }
    }

    /// Resolve a selector, degrading to the default variant instead of failing.
    pub fn resolve(selector: Option<&str>) -> VariantSelection {
        let Some(raw) = selector else {
            return VariantSelection {
                variant: ModelVariant::default(),
                warning: None,
            };
        };

        match ModelVariant::parse(raw) {
            Some(variant) => VariantSelection {
                variant,
                warning: None,
            },
            None => {
                let valid = ModelVariant::ALL
                    .iter()
                    .map(ModelVariant::name)
                    .collect::<Vec<_>>()
                    .join(", ");
                let fallback = ModelVariant::default();
                let message = format!(
                    "invalid WHISPER_MODEL '{raw}', using '{}' instead (valid models: {valid})",
                    fallback.name()
                );
                warn!(selector = %raw, fallback = fallback.name(), "{message}");
                VariantSelection {
                    variant: fallback,
                    warning: Some(message),
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelVariant::Tiny => "tiny",
            ModelVariant::Base => "base",
            ModelVariant::Small => "small",
            ModelVariant::Medium => "medium",
            ModelVariant::Large => "large",
        }
    }

    /// Model filename as published in the whisper.cpp Hugging Face repository.
    pub fn filename(&self) -> &'static str {
        match self {
            ModelVariant::Tiny => "ggml-tiny.bin",
            ModelVariant::Base => "ggml-base.bin",
            ModelVariant::Small => "ggml-small.bin",
            ModelVariant::Medium => "ggml-medium.bin",
            ModelVariant::Large => "ggml-large-v3.bin",
        }
    }

    /// Approximate download size, for listings.
    pub fn approx_size(&self) -> &'static str {
        match self {
            ModelVariant::Tiny => "75 MB",
            ModelVariant::Base => "142 MB",
            ModelVariant::Small => "466 MB",
            ModelVariant::Medium => "1.5 GB",
            ModelVariant::Large => "2.9 GB",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-stage time budgets. Exceeding one is that stage's failure outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub captions: Duration,
    pub metadata: Duration,
    pub download: Duration,
    pub inference: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            captions: Duration::from_secs(30),
            metadata: Duration::from_secs(30),
            download: Duration::from_secs(600),
            inference: Duration::from_secs(1800),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub model: ModelVariant,
    /// Warning recorded when the configured selector had to be degraded.
    pub model_warning: Option<String>,
    pub model_dir: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub timeouts: StageTimeouts,
    pub max_concurrent_inference: usize,
    pub gpu: bool,
    pub n_threads: Option<u32>,
    /// Caption languages tried when the request carries no hint.
    pub default_caption_languages: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: ModelVariant::default(),
            model_warning: None,
            model_dir: None,
            scratch_dir: None,
            timeouts: StageTimeouts::default(),
            max_concurrent_inference: 1,
            gpu: true,
            n_threads: None,
            default_caption_languages: vec!["en".to_string()],
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Unparseable values keep
    /// their defaults and log a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut settings = Settings::default();

        let selection = ModelVariant::resolve(get("WHISPER_MODEL").as_deref());
        settings.model = selection.variant;
        settings.model_warning = selection.warning;

        settings.model_dir = get("YTSCRIBE_MODEL_DIR").map(PathBuf::from);
        settings.scratch_dir = get("YTSCRIBE_SCRATCH_DIR").map(PathBuf::from);

        let secs = |key: &str| parse_or_warn::<u64>(key, get(key)).map(Duration::from_secs);
        if let Some(d) = secs("YTSCRIBE_CAPTION_TIMEOUT_SECS") {
            settings.timeouts.captions = d;
        }
        if let Some(d) = secs("YTSCRIBE_METADATA_TIMEOUT_SECS") {
            settings.timeouts.metadata = d;
        }
        if let Some(d) = secs("YTSCRIBE_DOWNLOAD_TIMEOUT_SECS") {
            settings.timeouts.download = d;
        }
        if let Some(d) = secs("YTSCRIBE_INFERENCE_TIMEOUT_SECS") {
            settings.timeouts.inference = d;
        }
        if let Some(n) = parse_or_warn::<usize>(
            "YTSCRIBE_MAX_CONCURRENT_INFERENCE",
            get("YTSCRIBE_MAX_CONCURRENT_INFERENCE"),
        ) {
            if n == 0 {
                warn!("YTSCRIBE_MAX_CONCURRENT_INFERENCE must be at least 1, keeping default");
            } else {
                settings.max_concurrent_inference = n;
            }
        }
        if let Some(gpu) = parse_or_warn::<bool>("YTSCRIBE_USE_GPU", get("YTSCRIBE_USE_GPU")) {
            settings.gpu = gpu;
        }
        if let Some(n) = parse_or_warn::<u32>("YTSCRIBE_THREADS", get("YTSCRIBE_THREADS")) {
            settings.n_threads = Some(n);
        }
        if let Some(langs) = get("YTSCRIBE_CAPTION_LANGUAGES") {
            let langs: Vec<String> = langs
                .split(',')
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();
            if !langs.is_empty() {
                settings.default_caption_languages = langs;
            }
        }

        settings
    }

    pub fn model(mut self, model: ModelVariant) -> Self {
        self.model = model;
        self.model_warning = None;
        self
    }

    pub fn model_dir(mut self, dir: PathBuf) -> Self {
        self.model_dir = Some(dir);
        self
    }

    pub fn scratch_dir(mut self, dir: PathBuf) -> Self {
        self.scratch_dir = Some(dir);
        self
    }

    pub fn timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Cap the number of inference calls running at once. Must be at least 1.
    pub fn max_concurrent_inference(mut self, n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::InvalidOption(
                "max_concurrent_inference must be at least 1".into(),
            ));
        }
        self.max_concurrent_inference = n;
        Ok(self)
    }

    pub fn gpu(mut self, enabled: bool) -> Self {
        self.gpu = enabled;
        self
    }

    pub fn n_threads(mut self, n: u32) -> Result<Self> {
        if n == 0 {
            return Err(Error::InvalidOption("n_threads must be at least 1".into()));
        }
        self.n_threads = Some(n);
        Ok(self)
    }

    /// Resolve the model cache directory, defaulting to ~/.cache/ytscribe/models.
    pub fn resolve_model_dir(&self) -> PathBuf {
        self.model_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("ytscribe")
                .join("models")
        })
    }

    /// Resolve the directory transient audio is downloaded into.
    pub fn resolve_scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("ytscribe"))
    }
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let raw = value?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!(ModelVariant::parse("tiny"), Some(ModelVariant::Tiny));
        assert_eq!(ModelVariant::parse(" Medium "), Some(ModelVariant::Medium));
        assert_eq!(ModelVariant::parse("LARGE"), Some(ModelVariant::Large));
        assert_eq!(ModelVariant::parse("huge"), None);
        assert_eq!(ModelVariant::parse(""), None);
    }

    #[test]
    fn test_resolve_unknown_selector_degrades_to_base() {
        let selection = ModelVariant::resolve(Some("gigantic"));
        assert_eq!(selection.variant, ModelVariant::Base);
        let warning = selection.warning.expect("warning recorded");
        assert!(warning.contains("gigantic"));
        assert!(warning.contains("tiny, base, small, medium, large"));
    }

    #[test]
    fn test_resolve_known_selector_has_no_warning() {
        let selection = ModelVariant::resolve(Some("small"));
        assert_eq!(selection.variant, ModelVariant::Small);
        assert!(selection.warning.is_none());
    }

    #[test]
    fn test_resolve_missing_selector_uses_default() {
        let selection = ModelVariant::resolve(None);
        assert_eq!(selection.variant, ModelVariant::Base);
        assert!(selection.warning.is_none());
    }

    #[test]
    fn test_large_maps_to_v3_weights() {
        assert_eq!(ModelVariant::Large.filename(), "ggml-large-v3.bin");
        assert_eq!(ModelVariant::Tiny.filename(), "ggml-tiny.bin");
    }

    #[test]
    fn test_from_lookup_defaults() {
        let settings = Settings::from_lookup(lookup(&[]));
        assert_eq!(settings.model, ModelVariant::Base);
        assert!(settings.model_warning.is_none());
        assert_eq!(settings.max_concurrent_inference, 1);
        assert_eq!(settings.default_caption_languages, vec!["en".to_string()]);
        assert_eq!(settings.timeouts, StageTimeouts::default());
    }

    #[test]
    fn test_from_lookup_reads_values() {
        let settings = Settings::from_lookup(lookup(&[
            ("WHISPER_MODEL", "medium"),
            ("YTSCRIBE_DOWNLOAD_TIMEOUT_SECS", "42"),
            ("YTSCRIBE_MAX_CONCURRENT_INFERENCE", "3"),
            ("YTSCRIBE_USE_GPU", "false"),
            ("YTSCRIBE_CAPTION_LANGUAGES", "de, en"),
            ("YTSCRIBE_MODEL_DIR", "/srv/models"),
        ]));
        assert_eq!(settings.model, ModelVariant::Medium);
        assert_eq!(settings.timeouts.download, Duration::from_secs(42));
        assert_eq!(settings.max_concurrent_inference, 3);
        assert!(!settings.gpu);
        assert_eq!(settings.default_caption_languages, vec!["de", "en"]);
        assert_eq!(settings.resolve_model_dir(), PathBuf::from("/srv/models"));
    }

    #[test]
    fn test_from_lookup_invalid_model_is_not_fatal() {
        let settings = Settings::from_lookup(lookup(&[("WHISPER_MODEL", "xl")]));
        assert_eq!(settings.model, ModelVariant::Base);
        assert!(settings.model_warning.is_some());
    }

    #[test]
    fn test_from_lookup_ignores_garbage_numbers() {
        let settings = Settings::from_lookup(lookup(&[
            ("YTSCRIBE_INFERENCE_TIMEOUT_SECS", "soon"),
            ("YTSCRIBE_MAX_CONCURRENT_INFERENCE", "0"),
        ]));
        assert_eq!(settings.timeouts.inference, StageTimeouts::default().inference);
        assert_eq!(settings.max_concurrent_inference, 1);
    }

    #[test]
    fn test_builder_rejects_zero_concurrency() {
        assert!(matches!(
            Settings::new().max_concurrent_inference(0),
            Err(Error::InvalidOption(_))
        ));
        assert!(Settings::new().max_concurrent_inference(2).is_ok());
    }
}
