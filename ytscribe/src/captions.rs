//! Caption Source: existing caption tracks via yt-dlp.
//!
//! Tracks are requested in YouTube's `json3` format, which carries exact
//! millisecond timings per cue.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::audio::ScratchDir;
use crate::reference::watch_url;
use crate::types::TranscriptSegment;
use crate::ytdlp::{self, RunError};

/// A caption track as served, with the language actually used.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTrack {
    pub segments: Vec<TranscriptSegment>,
    pub language: String,
}

/// Why no caption track was returned. Both variants trigger the fallback path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptionError {
    /// The video has no usable track for the requested languages.
    #[error("no captions available: {0}")]
    NotFound(String),
    /// The fetch itself failed (network, tool missing, timeout, parse error).
    #[error("caption fetch failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// Fetch captions for `video_id`, preferring `language_hint` when given.
    async fn fetch(
        &self,
        video_id: &str,
        language_hint: Option<&str>,
    ) -> Result<CaptionTrack, CaptionError>;
}

/// Caption source backed by `yt-dlp --write-subs --write-auto-subs`.
pub struct YtDlpCaptionSource {
    program: String,
    scratch_root: PathBuf,
    timeout: Duration,
    default_languages: Vec<String>,
}

impl YtDlpCaptionSource {
    pub fn new(scratch_root: PathBuf, timeout: Duration, default_languages: Vec<String>) -> Self {
        Self {
            program: ytdlp::DEFAULT_PROGRAM.to_string(),
            scratch_root,
            timeout,
            default_languages,
        }
    }

    /// Use a yt-dlp executable other than the one on `PATH`.
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn wanted_languages(&self, hint: Option<&str>) -> Result<Vec<String>, CaptionError> {
        match hint {
            Some(hint) => {
                let hint = hint.trim();
                if !is_language_tag(hint) {
                    return Err(CaptionError::NotFound(format!(
                        "unsupported caption language '{hint}'"
                    )));
                }
                Ok(vec![hint.to_string()])
            }
            None => Ok(self.default_languages.clone()),
        }
    }
}

#[async_trait]
impl CaptionSource for YtDlpCaptionSource {
    async fn fetch(
        &self,
        video_id: &str,
        language_hint: Option<&str>,
    ) -> Result<CaptionTrack, CaptionError> {
        let wanted = self.wanted_languages(language_hint)?;

        let scratch = ScratchDir::create(&self.scratch_root, "captions")
            .map_err(|e| CaptionError::Transport(format!("failed to create scratch dir: {e}")))?;

        let output_template = scratch.path().join("%(id)s.%(ext)s");
        let output_template = output_template.to_str().ok_or_else(|| {
            CaptionError::Transport("scratch path contains invalid UTF-8".into())
        })?;

        let sub_langs = sub_langs_argument(&wanted);
        let url = watch_url(video_id);
        info!(video_id, languages = %sub_langs, "fetching captions");

        let args = [
            "--skip-download",
            "--write-subs",
            "--write-auto-subs",
            "--sub-langs",
            sub_langs.as_str(),
            "--sub-format",
            "json3",
            "--no-playlist",
            "--no-exec",
            "--no-warnings",
            "--output",
            output_template,
            url.as_str(),
        ];

        let output = ytdlp::run(&self.program, args, self.timeout)
            .await
            .map_err(|e| match e {
                RunError::NotInstalled => CaptionError::Transport("yt-dlp not installed".into()),
                RunError::TimedOut(t) => {
                    CaptionError::Transport(format!("caption fetch timed out after {t:?}"))
                }
                RunError::Io(e) => CaptionError::Transport(format!("failed to run yt-dlp: {e}")),
            })?;

        if !output.status.success() {
            return Err(CaptionError::Transport(format!(
                "yt-dlp failed: {}",
                ytdlp::stderr_excerpt(&output)
            )));
        }

        let tracks = list_tracks(scratch.path(), video_id)
            .map_err(|e| CaptionError::Transport(format!("failed to read caption files: {e}")))?;

        let (language, path) = pick_track(&tracks, &wanted).ok_or_else(|| {
            CaptionError::NotFound(format!("no caption track for languages [{}]", wanted.join(", ")))
        })?;

        let body = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CaptionError::Transport(format!("failed to read caption file: {e}")))?;

        let segments = parse_json3(&body)
            .map_err(|e| CaptionError::Transport(format!("malformed caption track: {e}")))?;

        if segments.iter().all(|s| s.text.trim().is_empty()) {
            return Err(CaptionError::NotFound(format!("caption track '{language}' is empty")));
        }

        debug!(video_id, %language, segments = segments.len(), "captions fetched");
        Ok(CaptionTrack {
            segments,
            language: language.clone(),
        })
    }
}

/// Language tags are letters, digits and dashes, e.g. `en`, `pt-BR`, `zh-Hans`.
fn is_language_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.len() <= 35
        && tag.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        && tag.as_bytes()[0].is_ascii_alphabetic()
}

/// `en` becomes `en,en-.*` so regional variants are accepted when the exact
/// language is missing.
fn sub_langs_argument(languages: &[String]) -> String {
    languages
        .iter()
        .flat_map(|l| [l.clone(), format!("{l}-.*")])
        .collect::<Vec<_>>()
        .join(",")
}

/// Caption files written for `video_id`, as (language, path) pairs.
fn list_tracks(dir: &Path, video_id: &str) -> std::io::Result<Vec<(String, PathBuf)>> {
    let prefix = format!("{video_id}.");
    let mut tracks = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(language) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".json3"))
        {
            tracks.push((language.to_string(), path.clone()));
        }
    }
    tracks.sort();
    Ok(tracks)
}

/// Choose a track: exact language match first, then a regional variant, in
/// the order the languages were requested.
fn pick_track<'a>(
    tracks: &'a [(String, PathBuf)],
    wanted: &[String],
) -> Option<&'a (String, PathBuf)> {
    for lang in wanted {
        if let Some(track) = tracks.iter().find(|(l, _)| l.eq_ignore_ascii_case(lang)) {
            return Some(track);
        }
        let variant_prefix = format!("{}-", lang.to_lowercase());
        if let Some(track) = tracks
            .iter()
            .find(|(l, _)| l.to_lowercase().starts_with(&variant_prefix))
        {
            return Some(track);
        }
    }
    None
}

#[derive(Deserialize)]
struct Json3 {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Json3Event {
    t_start_ms: Option<f64>,
    d_duration_ms: Option<f64>,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

/// Parse a json3 caption track into raw segments (untrimmed, unsorted).
fn parse_json3(body: &str) -> Result<Vec<TranscriptSegment>, serde_json::Error> {
    let track: Json3 = serde_json::from_str(body)?;
    Ok(track
        .events
        .into_iter()
        .filter(|e| !e.segs.is_empty())
        .filter_map(|e| {
            let start = e.t_start_ms? / 1000.0;
            let duration = e.d_duration_ms.unwrap_or(0.0) / 1000.0;
            let text: String = e.segs.iter().map(|s| s.utf8.as_str()).collect();
            Some(TranscriptSegment::new(start, duration, text.replace('\n', " ")))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "wireMagic": "pb3",
        "events": [
            {"tStartMs": 0, "dDurationMs": 5000, "id": 1, "wWinId": 1},
            {"tStartMs": 120, "dDurationMs": 2880, "segs": [{"utf8": "Never gonna "}, {"utf8": "give you up", "tOffsetMs": 400}]},
            {"tStartMs": 3000, "aAppend": 1, "segs": [{"utf8": "\n"}]},
            {"tStartMs": 3000, "dDurationMs": 2500, "segs": [{"utf8": "never gonna\nlet you down"}]}
        ]
    }"#;

    #[test]
    fn test_parse_json3() {
        let segments = parse_json3(SAMPLE).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], TranscriptSegment::new(0.12, 2.88, "Never gonna give you up"));
        // newline-only append events become blank segments, dropped later
        assert!(segments[1].text.trim().is_empty());
        assert_eq!(segments[2].text, "never gonna let you down");
        assert_eq!(segments[2].start, 3.0);
    }

    #[test]
    fn test_parse_json3_rejects_garbage() {
        assert!(parse_json3("<html>").is_err());
    }

    #[test]
    fn test_parse_json3_without_events() {
        assert!(parse_json3("{}").unwrap().is_empty());
    }

    #[test]
    fn test_sub_langs_argument() {
        let langs = vec!["en".to_string(), "de".to_string()];
        assert_eq!(sub_langs_argument(&langs), "en,en-.*,de,de-.*");
    }

    #[test]
    fn test_language_tag_validation() {
        assert!(is_language_tag("en"));
        assert!(is_language_tag("pt-BR"));
        assert!(is_language_tag("zh-Hans"));
        assert!(!is_language_tag(""));
        assert!(!is_language_tag("en,all"));
        assert!(!is_language_tag("en.*"));
        assert!(!is_language_tag("-en"));
    }

    fn track(lang: &str) -> (String, PathBuf) {
        (lang.to_string(), PathBuf::from(format!("/tmp/x.{lang}.json3")))
    }

    #[test]
    fn test_pick_track_prefers_exact() {
        let tracks = vec![track("en"), track("en-GB"), track("en-US")];
        let picked = pick_track(&tracks, &["en".to_string()]).unwrap();
        assert_eq!(picked.0, "en");
    }

    #[test]
    fn test_pick_track_substitutes_variant() {
        let tracks = vec![track("de"), track("en-US")];
        let picked = pick_track(&tracks, &["en".to_string()]).unwrap();
        assert_eq!(picked.0, "en-US");
    }

    #[test]
    fn test_pick_track_respects_request_order() {
        let tracks = vec![track("de"), track("en")];
        let picked = pick_track(&tracks, &["fr".to_string(), "de".to_string()]).unwrap();
        assert_eq!(picked.0, "de");
        assert!(pick_track(&tracks, &["fr".to_string()]).is_none());
    }

    #[test]
    fn test_list_tracks() {
        let root = std::env::temp_dir().join("ytscribe_captions_test_list");
        let dir = ScratchDir::create(&root, "captions").unwrap();
        std::fs::write(dir.path().join("dQw4w9WgXcQ.en.json3"), "{}").unwrap();
        std::fs::write(dir.path().join("dQw4w9WgXcQ.pt-BR.json3"), "{}").unwrap();
        std::fs::write(dir.path().join("dQw4w9WgXcQ.en.vtt"), "").unwrap();
        std::fs::write(dir.path().join("other.en.json3"), "{}").unwrap();

        let tracks = list_tracks(dir.path(), "dQw4w9WgXcQ").unwrap();
        let langs: Vec<&str> = tracks.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(langs, vec!["en", "pt-BR"]);
    }

    #[tokio::test]
    async fn test_invalid_hint_is_not_found() {
        let source = YtDlpCaptionSource::new(
            std::env::temp_dir(),
            Duration::from_secs(1),
            vec!["en".into()],
        );
        let err = source.fetch("dQw4w9WgXcQ", Some("en,all")).await.unwrap_err();
        assert!(matches!(err, CaptionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_tool_is_transport_error() {
        let source = YtDlpCaptionSource::new(
            std::env::temp_dir(),
            Duration::from_secs(1),
            vec!["en".into()],
        )
        .program("ytscribe-definitely-not-a-real-binary");
        let err = source.fetch("dQw4w9WgXcQ", None).await.unwrap_err();
        assert!(matches!(err, CaptionError::Transport(_)));
    }
}
