use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A timed piece of transcript text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start offset in seconds.
    pub start: f64,
    /// Duration in seconds.
    pub duration: f64,
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start: f64, duration: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            duration,
            text: text.into(),
        }
    }

    /// End offset in seconds.
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Which acquisition path produced a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptSource {
    Captions,
    Whisper,
}

impl TranscriptSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptSource::Captions => "captions",
            TranscriptSource::Whisper => "whisper",
        }
    }
}

impl fmt::Display for TranscriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The uniform transcription result, whichever path produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub video_id: String,
    pub title: Option<String>,
    /// Video duration in seconds.
    pub duration: Option<f64>,
    /// Language actually served by captions or detected by the model.
    pub language: String,
    pub source: TranscriptSource,
    pub segments: Vec<TranscriptSegment>,
    pub created_at: DateTime<Utc>,
}

/// Clean up raw segments from either acquisition path.
///
/// Text is trimmed and blank segments are dropped, negative offsets are
/// clamped to zero, non-finite timings are dropped, and the result is stably
/// sorted by start offset.
pub fn normalize_segments(raw: Vec<TranscriptSegment>) -> Vec<TranscriptSegment> {
    let mut segments: Vec<TranscriptSegment> = raw
        .into_iter()
        .filter(|s| s.start.is_finite() && s.duration.is_finite())
        .filter_map(|s| {
            let text = s.text.trim();
            if text.is_empty() {
                return None;
            }
            Some(TranscriptSegment {
                start: s.start.max(0.0),
                duration: s.duration.max(0.0),
                text: text.to_string(),
            })
        })
        .collect();

    segments.sort_by(|a, b| a.start.total_cmp(&b.start));
    segments
}

impl TranscriptResult {
    /// Full text (all segments joined by spaces).
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Format as SRT subtitles.
    pub fn to_srt(&self) -> String {
        let mut out = String::new();
        for (i, seg) in self.segments.iter().enumerate() {
            out.push_str(&format!("{}\n", i + 1));
            out.push_str(&format!(
                "{} --> {}\n",
                format_timestamp(seg.start, ','),
                format_timestamp(seg.end(), ',')
            ));
            out.push_str(&seg.text);
            out.push_str("\n\n");
        }
        out
    }

    /// Format as WebVTT subtitles.
    pub fn to_vtt(&self) -> String {
        let mut out = String::from("WEBVTT\n\n");
        for seg in &self.segments {
            out.push_str(&format!(
                "{} --> {}\n",
                format_timestamp(seg.start, '.'),
                format_timestamp(seg.end(), '.')
            ));
            out.push_str(&seg.text);
            out.push_str("\n\n");
        }
        out
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// HH:MM:SS followed by `sep` and milliseconds (`,` for SRT, `.` for VTT).
fn format_timestamp(seconds: f64, sep: char) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let h = total_ms / 3_600_000;
    let m = (total_ms % 3_600_000) / 60_000;
    let s = (total_ms % 60_000) / 1_000;
    let ms = total_ms % 1_000;
    format!("{h:02}:{m:02}:{s:02}{sep}{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(segments: Vec<TranscriptSegment>) -> TranscriptResult {
        TranscriptResult {
            video_id: "dQw4w9WgXcQ".into(),
            title: Some("Title".into()),
            duration: Some(212.0),
            language: "en".into(),
            source: TranscriptSource::Captions,
            segments,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_normalize_trims_and_drops_blank() {
        let out = normalize_segments(vec![
            TranscriptSegment::new(0.0, 1.0, "  hello "),
            TranscriptSegment::new(1.0, 1.0, " \n "),
            TranscriptSegment::new(2.0, 1.0, "world"),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, "hello");
        assert_eq!(out[1].text, "world");
    }

    #[test]
    fn test_normalize_sorts_and_keeps_overlap() {
        let out = normalize_segments(vec![
            TranscriptSegment::new(5.0, 2.0, "c"),
            TranscriptSegment::new(0.0, 4.0, "a"),
            TranscriptSegment::new(1.0, 4.0, "b"),
        ]);
        let starts: Vec<f64> = out.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![0.0, 1.0, 5.0]);
        // overlapping segments are legitimate and kept
        assert!(out[0].end() > out[1].start);
    }

    #[test]
    fn test_normalize_clamps_negative_and_drops_nan() {
        let out = normalize_segments(vec![
            TranscriptSegment::new(-0.5, -1.0, "early"),
            TranscriptSegment::new(f64::NAN, 1.0, "broken"),
            TranscriptSegment::new(1.0, f64::INFINITY, "broken too"),
        ]);
        assert_eq!(out, vec![TranscriptSegment::new(0.0, 0.0, "early")]);
    }

    #[test]
    fn test_source_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TranscriptSource::Captions).unwrap(),
            "\"captions\""
        );
        assert_eq!(
            serde_json::to_string(&TranscriptSource::Whisper).unwrap(),
            "\"whisper\""
        );
    }

    #[test]
    fn test_json_field_names() {
        let json = result(vec![TranscriptSegment::new(0.0, 1.5, "hi")])
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["video_id"], "dQw4w9WgXcQ");
        assert_eq!(value["source"], "captions");
        assert_eq!(value["segments"][0]["duration"], 1.5);
        assert!(value["created_at"].is_string());
    }

    #[test]
    fn test_srt_and_vtt() {
        let r = result(vec![
            TranscriptSegment::new(0.0, 1.5, "first"),
            TranscriptSegment::new(3661.25, 2.0, "second"),
        ]);
        let srt = r.to_srt();
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:01,500\nfirst\n\n"));
        assert!(srt.contains("2\n01:01:01,250 --> 01:01:03,250\nsecond"));

        let vtt = r.to_vtt();
        assert!(vtt.starts_with("WEBVTT\n\n00:00:00.000 --> 00:00:01.500\nfirst"));
    }

    #[test]
    fn test_text_joins_segments() {
        let r = result(vec![
            TranscriptSegment::new(0.0, 1.0, "hello"),
            TranscriptSegment::new(1.0, 1.0, "world"),
        ]);
        assert_eq!(r.text(), "hello world");
    }
}
