//! Video reference resolution: URL or bare ID in, canonical video ID out.
//!
//! Purely syntactic: nothing here touches the network.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::{Error, Result};

/// Length of a YouTube video ID.
const VIDEO_ID_LEN: usize = 11;

/// A resolved reference to a single YouTube video.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoReference {
    raw: String,
    video_id: String,
}

impl VideoReference {
    /// Resolve a watch URL, short link, embed URL or bare video ID.
    pub fn resolve(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let video_id = extract_video_id(trimmed)
            .ok_or_else(|| Error::InvalidReference(raw.to_string()))?;
        Ok(Self {
            raw: raw.to_string(),
            video_id,
        })
    }

    /// The input exactly as the caller supplied it.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The canonical 11-character video ID.
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Canonical watch URL for this video, as handed to yt-dlp.
    pub fn watch_url(&self) -> String {
        watch_url(&self.video_id)
    }
}

impl FromStr for VideoReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        VideoReference::resolve(s)
    }
}

impl fmt::Display for VideoReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.video_id)
    }
}

/// Canonical watch URL for a video ID.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Whether a token has the shape of a YouTube video ID.
pub fn is_video_id(token: &str) -> bool {
    token.len() == VIDEO_ID_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn extract_video_id(input: &str) -> Option<String> {
    if is_video_id(input) {
        return Some(input.to_string());
    }

    let url = parse_loose_url(input)?;
    let candidate = video_id_from_url(&url)?;
    is_video_id(&candidate).then_some(candidate)
}

/// Parse a URL, tolerating a missing scheme ("youtu.be/abc").
fn parse_loose_url(input: &str) -> Option<Url> {
    if input.is_empty() || input.chars().any(char::is_whitespace) {
        return None;
    }
    let url = if input.contains("://") {
        Url::parse(input).ok()?
    } else {
        Url::parse(&format!("https://{input}")).ok()?
    };
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn is_youtube_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == "youtube.com"
        || host.ends_with(".youtube.com")
        || host == "youtube-nocookie.com"
        || host.ends_with(".youtube-nocookie.com")
}

fn video_id_from_url(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();

    // youtu.be/<id>
    if host == "youtu.be" || host == "www.youtu.be" {
        return url.path_segments()?.next().map(str::to_string);
    }

    if !is_youtube_host(&host) {
        return None;
    }

    let mut segments = url.path_segments()?;
    match segments.next()? {
        // youtube.com/watch?v=<id>, v may appear anywhere in the query
        "watch" => url
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned()),
        // youtube.com/embed/<id>, /v/<id>, /shorts/<id>, /live/<id>
        "embed" | "v" | "shorts" | "live" => segments.next().map(str::to_string),
        _ => None,
    }
}
