use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Target sample rate for whisper.cpp.
pub(crate) const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Maximum audio duration in seconds (8 hours).
/// 8 hours at 16kHz mono f32 = ~1.8 GB.
const MAX_AUDIO_DURATION_SECS: f64 = 8.0 * 3600.0;

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A uniquely named directory that is removed, with its contents, when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create a fresh directory under `parent`. Names combine the process id,
    /// a timestamp and a counter so concurrent requests never collide.
    pub fn create(parent: &Path, prefix: &str) -> std::io::Result<Self> {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let seq = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = parent.join(format!("{prefix}-{}-{nanos}-{seq}", std::process::id()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to clean up scratch dir");
            }
        }
    }
}

/// Exclusive ownership of one downloaded audio file.
///
/// The file and its scratch directory are deleted exactly once: by
/// [`TransientAudio::release`] or, on any other exit path (early return,
/// panic, cancelled future), when the handle is dropped.
#[derive(Debug)]
pub struct TransientAudio {
    path: PathBuf,
    dir: ScratchDir,
}

impl TransientAudio {
    /// Take ownership of `path`, which must live inside `dir`.
    pub fn new(dir: ScratchDir, path: PathBuf) -> Self {
        Self { path, dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the audio now.
    pub fn release(self) {
        debug!(path = %self.path.display(), "releasing transient audio");
        drop(self);
    }

    pub(crate) fn scratch_dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Decode an audio file to 16kHz mono f32 samples ready for whisper.
///
/// Uses ffmpeg, so every container and codec yt-dlp can hand us works.
pub fn load_audio(path: &Path) -> Result<Vec<f32>> {
    info!(path = %path.display(), "loading audio");

    if !path.exists() {
        return Err(Error::InferenceFailed(format!(
            "audio file not found: {}",
            path.display()
        )));
    }

    let samples = decode_with_ffmpeg(path)?;

    let duration = samples.len() as f64 / WHISPER_SAMPLE_RATE as f64;
    if duration > MAX_AUDIO_DURATION_SECS {
        return Err(Error::InferenceFailed(format!(
            "audio too long ({duration:.0}s), maximum supported duration is {MAX_AUDIO_DURATION_SECS:.0}s"
        )));
    }

    info!(duration_secs = format!("{duration:.1}"), "audio ready");
    Ok(samples)
}

/// Output is raw PCM signed 16-bit little-endian, converted to f32 here.
fn decode_with_ffmpeg(path: &Path) -> Result<Vec<f32>> {
    let output = Command::new("ffmpeg")
        .args(["-nostdin", "-threads", "0", "-i"])
        .arg(path)
        .args(["-f", "s16le", "-ac", "1", "-acodec", "pcm_s16le", "-ar"])
        .arg(WHISPER_SAMPLE_RATE.to_string())
        .arg("-")
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::InferenceFailed("ffmpeg not found, install with: apt install ffmpeg".into())
            } else {
                Error::InferenceFailed(format!("failed to run ffmpeg: {e}"))
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let excerpt: String = stderr.trim().chars().take(1000).collect();
        return Err(Error::InferenceFailed(format!("ffmpeg failed: {excerpt}")));
    }

    if output.stdout.is_empty() {
        return Err(Error::InferenceFailed("ffmpeg produced no audio".into()));
    }

    Ok(pcm_s16le_to_f32(&output.stdout))
}

fn pcm_s16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0)
        .collect()
}
