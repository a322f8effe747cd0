//! Startup check for the external tools the fallback path shells out to.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

/// Log whether `yt-dlp` and `ffmpeg` can be executed. Missing tools only
/// disable the paths that need them, so this never fails startup.
pub async fn check_tools() {
    for (program, flag, hint) in [
        ("yt-dlp", "--version", "captions and audio download will fail"),
        ("ffmpeg", "-version", "whisper transcription will fail"),
    ] {
        let status = Command::new(program)
            .arg(flag)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;
        match status {
            Ok(s) if s.success() => info!(program, "found"),
            Ok(s) => warn!(program, status = %s, "{hint}"),
            Err(e) => warn!(program, error = %e, "not available, {hint}"),
        }
    }
}
