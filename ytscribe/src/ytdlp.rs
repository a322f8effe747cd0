//! Thin async wrapper around the yt-dlp executable.

use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::MediaFailure;

pub(crate) const DEFAULT_PROGRAM: &str = "yt-dlp";

/// Longest stderr excerpt carried in error messages.
const STDERR_LIMIT: usize = 1000;

#[derive(Debug)]
pub(crate) enum RunError {
    NotInstalled,
    TimedOut(Duration),
    Io(std::io::Error),
}

/// Run yt-dlp with `args` and wait for it to exit, bounded by `timeout`.
///
/// The child is killed if the timeout fires or the returned future is dropped.
/// Arguments go through `.args()` so no shell expansion takes place.
pub(crate) async fn run<I, S>(program: &str, args: I, timeout: Duration) -> Result<Output, RunError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program, ?timeout, "spawning yt-dlp");

    let child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RunError::NotInstalled
        } else {
            RunError::Io(e)
        }
    })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(RunError::Io),
        Err(_) => Err(RunError::TimedOut(timeout)),
    }
}

/// Lossy, length-limited stderr for error messages.
pub(crate) fn stderr_excerpt(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr.trim().chars().take(STDERR_LIMIT).collect()
}

/// Classify a failed yt-dlp run by its stderr.
pub(crate) fn classify_failure(stderr: &str) -> MediaFailure {
    let lower = stderr.to_lowercase();
    const RESTRICTED: [&str; 6] = [
        "private video",
        "sign in to confirm your age",
        "members-only",
        "join this channel",
        "in your country",
        "geo restriction",
    ];
    const MISSING: [&str; 4] = [
        "video unavailable",
        "has been removed",
        "does not exist",
        "incomplete youtube id",
    ];

    if RESTRICTED.iter().any(|p| lower.contains(p)) {
        MediaFailure::Restricted
    } else if MISSING.iter().any(|p| lower.contains(p)) {
        MediaFailure::NotFound
    } else {
        MediaFailure::Network
    }
}
