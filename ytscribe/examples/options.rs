//! Force the speech model with explicit settings.
//!
//! Usage: cargo run --example options -- https://www.youtube.com/watch?v=dQw4w9WgXcQ de

use std::time::Duration;

use ytscribe::{ModelVariant, Orchestrator, Settings, StageTimeouts};

#[tokio::main]
async fn main() -> ytscribe::Result<()> {
    let mut args = std::env::args().skip(1);
    let input = args.next().expect("usage: options <youtube-url-or-id> [language]");
    let language = args.next();

    let settings = Settings::new()
        .model(ModelVariant::Small)
        .gpu(false)
        .n_threads(4)?
        .timeouts(StageTimeouts {
            download: Duration::from_secs(300),
            ..StageTimeouts::default()
        });

    let orchestrator = Orchestrator::from_settings(&settings);
    let transcript = orchestrator
        .transcribe_input(&input, language.as_deref(), true)
        .await?;

    for seg in &transcript.segments {
        println!("[{:>8.2} +{:>5.2}] {}", seg.start, seg.duration, seg.text);
    }

    Ok(())
}
