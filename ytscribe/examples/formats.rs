//! Output a transcript as SRT, WebVTT, and JSON.
//!
//! Usage: cargo run --example formats -- dQw4w9WgXcQ

#[tokio::main]
async fn main() -> ytscribe::Result<()> {
    let input = std::env::args()
        .nth(1)
        .expect("usage: formats <youtube-url-or-id>");

    let transcript = ytscribe::transcribe(&input).await?;

    println!("=== SRT ===\n{}", transcript.to_srt());
    println!("=== WebVTT ===\n{}", transcript.to_vtt());
    println!("=== JSON ===\n{}", transcript.to_json_pretty()?);

    Ok(())
}
