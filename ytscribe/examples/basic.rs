//! Transcribe a YouTube video and print the text.
//!
//! Usage: cargo run --example basic -- https://youtu.be/dQw4w9WgXcQ

#[tokio::main]
async fn main() -> ytscribe::Result<()> {
    let input = std::env::args()
        .nth(1)
        .expect("usage: basic <youtube-url-or-id>");

    let transcript = ytscribe::transcribe(&input).await?;

    eprintln!("source: {}, language: {}", transcript.source, transcript.language);
    println!("{}", transcript.text());

    Ok(())
}
