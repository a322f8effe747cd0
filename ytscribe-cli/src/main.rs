use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;
use ytscribe::{ModelVariant, Orchestrator, Settings, TranscriptResult};

#[derive(Parser)]
#[command(
    name = "ytscribe",
    version,
    about = "Transcribe a YouTube video: captions when available, whisper otherwise"
)]
struct Cli {
    /// YouTube URL or 11-character video ID.
    #[arg(required_unless_present_any = ["list_models", "download_model"])]
    input: Option<String>,

    /// Output format.
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Write output to file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Preferred language (e.g. "en", "de"). Captions in this language are
    /// preferred; whisper uses it as a decoding hint.
    #[arg(short, long)]
    language: Option<String>,

    /// Skip captions and always transcribe the audio with whisper.
    #[arg(short = 'w', long)]
    use_whisper: bool,

    /// Whisper model: tiny, base, small, medium, large (default: $WHISPER_MODEL or base).
    #[arg(short, long)]
    model: Option<String>,

    /// Disable GPU acceleration.
    #[arg(long)]
    no_gpu: bool,

    /// Number of inference threads (default: auto).
    #[arg(long)]
    threads: Option<u32>,

    /// Model cache directory.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Directory for downloaded audio while it is being transcribed.
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// List available models and those already downloaded.
    #[arg(long)]
    list_models: bool,

    /// Download a model without transcribing.
    #[arg(long)]
    download_model: Option<String>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Srt,
    Vtt,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ytscribe=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut settings = Settings::from_env();
    if let Some(dir) = cli.model_dir.clone() {
        settings = settings.model_dir(dir);
    }

    if cli.list_models {
        list_models(&settings);
        return;
    }

    if let Some(name) = &cli.download_model {
        let variant = parse_model_or_exit(name);
        let model_dir = settings.resolve_model_dir();
        match ytscribe::model::ensure_model(variant, &model_dir).await {
            Ok(path) => println!("Model ready: {}", path.display()),
            Err(e) => fail(&e),
        }
        return;
    }

    let Some(input) = cli.input.as_deref() else {
        eprintln!("Error: no input given");
        std::process::exit(2);
    };

    if let Some(name) = &cli.model {
        settings = settings.model(parse_model_or_exit(name));
    }
    let gpu = settings.gpu && !cli.no_gpu;
    settings = settings.gpu(gpu);
    if let Some(n) = cli.threads {
        settings = settings.n_threads(n).unwrap_or_else(|e| fail(&e));
    }
    if let Some(dir) = cli.scratch_dir.clone() {
        settings = settings.scratch_dir(dir);
    }

    let orchestrator = Orchestrator::from_settings(&settings);
    let transcript = orchestrator
        .transcribe_input(input, cli.language.as_deref(), cli.use_whisper)
        .await
        .unwrap_or_else(|e| fail(&e));

    eprintln!(
        "Transcription complete: {} segments from {}, language: {}{}",
        transcript.segments.len(),
        transcript.source,
        transcript.language,
        transcript
            .title
            .as_deref()
            .map(|t| format!(", title: {t}"))
            .unwrap_or_default(),
    );

    let output_text = render(&transcript, &cli.format).unwrap_or_else(|e| fail(&e));

    match cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &output_text) {
                eprintln!("Error writing to {}: {e}", path.display());
                std::process::exit(1);
            }
            eprintln!("Written to {}", path.display());
        }
        None => print!("{output_text}"),
    }
}

fn render(transcript: &TranscriptResult, format: &OutputFormat) -> ytscribe::Result<String> {
    Ok(match format {
        OutputFormat::Text => {
            let mut text = transcript.text();
            text.push('\n');
            text
        }
        OutputFormat::Srt => transcript.to_srt(),
        OutputFormat::Vtt => transcript.to_vtt(),
        OutputFormat::Json => transcript.to_json_pretty()?,
    })
}

fn list_models(settings: &Settings) {
    println!("{:<8} {:<20} SIZE", "MODEL", "FILE");
    println!("{:<8} {:<20} ----", "-----", "----");
    for variant in ModelVariant::ALL {
        println!(
            "{:<8} {:<20} {}",
            variant.name(),
            variant.filename(),
            variant.approx_size()
        );
    }

    let model_dir = settings.resolve_model_dir();
    let cached = ytscribe::model::list_cached_models(&model_dir);
    if !cached.is_empty() {
        println!("\nCached models in {}:", model_dir.display());
        for path in cached {
            let size = std::fs::metadata(&path)
                .map(|m| format_bytes(m.len()))
                .unwrap_or_default();
            println!(
                "  {} ({})",
                path.file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                size
            );
        }
    }
}

fn parse_model_or_exit(name: &str) -> ModelVariant {
    ModelVariant::parse(name).unwrap_or_else(|| {
        eprintln!("Unknown model: {name}");
        eprintln!("Use --list-models to see available models");
        std::process::exit(1);
    })
}

fn fail(err: &ytscribe::Error) -> ! {
    eprintln!("Error: {err}");
    std::process::exit(1);
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.1} GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.0} MB", bytes as f64 / 1_000_000.0)
    } else {
        format!("{:.0} KB", bytes as f64 / 1_000.0)
    }
}
