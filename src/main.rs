use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use companion_voice::telemetry::AnalyzerConfig;
use companion_voice::{
    AudioFile, Config, EmotionSnapshot, EventStreamProcessor, FrequencyAnalyzer, SessionEvent,
    TokenIssuer,
};
use serde::Serialize;
use std::io::{BufRead, BufReader};
use tracing::info;

#[derive(Parser)]
#[command(name = "companion-voice", version, about = "Voice session diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Request an ephemeral credential and report its expiry
    ProbeToken {
        #[arg(long, default_value = "config/companion-voice")]
        config: String,
    },
    /// Run the telemetry analyzer over a WAV file
    Analyze {
        wav: String,
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
    },
    /// Feed recorded data-channel frames through the event processor
    Replay { jsonl: String },
}

#[derive(Serialize)]
struct TimedSnapshot {
    at_ms: u64,
    #[serde(flatten)]
    snapshot: EmotionSnapshot,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::ProbeToken { config } => probe_token(&config).await,
        Command::Analyze { wav, interval_ms } => analyze(&wav, interval_ms),
        Command::Replay { jsonl } => replay(&jsonl),
    }
}

async fn probe_token(path: &str) -> Result<()> {
    let cfg = Config::load(path)?;
    info!("Loaded config: {}", cfg.service.name);
    info!("HTTP control API configured for {}", cfg.http_addr());

    let issuer = cfg.token_issuer()?;
    let credential = issuer.request_ephemeral_credential().await?;

    info!(
        "Ephemeral credential issued, expires at {}",
        credential.expires_at()
    );

    Ok(())
}

fn analyze(path: &str, interval_ms: u64) -> Result<()> {
    let audio = AudioFile::open(path)?;
    info!(
        "Analyzing {:.1}s of audio ({} Hz, {} channels)",
        audio.duration_seconds, audio.sample_rate, audio.channels
    );

    let samples = audio.to_mono_at(audio.sample_rate);
    let per_interval = ((audio.sample_rate as u64 * interval_ms) / 1000).max(1) as usize;
    let mut analyzer = FrequencyAnalyzer::new(AnalyzerConfig::default());

    for (i, chunk) in samples.chunks(per_interval).enumerate() {
        analyzer.push_samples(chunk);
        let snapshot = EmotionSnapshot::from_bins(&analyzer.byte_frequency_data());
        let line = TimedSnapshot {
            at_ms: (i as u64 + 1) * interval_ms,
            snapshot,
        };
        println!("{}", serde_json::to_string(&line)?);
    }

    Ok(())
}

fn replay(path: &str) -> Result<()> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {}", path))?;
    let mut processor = EventStreamProcessor::new();

    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        for output in processor.process_frame(&line) {
            println!("{}", serde_json::to_string(&SessionEvent::from(output))?);
        }
    }

    info!("Replayed {} events", processor.processed());

    Ok(())
}
