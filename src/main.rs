//! speakd - speak text through the OpenAI speech endpoint

use clap::Parser;
use speakd::backends::{select_backend, PlayerChoice};
use speakd::cache::CacheResolver;
use speakd::config_loader::Settings;
use speakd::credentials::resolve_api_key;
use speakd::engine::{PlaybackIntent, SpeechEngine};
use speakd::error::{Result, SpeakError};
use speakd::provider::OpenAiProvider;
use speakd::request::{OutputTarget, SpeechRequest, AUTO_OUTPUT};
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Convert text to speech and play it
#[derive(Parser, Debug)]
#[command(name = "speakd")]
#[command(author = "StarTuz")]
#[command(version)]
#[command(about = "Speak text aloud using OpenAI text-to-speech", long_about = None)]
struct Cli {
    /// Text to speak (read from stdin when omitted)
    text: Vec<String>,

    /// Voice: alloy, ash, ballad, coral, echo, fable, onyx, nova, sage, shimmer, verse
    #[arg(short, long)]
    voice: Option<String>,

    /// Speaking rate (0.25-4.0)
    #[arg(short, long)]
    speed: Option<f32>,

    /// Output file, or AUTO to use the shared cache
    #[arg(short, long, default_value = AUTO_OUTPUT)]
    output: String,

    /// API key (overrides OPENAI_API_KEY and the key file)
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Model name
    #[arg(short, long)]
    model: Option<String>,

    /// Retries after the first attempt on network failure
    #[arg(short, long)]
    retries: Option<u32>,

    /// Per-attempt timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Audio player
    #[arg(short, long, value_enum)]
    player: Option<PlayerChoice>,

    /// Only write the audio file, do not play it
    #[arg(long)]
    no_play: bool,

    /// Debug logging on stderr
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    speakd::logging::init(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let text = match collect_text(&cli.text)? {
        Some(t) => t,
        None => {
            eprintln!("Nothing to say. Run `speakd --help` for usage.");
            return Ok(());
        }
    };

    let settings = Settings::new()?;
    let mut request = SpeechRequest::from_settings(text, &settings);
    if let Some(voice) = cli.voice {
        request.voice = voice;
    }
    if let Some(speed) = cli.speed {
        request.speed = speed;
    }
    if let Some(model) = cli.model {
        request.model = model;
    }
    if let Some(retries) = cli.retries {
        request.max_retries = retries;
    }
    if let Some(timeout) = cli.timeout {
        request.timeout_secs = timeout;
    }
    request.output = OutputTarget::parse(&cli.output);
    request.validate()?;

    // Fail on a missing player before spending an API call
    let intent = if cli.no_play {
        PlaybackIntent::Skip
    } else {
        PlaybackIntent::Play(select_backend(cli.player.unwrap_or(settings.player))?)
    };

    let api_key = resolve_api_key(cli.api_key.as_deref(), &PathBuf::from(&settings.api_key_file))?;
    let provider = OpenAiProvider::from_settings(&settings, api_key)?;
    let engine = SpeechEngine::new(
        Arc::new(provider),
        CacheResolver::new(settings.cache_dir(), settings.cache_prefix.clone()),
    );

    let path = engine.run(&request, &intent).await?;
    println!("{}", path.display());
    Ok(())
}

/// Joins positional words, falling back to piped stdin. `None` means there is
/// nothing to say.
fn collect_text(words: &[String]) -> Result<Option<String>> {
    let mut text = words.join(" ");
    if text.trim().is_empty() && !std::io::stdin().is_terminal() {
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(SpeakError::Io)?;
    }
    let text = text.trim().to_string();
    Ok(if text.is_empty() { None } else { Some(text) })
}
