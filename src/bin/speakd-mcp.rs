//! speakd-mcp - MCP control plane for speakd
//!
//! Speaks newline-delimited JSON-RPC 2.0 on stdin/stdout. Logs go to stderr.

use clap::Parser;
use speakd::backends::select_backend;
use speakd::cache::CacheResolver;
use speakd::config_loader::Settings;
use speakd::credentials::resolve_api_key;
use speakd::engine::{PlaybackIntent, SpeechEngine};
use speakd::error::SpeakError;
use speakd::provider::OpenAiProvider;
use speakd::service::McpService;
use speakd::supervisor::TaskSupervisor;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::BufReader;

/// MCP stdio server exposing a `speak` tool
#[derive(Parser, Debug)]
#[command(name = "speakd-mcp")]
#[command(author = "StarTuz")]
#[command(version)]
#[command(about = "MCP stdio server exposing text-to-speech as a tool", long_about = None)]
struct Cli {
    /// API key (overrides OPENAI_API_KEY and the key file)
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Debug logging on stderr
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    speakd::logging::init(cli.verbose);

    let mut service = match build_service(&cli) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Startup failed: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "speakd MCP server ready on stdio");

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    let code = match speakd::stdio::serve(stdin, stdout, &mut service).await {
        Ok(state) => {
            let stats = service.supervisor().stats();
            tracing::info!(
                ?state,
                launched = stats.launched,
                finished = stats.finished(),
                "Control plane stopped"
            );
            0
        }
        Err(e) => {
            tracing::error!("stdio failure: {}", e);
            1
        }
    };

    // Outstanding speech tasks are not waited for
    std::process::exit(code);
}

fn build_service(cli: &Cli) -> Result<McpService, SpeakError> {
    let settings = Settings::new()?;

    let intent = if settings.mcp_playback {
        PlaybackIntent::Play(select_backend(settings.player)?)
    } else {
        PlaybackIntent::Delegate
    };

    let api_key = resolve_api_key(cli.api_key.as_deref(), &PathBuf::from(&settings.api_key_file))?;
    let provider = OpenAiProvider::from_settings(&settings, api_key)?;
    let engine = SpeechEngine::new(
        Arc::new(provider),
        CacheResolver::new(settings.cache_dir(), settings.cache_prefix.clone()),
    );

    let supervisor = TaskSupervisor::new(engine, intent);
    Ok(McpService::new(settings, supervisor))
}
