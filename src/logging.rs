use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "SPEAKD_LOG";

/// Installs the global subscriber. Output goes to stderr; stdout belongs to
/// results and to the JSON-RPC channel.
pub fn init(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
