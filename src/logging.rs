use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "LEAGUE_LOG";

/// Installs the global fmt subscriber. Filter comes from `LEAGUE_LOG`, else `info`.
/// Calling it twice is harmless.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
