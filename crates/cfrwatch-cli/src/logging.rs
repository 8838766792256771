use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "CFRWATCH_LOG";

/// Diagnostics go to stderr; stdout is reserved for the report.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
