// src/logging.rs
// =============================================================================
// tracing subscriber setup.
//
// Logs go to stderr so stdout stays clean for the --json summary. RUST_LOG
// overrides the defaults below.
// =============================================================================

use tracing_subscriber::EnvFilter;

/// Default filter when RUST_LOG is unset.
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "info,m3u8_mirror=debug"
    } else {
        "info"
    }
}

pub fn init_logging(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
