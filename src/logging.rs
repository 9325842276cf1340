// src/logging.rs
// =============================================================================
// Sets up `tracing` output for the binary.
//
// Logs go to stderr so stdout only carries scan results (handy with --json).
// RUST_LOG, when set, wins over the -v flags.
// =============================================================================

use anyhow::{anyhow, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Maps the number of -v flags to a log level.
///
/// 0 = warn, 1 = info, 2+ = debug
pub fn level_from_verbosity(verbose: u8) -> tracing::Level {
    match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    }
}

/// Installs the global subscriber. Call once, early in main.
pub fn init(level: tracing::Level) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dirscout={}", level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
