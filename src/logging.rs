// Tracing subscriber setup.
// Installs a global fmt subscriber, pretty or JSON, filtered by level or RUST_LOG.

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::config::{LogFormat, LogSettings};
use crate::error::{IndexerError, Result};

fn parse_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(IndexerError::InvalidConfig(format!(
            "invalid log level: {level}"
        ))),
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the configured level.
///
/// Fails if a global subscriber is already set.
pub fn init(settings: &LogSettings) -> Result<()> {
    let level = parse_level(&settings.level)?;
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let installed = match settings.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_target(true)
            .try_init(),
    };

    installed.map_err(|e| IndexerError::InvalidConfig(format!("logging already initialised: {e}")))
}
