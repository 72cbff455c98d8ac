//! Tracing subscriber setup for sessions and the example runner.

use crate::config::LoggingConfig;
use crate::error::{RainstreamError, RainstreamResult};
use tracing_subscriber::EnvFilter;

/// Parses a filter directive such as `"info"` or `"rainstream_vision=debug,warn"`.
pub fn level_filter(level: &str) -> RainstreamResult<EnvFilter> {
    EnvFilter::try_new(level)
        .map_err(|error| RainstreamError::config(format!("invalid log level {level:?}: {error}")))
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level
/// when it parses. A subscriber installed earlier stays in place.
pub fn init_logging(config: &LoggingConfig) -> RainstreamResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&config.level)?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.with_target(true).compact().try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed, keeping it");
    }
    Ok(())
}

/// Plain `info` logging, for the example runner and quick scripts.
pub fn init_default_logging() {
    if let Err(error) = init_logging(&LoggingConfig::default()) {
        eprintln!("logging disabled: {error}");
    }
}
