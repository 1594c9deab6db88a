//! Tracing subscriber setup
//!
//! The library only emits `tracing` events. Embedding applications that have
//! no subscriber of their own can install one from [`LoggingConfig`].

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Install a global subscriber
///
/// `RUST_LOG` wins over `config.level`. Returns `false` when a global
/// subscriber was already installed; the existing one is left in place.
pub fn init(config: &LoggingConfig) -> Result<bool> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::Configuration(format!("Invalid log level '{}': {}", config.level, e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = if config.structured {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    Ok(result.is_ok())
}
