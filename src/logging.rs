//! Structured logging with tracing

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Error type for logging initialization
#[derive(Debug, thiserror::Error)]
pub enum LoggingInitError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    Init(String),
}

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level when set. The
/// `format` field selects between `json` output and the human-readable
/// default.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };

    result.map_err(|e| LoggingInitError::Init(e.to_string()))
}
