//! Tracing subscriber setup.

use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use crudkit_core::config::{LogFormat, LoggingConfig};
use crudkit_core::error::AppError;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a global
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), AppError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = match config.format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .try_init(),
        LogFormat::Pretty => fmt()
            .pretty()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
    };

    installed.map_err(|e| AppError::internal(format!("Failed to install log subscriber: {e}")))?;
    info!(format = ?config.format, level = %config.level, "Logging initialized");
    Ok(())
}
