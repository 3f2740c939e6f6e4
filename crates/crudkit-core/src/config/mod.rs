//! Configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! TOML files plus `CRUDKIT__*` environment variables. Each sub-module
//! represents a logical configuration section.

pub mod database;
pub mod logging;
pub mod search;

use serde::{Deserialize, Serialize};

pub use self::database::DatabaseConfig;
pub use self::logging::{LogFormat, LoggingConfig};
pub use self::search::SearchConfig;

use crate::error::AppError;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrudConfig {
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Search and pagination limits.
    #[serde(default)]
    pub search: SearchConfig,
}

impl CrudConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges `config/default` with an environment-specific overlay
    /// (`config/{env}`) and environment variables prefixed with `CRUDKIT`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false));
        Self::finish(builder)
    }

    /// Load configuration from an inline TOML document, still honoring
    /// environment overrides.
    pub fn from_toml(source: &str) -> Result<Self, AppError> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml));
        Self::finish(builder)
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, AppError> {
        let config = builder
            .add_source(
                config::Environment::with_prefix("CRUDKIT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        if config.database.url.is_empty() {
            return Err(AppError::configuration("database.url must be set"));
        }
        Ok(config)
    }
}
