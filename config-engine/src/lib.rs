//! Layered configuration for the Eunio sync layer
//!
//! Values are merged in order, later layers winning:
//!
//! 1. Built-in defaults
//! 2. An optional TOML or YAML file (chosen by extension)
//! 3. `EUNIO_` environment variables, `__` separating nested keys
//!
//! The merged result is validated before it is handed out.
//!
//! # Example
//!
//! ```no_run
//! use config_engine::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .with_file("eunio.toml")
//!     .load()
//!     .unwrap();
//! assert!(config.retry.max_attempts() >= 1);
//! ```

pub mod error;
pub mod providers;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use providers::{ConfigFormat, ENV_PREFIX};
pub use validation::ConfigValidator;

use eunio_sync::{HttpRemoteConfig, LocalDbConfig, RetryPolicy, SyncOptions};
use figment::providers::Serialized;
use figment::Figment;
use logger_redacted::LoggerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Everything needed to run the sync layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: LocalDbConfig,
    pub remote: HttpRemoteConfig,
    pub retry: RetryPolicy,
    pub sync: SyncOptions,
    pub logging: LoggerConfig,
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Layer a configuration file over the defaults. The file must exist.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// The merged provider stack, before extraction.
    pub fn figment(&self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        if let Some(path) = &self.file {
            if !path.is_file() {
                return Err(ConfigError::SourceNotFound(path.clone()));
            }
            let format = ConfigFormat::from_path(path)?;
            debug!(path = %path.display(), ?format, "Layering configuration file");
            figment = format.merge_file(figment, path);
        }

        Ok(figment.merge(providers::env_provider(&self.env_prefix)))
    }

    /// Extract and validate.
    pub fn load(&self) -> ConfigResult<AppConfig> {
        let config: AppConfig = self.figment()?.extract()?;

        let mut problems = Vec::new();
        config.validate(&mut problems);
        if !problems.is_empty() {
            return Err(ConfigError::ValidationError(problems.join("; ")));
        }

        Ok(config)
    }
}

/// Load with the default environment prefix and an optional file.
pub fn load_config(file: Option<PathBuf>) -> ConfigResult<AppConfig> {
    let loader = match file {
        Some(path) => ConfigLoader::new().with_file(path),
        None => ConfigLoader::new(),
    };
    loader.load()
}
