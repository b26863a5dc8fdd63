//! Configuration Loader
//!
//! Layers listener configuration from three sources, later ones winning:
//!
//! 1. Built-in defaults ([`ListenerConfig::default`])
//! 2. An optional file; the format (TOML, YAML, JSON) is inferred from its extension
//! 3. Environment variables, `LISTENER__<FIELD>` (e.g. `LISTENER__BATCH_SIZE=32`)
//!
//! The merged result is validated before it is returned, so a loaded configuration is
//! always usable to construct a listener.

use config::{Config, Environment, File};
use std::path::Path;
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::ListenerConfig;

/// Default environment variable prefix
pub const DEFAULT_ENV_PREFIX: &str = "LISTENER";

impl ListenerConfig {
    /// Load configuration from defaults, an optional file and `LISTENER__*` variables
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> ConfigResult<Self> {
        Self::load_with_env_prefix(path, DEFAULT_ENV_PREFIX)
    }

    /// Load configuration using a custom environment variable prefix
    ///
    /// Useful for running several listeners in one process, and for tests that must not
    /// observe each other's environment.
    pub fn load_with_env_prefix<P: AsRef<Path>>(
        path: Option<P>,
        env_prefix: &str,
    ) -> ConfigResult<Self> {
        let defaults = Config::try_from(&ListenerConfig::default())
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;

        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path.as_ref() {
            let path = path.as_ref();
            if !path.exists() {
                return Err(ConfigurationError::config_file_not_found(path));
            }
            debug!(path = %path.display(), "Loading listener configuration file");
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let source_name = path
            .as_ref()
            .map(|p| p.as_ref().display().to_string())
            .unwrap_or_else(|| "environment".to_string());

        let config: ListenerConfig = builder
            .build()
            .map_err(|e| ConfigurationError::load_error(source_name.clone(), e))?
            .try_deserialize()
            .map_err(|e| ConfigurationError::load_error(source_name, e))?;

        config.validate()?;

        debug!(
            batch_size = config.batch_size,
            max_dequeue_count = config.max_dequeue_count,
            min_polling_interval_ms = config.min_polling_interval_ms,
            max_polling_interval_ms = config.max_polling_interval_ms,
            "Listener configuration loaded"
        );

        Ok(config)
    }
}
