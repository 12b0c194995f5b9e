//! Pipeline configuration.
//!
//! Configuration is plain data deserialized from TOML. Every field has a
//! default, so an empty document is a valid configuration:
//!
//! ```toml
//! worker_threads = 4
//! min_batch_len = 256
//!
//! [logging]
//! filter = "canvas_scaler=debug"
//! ansi = false
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Default minimum number of records handled by one parallel rescale job.
pub const DEFAULT_MIN_BATCH_LEN: usize = 64;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML for [`PipelineConfig`].
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Logger settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `"info"` or `"canvas_scaler=debug"`.
    /// Falls back to `RUST_LOG` when unset.
    pub filter: Option<String>,
    /// Emit ANSI colors.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: None, ansi: true }
    }
}

/// Settings for a [`crate::scaling::RescalePipeline`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Size of a dedicated worker pool. `0` uses the global Rayon pool.
    pub worker_threads: usize,
    /// Minimum records per parallel rescale job.
    pub min_batch_len: usize,
    /// Logger settings.
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            min_batch_len: DEFAULT_MIN_BATCH_LEN,
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&document)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_batch_len == 0 {
            return Err(ConfigError::Invalid {
                field: "min_batch_len",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(filter) = &self.logging.filter {
            if filter.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "logging.filter",
                    reason: "must not be blank".to_string(),
                });
            }
        }
        Ok(())
    }
}
