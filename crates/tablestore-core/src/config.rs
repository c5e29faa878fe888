//! `TableStore` Configuration Module
//!
//! Provides configuration file support via `tablestore.toml` and
//! environment variables.
//!
//! # Priority (highest to lowest)
//!
//! 1. Environment variables (`TABLESTORE_<SECTION>__<KEY>`)
//! 2. Configuration file (`tablestore.toml`)
//! 3. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::version::FormatVersion;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration file.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// Storage configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory [`crate::registry::DirectoryRepository::from_config`]
    /// keeps table files in.
    pub data_dir: String,
    /// Fsync table files before and after each superblock commit.
    pub sync_on_commit: bool,
    /// On-disk version written by `initialize` (1 or 2).
    pub default_format_version: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./tablestore_data".to_string(),
            sync_on_commit: true,
            default_format_version: FormatVersion::CURRENT.as_u32(),
        }
    }
}

/// Limits configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum declared size of a string column, in bytes.
    pub max_string_size: usize,
    /// Maximum declared length of an array column.
    pub max_array_size: usize,
    /// Maximum number of rows returned by a single read.
    pub max_read_rows: u64,
    /// Maximum length of a row-selection condition, in bytes.
    pub max_condition_length: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_string_size: 65_536,
            max_array_size: 1_048_576,
            max_read_rows: 10_000_000,
            max_condition_length: 4096,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace.
    pub level: String,
    /// Log format: text or json.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Main `TableStore` configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TablesConfig {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Limits configuration.
    pub limits: LimitsConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl TablesConfig {
    /// Loads configuration from default sources.
    ///
    /// Priority: defaults < file < environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("tablestore.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// Nested keys in environment variables are separated by a double
    /// underscore: `TABLESTORE_LIMITS__MAX_READ_ROWS=1000`.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("TABLESTORE_").split("__"));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if FormatVersion::from_u32(self.storage.default_format_version).is_none() {
            return Err(ConfigError::InvalidValue {
                key: "storage.default_format_version".to_string(),
                message: format!(
                    "value {} is invalid, expected 1 or 2",
                    self.storage.default_format_version
                ),
            });
        }

        let positive = [
            ("limits.max_string_size", self.limits.max_string_size as u64),
            ("limits.max_array_size", self.limits.max_array_size as u64),
            ("limits.max_read_rows", self.limits.max_read_rows),
            (
                "limits.max_condition_length",
                self.limits.max_condition_length as u64,
            ),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "value must be greater than 0".to_string(),
                });
            }
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.format".to_string(),
                message: format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        Ok(())
    }

    /// Returns the on-disk version new tables are initialized with.
    ///
    /// Falls back to the current version when the configured value is
    /// invalid; call [`TablesConfig::validate`] to reject it instead.
    #[must_use]
    pub fn format_version(&self) -> FormatVersion {
        FormatVersion::from_u32(self.storage.default_format_version)
            .unwrap_or(FormatVersion::CURRENT)
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
