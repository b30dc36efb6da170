//! Configuration module for the mapping coordinator
//!
//! This module handles coordinator configuration including:
//! - Buffering policy of the data queue (size, detection rate, intermediate nodes)
//! - Mapping engine settings (database location)
//! - Logging settings
//!
//! Configuration is stored as TOML. Every section is optional in the file;
//! missing fields fall back to their defaults.
//!
//! # Example
//!
//! ```ignore
//! use slam_coordinator::config::CoordinatorConfig;
//!
//! let config = CoordinatorConfig::load_or_default("coordinator.toml");
//! let parameters = config.to_parameters();
//! ```

pub mod parameters;

pub use parameters::*;

use crate::error::{MappingError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "slam-coordinator";

/// Default database filename
pub const DEFAULT_DATABASE_FILE: &str = "map.json";

/// Default log filter directive
pub const DEFAULT_LOG_FILTER: &str = "info,slam_coordinator=debug";

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Default database path inside the application data directory
pub fn default_database_path() -> PathBuf {
    app_data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DATABASE_FILE)
}

// ==================== Engine Config ====================

/// Mapping engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Database file loaded at init and written at close
    pub database_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

// ==================== Logging Config ====================

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,

    /// Also write daily-rolling log files to this directory
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            directory: None,
        }
    }
}

// ==================== Coordinator Config ====================

/// Complete coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CoordinatorConfig {
    #[serde(default)]
    pub buffer: BufferSettings,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CoordinatorConfig {
    /// Load a configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MappingError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_toml(&content)
    }

    /// Load a configuration, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load configuration, using defaults: {}", e);
            Self::default()
        })
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| MappingError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| MappingError::Config(format!("Failed to serialize configuration: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| MappingError::Config(format!("Failed to write configuration: {}", e)))
    }

    /// Check the invariants a file can violate
    pub fn validate(&self) -> Result<()> {
        if self.buffer.detection_rate < 0.0 || !self.buffer.detection_rate.is_finite() {
            return Err(MappingError::Config(format!(
                "detection_rate must be a non-negative number (got {})",
                self.buffer.detection_rate
            )));
        }
        if self.engine.database_path.as_os_str().is_empty() {
            return Err(MappingError::Config(
                "database_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Full parameter set passed with the `Init` command
    pub fn to_parameters(&self) -> ParametersMap {
        let mut parameters = self.buffer.to_parameters();
        parameters.insert(
            KEY_DATABASE_PATH.to_string(),
            self.engine.database_path.display().to_string(),
        );
        parameters
    }
}

// ==================== Tests ====================
