//! Spool Configuration
//!
//! TOML configuration for the telemetry file exporter. Everything except
//! `exporter.path` has a default.
//!
//! # Parsing
//!
//! ```
//! use spool_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[exporter]\npath = \"out/telemetry.json\"").unwrap();
//! assert_eq!(config.exporter.path, "out/telemetry.json");
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [log]
//! level = "info"
//!
//! [exporter]
//! path = "/var/spool/otel/log"
//! flush_interval = "1s"
//!
//! [exporter.rotation]
//! max_megabytes = 100
//! max_backups = 5
//! ```

mod error;
mod exporter;
mod logging;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use exporter::{
    Compression, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_BACKUPS, DEFAULT_MAX_MEGABYTES,
    DEFAULT_MAX_OPEN_FILES, DEFAULT_SUB_PATH, FileExporterConfig, Format, GroupByAttributeConfig,
    RotationConfig,
};
pub use logging::{LogConfig, LogFormat, LogLevel};

use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,

    /// File exporter configuration
    pub exporter: FileExporterConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(s)?;
        config.exporter.normalize();
        config.exporter.validate()?;
        Ok(config)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
