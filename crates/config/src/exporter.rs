//! File exporter configuration
//!
//! Options for the telemetry file exporter: destination path, rotation,
//! wire format, compression, flush cadence and attribute-based routing.
//!
//! # Example
//!
//! ```toml
//! [exporter]
//! path = "/var/spool/otel/"
//! format = "proto"
//! compression = "zstd"
//! flush_interval = "500ms"
//!
//! [exporter.rotation]
//! max_megabytes = 50
//! max_backups = 10
//!
//! [exporter.group_by_attribute]
//! sub_path_resource_attribute = "service.name"
//! ```

use serde::Deserialize;
use std::time::Duration;

/// Flush interval used when none (or zero) is configured
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Default rotation threshold in megabytes
pub const DEFAULT_MAX_MEGABYTES: u64 = 100;

/// Default number of retained backups
pub const DEFAULT_MAX_BACKUPS: usize = 100;

/// Default open file cap when grouping by attribute
pub const DEFAULT_MAX_OPEN_FILES: usize = 100;

/// Sub-path used when the routing attribute is missing
pub const DEFAULT_SUB_PATH: &str = "MISSING";

/// Wire encoding of exported batches
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON documents (default)
    #[default]
    Json,
    /// Protobuf binary
    Proto,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Proto => "proto",
        }
    }
}

/// Compression applied to each written unit
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression (default, written as `""`)
    #[default]
    #[serde(rename = "", alias = "none")]
    None,
    /// Zstandard
    Zstd,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Zstd => "zstd",
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Size/age/count based rotation of output files
///
/// Present in the config means enabled; an absent `[exporter.rotation]`
/// table disables rotation and files grow without bound.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RotationConfig {
    /// Size in megabytes after which the file is rotated
    /// Default: 100 (0 also means 100)
    pub max_megabytes: u64,

    /// Days to keep backups, judged by the timestamp in their name
    /// Default: 0 (no age limit)
    pub max_days: u64,

    /// Number of backups to keep
    /// Default: 100 (0 keeps all)
    pub max_backups: usize,

    /// Use local time instead of UTC in backup names
    /// Default: false
    pub localtime: bool,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_megabytes: DEFAULT_MAX_MEGABYTES,
            max_days: 0,
            max_backups: DEFAULT_MAX_BACKUPS,
            localtime: false,
        }
    }
}

impl RotationConfig {
    /// Rotation threshold in bytes
    pub fn max_bytes(&self) -> u64 {
        let megabytes = if self.max_megabytes == 0 {
            DEFAULT_MAX_MEGABYTES
        } else {
            self.max_megabytes
        };
        megabytes.saturating_mul(1024 * 1024)
    }

    /// Backup retention window, `None` when unlimited
    pub fn max_age(&self) -> Option<Duration> {
        (self.max_days > 0).then(|| Duration::from_secs(self.max_days.saturating_mul(24 * 60 * 60)))
    }
}

/// Route records into separate files by a resource attribute
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GroupByAttributeConfig {
    /// Resource attribute holding the sub-path appended to `path`
    /// Required
    pub sub_path_resource_attribute: String,

    /// Remove the routing attribute before the record is written
    /// Default: false
    pub delete_sub_path_resource_attribute: bool,

    /// Maximum number of simultaneously open output files
    /// Default: 100
    pub max_open_files: usize,

    /// Drop records that lack the routing attribute
    /// Default: false
    pub discard_if_attribute_not_found: bool,

    /// Sub-path used for records without the attribute
    /// Default: "MISSING"
    pub default_sub_path: String,

    /// Create missing parent directories of destination files
    /// Default: true
    pub auto_create_directories: bool,
}

impl Default for GroupByAttributeConfig {
    fn default() -> Self {
        Self {
            sub_path_resource_attribute: String::new(),
            delete_sub_path_resource_attribute: false,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            discard_if_attribute_not_found: false,
            default_sub_path: DEFAULT_SUB_PATH.into(),
            auto_create_directories: true,
        }
    }
}

impl GroupByAttributeConfig {
    /// Group by the given resource attribute with default settings
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            sub_path_resource_attribute: attribute.into(),
            ..Default::default()
        }
    }
}

/// Telemetry file exporter configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileExporterConfig {
    /// Output file path, or path prefix when grouping by attribute
    /// Required
    pub path: String,

    /// Rotation settings; `None` disables rotation
    pub rotation: Option<RotationConfig>,

    /// Wire format (json, proto)
    /// Default: json
    pub format: Format,

    /// Compression codec ("" or "zstd")
    /// Default: ""
    pub compression: Compression,

    /// Interval between background flushes
    /// Default: 1s (0 is treated as 1s)
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Attribute based routing; `None` writes everything to `path`
    pub group_by_attribute: Option<GroupByAttributeConfig>,
}

impl Default for FileExporterConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            rotation: None,
            format: Format::Json,
            compression: Compression::None,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            group_by_attribute: None,
        }
    }
}

impl FileExporterConfig {
    /// Config writing to `path` with all other options at their defaults
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: RotationConfig) -> Self {
        self.rotation = Some(rotation);
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    #[must_use]
    pub fn with_group_by(mut self, group_by: GroupByAttributeConfig) -> Self {
        self.group_by_attribute = Some(group_by);
        self
    }

    /// Flush interval with zero coerced to the 1s default
    pub fn effective_flush_interval(&self) -> Duration {
        if self.flush_interval.is_zero() {
            DEFAULT_FLUSH_INTERVAL
        } else {
            self.flush_interval
        }
    }

    /// Number of files the exporter may hold open at once
    pub fn max_open_files(&self) -> usize {
        self.group_by_attribute
            .as_ref()
            .map_or(1, |g| g.max_open_files)
    }

    /// Whether parent directories are created on demand
    pub fn auto_create_directories(&self) -> bool {
        self.group_by_attribute
            .as_ref()
            .is_none_or(|g| g.auto_create_directories)
    }

    /// Check the options that cannot be expressed in the type system
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` describing the first invalid option.
    pub fn validate(&self) -> crate::Result<()> {
        crate::validation::validate_exporter(self)
    }

    /// Apply load-time coercions
    pub(crate) fn normalize(&mut self) {
        self.flush_interval = self.effective_flush_interval();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FileExporterConfig::default();
        assert!(config.path.is_empty());
        assert!(config.rotation.is_none());
        assert_eq!(config.format, Format::Json);
        assert_eq!(config.compression, Compression::None);
        assert_eq!(config.flush_interval, Duration::from_secs(1));
        assert!(config.group_by_attribute.is_none());
        assert_eq!(config.max_open_files(), 1);
        assert!(config.auto_create_directories());
    }

    #[test]
    fn test_absent_rotation_disables_it() {
        let config: FileExporterConfig = toml::from_str(r#"path = "out.log""#).unwrap();
        assert!(config.rotation.is_none());
    }

    #[test]
    fn test_empty_rotation_table_uses_defaults() {
        let config: FileExporterConfig = toml::from_str(
            r#"
path = "out.log"
[rotation]
"#,
        )
        .unwrap();
        let rotation = config.rotation.unwrap();
        assert_eq!(rotation.max_megabytes, 100);
        assert_eq!(rotation.max_days, 0);
        assert_eq!(rotation.max_backups, 100);
        assert!(!rotation.localtime);
        assert_eq!(rotation.max_age(), None);
    }

    #[test]
    fn test_rotation_max_bytes() {
        let rotation = RotationConfig {
            max_megabytes: 2,
            ..Default::default()
        };
        assert_eq!(rotation.max_bytes(), 2 * 1024 * 1024);

        let zero = RotationConfig {
            max_megabytes: 0,
            ..Default::default()
        };
        assert_eq!(zero.max_bytes(), 100 * 1024 * 1024);
    }

    #[test]
    fn test_rotation_max_age() {
        let rotation = RotationConfig {
            max_days: 2,
            ..Default::default()
        };
        assert_eq!(rotation.max_age(), Some(Duration::from_secs(2 * 86_400)));
    }

    #[test]
    fn test_group_by_defaults() {
        let config: FileExporterConfig = toml::from_str(
            r#"
path = "out/"
[group_by_attribute]
sub_path_resource_attribute = "service.name"
"#,
        )
        .unwrap();
        let group = config.group_by_attribute.clone().unwrap();
        assert_eq!(group.sub_path_resource_attribute, "service.name");
        assert!(!group.delete_sub_path_resource_attribute);
        assert_eq!(group.max_open_files, 100);
        assert!(!group.discard_if_attribute_not_found);
        assert_eq!(group.default_sub_path, "MISSING");
        assert!(group.auto_create_directories);
        assert_eq!(config.max_open_files(), 100);
    }

    #[test]
    fn test_format_and_compression() {
        let config: FileExporterConfig = toml::from_str(
            r#"
path = "out.bin"
format = "proto"
compression = "zstd"
"#,
        )
        .unwrap();
        assert_eq!(config.format, Format::Proto);
        assert_eq!(config.compression, Compression::Zstd);
        assert!(config.compression.is_enabled());
    }

    #[test]
    fn test_empty_compression_string() {
        let config: FileExporterConfig =
            toml::from_str("path = \"x\"\ncompression = \"\"").unwrap();
        assert_eq!(config.compression, Compression::None);
        assert_eq!(config.compression.as_str(), "");
    }

    #[test]
    fn test_unknown_format_rejected() {
        let result: Result<FileExporterConfig, _> =
            toml::from_str("path = \"x\"\nformat = \"xml\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_compression_rejected() {
        let result: Result<FileExporterConfig, _> =
            toml::from_str("path = \"x\"\ncompression = \"gzip\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_flush_interval_coerced() {
        let mut config: FileExporterConfig =
            toml::from_str("path = \"x\"\nflush_interval = \"0s\"").unwrap();
        assert_eq!(config.effective_flush_interval(), Duration::from_secs(1));
        config.normalize();
        assert_eq!(config.flush_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_builders() {
        let config = FileExporterConfig::new("/out/log")
            .with_rotation(RotationConfig::default())
            .with_format(Format::Proto)
            .with_compression(Compression::Zstd)
            .with_flush_interval(Duration::from_millis(250))
            .with_group_by(GroupByAttributeConfig::new("tenant"));

        assert_eq!(config.path, "/out/log");
        assert!(config.rotation.is_some());
        assert_eq!(config.format, Format::Proto);
        assert_eq!(config.flush_interval, Duration::from_millis(250));
        assert_eq!(
            config.group_by_attribute.unwrap().sub_path_resource_attribute,
            "tenant"
        );
    }
}
