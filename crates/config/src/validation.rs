//! Configuration validation
//!
//! Serde already rejects unknown formats and codecs. What remains:
//! - `path` must be non-empty
//! - grouping needs an attribute name and a positive open file cap

use crate::error::{ConfigError, Result};
use crate::exporter::FileExporterConfig;

const COMPONENT: &str = "exporter";
const NAME: &str = "file";

/// Validate the file exporter section
pub fn validate_exporter(config: &FileExporterConfig) -> Result<()> {
    if config.path.trim().is_empty() {
        return Err(ConfigError::missing_field(COMPONENT, NAME, "path"));
    }

    if let Some(group) = &config.group_by_attribute {
        if group.sub_path_resource_attribute.is_empty() {
            return Err(ConfigError::missing_field(
                COMPONENT,
                NAME,
                "group_by_attribute.sub_path_resource_attribute",
            ));
        }
        if group.max_open_files == 0 {
            return Err(ConfigError::invalid_value(
                COMPONENT,
                NAME,
                "group_by_attribute.max_open_files",
                "must be greater than zero",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::GroupByAttributeConfig;

    #[test]
    fn test_valid_minimal() {
        assert!(validate_exporter(&FileExporterConfig::new("out.log")).is_ok());
    }

    #[test]
    fn test_empty_path_rejected() {
        let err = validate_exporter(&FileExporterConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "path", .. }));
    }

    #[test]
    fn test_blank_path_rejected() {
        assert!(validate_exporter(&FileExporterConfig::new("  ")).is_err());
    }

    #[test]
    fn test_group_by_requires_attribute() {
        let config =
            FileExporterConfig::new("out/").with_group_by(GroupByAttributeConfig::default());
        let err = validate_exporter(&config).unwrap_err();
        assert!(err.to_string().contains("sub_path_resource_attribute"));
    }

    #[test]
    fn test_group_by_rejects_zero_open_files() {
        let group = GroupByAttributeConfig {
            max_open_files: 0,
            ..GroupByAttributeConfig::new("service.name")
        };
        let config = FileExporterConfig::new("out/").with_group_by(group);
        assert!(matches!(
            validate_exporter(&config),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
