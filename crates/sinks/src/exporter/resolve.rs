//! Destination path resolution
//!
//! Maps one resource group to the file it belongs in. No filesystem access;
//! directories are created by the handle pool on first open.

use std::path::PathBuf;

use spool_config::{FileExporterConfig, GroupByAttributeConfig};
use spool_protocol::ResourceTelemetry;

use crate::common::{Result, SinkError};
use crate::util::rotation::is_backup_name;

/// Where a resource group goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathDecision {
    Write(PathBuf),
    /// Routing attribute missing and discard is configured
    Discard,
}

#[derive(Debug, Clone)]
struct Grouping {
    attribute: String,
    delete_attribute: bool,
    discard_if_missing: bool,
    default_sub_path: String,
}

/// Resolves destination paths for one exporter
#[derive(Debug, Clone)]
pub struct PathResolver {
    base: String,
    grouping: Option<Grouping>,
    rotating: bool,
}

impl PathResolver {
    pub fn new(base: impl Into<String>, group_by: Option<&GroupByAttributeConfig>) -> Self {
        Self {
            base: base.into(),
            grouping: group_by.map(|g| Grouping {
                attribute: g.sub_path_resource_attribute.clone(),
                delete_attribute: g.delete_sub_path_resource_attribute,
                discard_if_missing: g.discard_if_attribute_not_found,
                default_sub_path: g.default_sub_path.clone(),
            }),
            rotating: false,
        }
    }

    pub fn from_config(config: &FileExporterConfig) -> Self {
        Self::new(config.path.clone(), config.group_by_attribute.as_ref())
            .with_rotation(config.rotation.is_some())
    }

    /// Refuse routed names that retention would take for a backup
    pub fn with_rotation(mut self, rotating: bool) -> Self {
        self.rotating = rotating;
        self
    }

    pub fn is_grouping(&self) -> bool {
        self.grouping.is_some()
    }

    /// Resolve the destination of `resource`
    ///
    /// With grouping enabled the path is the base path with the attribute
    /// value appended verbatim (`/out/` + `api` = `/out/api`). When
    /// deletion is configured the attribute is stripped here, once, before
    /// the group is serialized.
    ///
    /// # Errors
    ///
    /// `InvalidSubPath` if the value contains a `..` component and would
    /// leave the base directory, or, with rotation on, if the file name
    /// looks like a backup of another destination in the same directory.
    pub fn resolve(&self, resource: &mut ResourceTelemetry) -> Result<PathDecision> {
        let Some(grouping) = &self.grouping else {
            return Ok(PathDecision::Write(PathBuf::from(&self.base)));
        };

        let sub_path = match resource.routing_value(&grouping.attribute) {
            Some(value) => value.to_string(),
            None if grouping.discard_if_missing => return Ok(PathDecision::Discard),
            None => grouping.default_sub_path.clone(),
        };

        let path = PathBuf::from(format!("{}{}", self.base, sub_path));
        if escapes(&sub_path) {
            return Err(SinkError::InvalidSubPath {
                path,
                value: sub_path,
                reason: "escapes the base path",
            });
        }
        if self.rotating
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_backup_name)
        {
            return Err(SinkError::InvalidSubPath {
                path,
                value: sub_path,
                reason: "has the shape of a rotated backup name",
            });
        }

        if grouping.delete_attribute {
            resource.strip_attribute(&grouping.attribute);
        }
        Ok(PathDecision::Write(path))
    }
}

fn escapes(sub_path: &str) -> bool {
    sub_path.split(['/', '\\']).any(|part| part == "..")
}
