//! Runtime configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use kubeaudit_core::{Category, QueryGroup};

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid deadline {value:?}: {reason}")]
    InvalidDeadline { value: String, reason: String },

    #[error("Empty entry point for {0:?}")]
    EmptyEntryPoint(QueryGroup),
}

/// Configuration for a validation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Query entry point overrides per rule group
    #[serde(default)]
    pub entry_points: BTreeMap<QueryGroup, String>,

    /// Cancel the run after this long (e.g. "30s", "2m")
    #[serde(default)]
    pub deadline: Option<String>,
}

impl RuntimeConfig {
    /// Parse configuration from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Override the entry point for a rule group.
    pub fn with_entry_point(mut self, group: QueryGroup, query: impl Into<String>) -> Self {
        self.entry_points.insert(group, query.into());
        self
    }

    pub fn with_deadline(mut self, deadline: impl Into<String>) -> Self {
        self.deadline = Some(deadline.into());
        self
    }

    /// Query entry point for a category.
    pub fn query_for(&self, category: Category) -> String {
        let group = category.query_group();
        self.entry_points
            .get(&group)
            .cloned()
            .unwrap_or_else(|| group.default_entry_point().to_string())
    }

    /// Parsed run deadline.
    pub fn deadline(&self) -> Result<Option<Duration>, ConfigError> {
        self.deadline
            .as_deref()
            .map(|value| {
                humantime::parse_duration(value).map_err(|e| ConfigError::InvalidDeadline {
                    value: value.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some((group, _)) = self.entry_points.iter().find(|(_, q)| q.trim().is_empty()) {
            return Err(ConfigError::EmptyEntryPoint(*group));
        }
        self.deadline()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_queries() {
        let config = RuntimeConfig::default();
        assert_eq!(config.query_for(Category::Jobs), "data.kubeeye_workloads_rego");
        assert_eq!(config.query_for(Category::ClusterRoles), "data.kubeeye_RBAC_rego");
        assert_eq!(config.deadline().unwrap(), None);
    }

    #[test]
    fn test_override_from_yaml() {
        let config = RuntimeConfig::from_yaml(
            r#"
entry_points:
  rbac: data.custom_rbac
deadline: 90s
"#,
        )
        .unwrap();

        assert_eq!(config.query_for(Category::Roles), "data.custom_rbac");
        assert_eq!(config.query_for(Category::ClusterRoles), "data.custom_rbac");
        assert_eq!(config.query_for(Category::Nodes), "data.kubeeye_nodes_rego");
        assert_eq!(config.deadline().unwrap(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_invalid_deadline() {
        let result = RuntimeConfig::from_yaml("deadline: soon");
        assert!(matches!(result, Err(ConfigError::InvalidDeadline { .. })));
    }

    #[test]
    fn test_empty_entry_point() {
        let result = RuntimeConfig::from_yaml("entry_points:\n  events: \"\"\n");
        assert!(matches!(
            result,
            Err(ConfigError::EmptyEntryPoint(QueryGroup::Events))
        ));
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubeaudit.yaml");
        fs::write(&path, "entry_points:\n  nodes: data.node_checks\n").unwrap();

        let config = RuntimeConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.query_for(Category::Nodes), "data.node_checks");
    }
}
