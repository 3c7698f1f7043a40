//! Rule set parsing from YAML/JSON and from directories of `.rego` files.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::package::package_name;

/// Errors that can occur when loading rule sets.
#[derive(Error, Debug)]
pub enum RulesError {
    #[error("Failed to read rules: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Rule set validation failed: {0}")]
    ValidationError(String),
}

/// A named block of policy source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleModule {
    /// Unique name within the rule set (e.g. "resource_limits")
    pub name: String,

    /// Policy source text
    pub source: String,
}

impl RuleModule {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Package declared by the source, if any.
    pub fn package(&self) -> Option<&str> {
        package_name(&self.source)
    }
}

/// Ordered rule modules. Every module is evaluated against every resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleSet {
    #[serde(default)]
    pub modules: Vec<RuleModule>,
}

impl RuleSet {
    /// Build a rule set from modules, rejecting duplicate or empty names.
    pub fn new(modules: Vec<RuleModule>) -> Result<Self, RulesError> {
        let rules = Self { modules };
        rules.validate()?;
        Ok(rules)
    }

    /// Parse a rule set from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, RulesError> {
        let rules: RuleSet = serde_yaml::from_str(yaml)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Parse a rule set from JSON string.
    pub fn from_json(json: &str) -> Result<Self, RulesError> {
        let rules: RuleSet = serde_json::from_str(json)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Parse a rule set from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, RulesError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load every `*.rego` file in a directory.
    ///
    /// Modules are named after the file stem and ordered by file name.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, RulesError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "rego") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut modules = Vec::with_capacity(paths.len());
        for path in paths {
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let source = fs::read_to_string(&path)?;
            modules.push(RuleModule::new(name, source));
        }

        tracing::debug!(
            dir = %dir.as_ref().display(),
            modules = modules.len(),
            "Loaded rule modules"
        );

        Self::new(modules)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RuleModule> {
        self.modules.iter()
    }

    /// Ensure module names are present and unique.
    fn validate(&self) -> Result<(), RulesError> {
        let mut seen = HashSet::new();

        for module in &self.modules {
            if module.name.is_empty() {
                return Err(RulesError::ValidationError(
                    "Rule module with empty name".to_string(),
                ));
            }
            if !seen.insert(&module.name) {
                return Err(RulesError::ValidationError(format!(
                    "Duplicate rule module: {}",
                    module.name
                )));
            }
        }

        Ok(())
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a RuleModule;
    type IntoIter = std::slice::Iter<'a, RuleModule>;

    fn into_iter(self) -> Self::IntoIter {
        self.modules.iter()
    }
}
