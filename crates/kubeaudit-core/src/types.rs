//! Core types for kubeaudit validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::category::Category;
use crate::engine::PolicyError;

/// Errors that can occur when building a resource bundle.
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Failed to read bundle file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unknown resource category: {0}")]
    UnknownCategory(String),
}

// ============================================================================
// Resources
// ============================================================================

/// One cluster object, kept as a generic document.
///
/// The core never interprets the document beyond reading identity fields for
/// logging and for resources that produced no findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceDocument(Value);

impl ResourceDocument {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// `metadata.name`, if present.
    pub fn name(&self) -> Option<&str> {
        self.0.pointer("/metadata/name").and_then(Value::as_str)
    }

    /// `metadata.namespace`, if present.
    pub fn namespace(&self) -> Option<&str> {
        self.0.pointer("/metadata/namespace").and_then(Value::as_str)
    }

    /// Top-level `kind`, if present.
    pub fn kind(&self) -> Option<&str> {
        self.0.get("kind").and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for ResourceDocument {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Resources grouped by category. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceBundle {
    resources: BTreeMap<Category, Vec<ResourceDocument>>,
}

impl ResourceBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource to a category, preserving insertion order.
    pub fn push(&mut self, category: Category, resource: impl Into<ResourceDocument>) {
        self.resources
            .entry(category)
            .or_default()
            .push(resource.into());
    }

    /// Replace a category's resources.
    pub fn with_category(mut self, category: Category, resources: Vec<ResourceDocument>) -> Self {
        self.resources.insert(category, resources);
        self
    }

    /// Resources for a category. Absent categories are empty.
    pub fn get(&self, category: Category) -> &[ResourceDocument] {
        self.resources
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of resources across all categories.
    pub fn len(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Route a flat list of objects into categories by their `kind`.
    ///
    /// Objects whose kind has no category are skipped.
    pub fn from_objects(objects: impl IntoIterator<Item = Value>) -> Self {
        let mut bundle = Self::new();
        for object in objects {
            let document = ResourceDocument::new(object);
            match document.kind().and_then(Category::from_kind) {
                Some(category) => bundle.push(category, document),
                None => {
                    tracing::debug!(
                        kind = ?document.kind(),
                        name = ?document.name(),
                        "Skipping object with no validation category"
                    );
                }
            }
        }
        bundle
    }

    /// Parse a bundle keyed by category name from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, BundleError> {
        let raw: BTreeMap<String, Vec<ResourceDocument>> = serde_yaml::from_str(yaml)?;
        Self::from_named(raw)
    }

    /// Parse a bundle keyed by category name from JSON.
    pub fn from_json(json: &str) -> Result<Self, BundleError> {
        let raw: BTreeMap<String, Vec<ResourceDocument>> = serde_json::from_str(json)?;
        Self::from_named(raw)
    }

    /// Parse a bundle from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, BundleError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    fn from_named(raw: BTreeMap<String, Vec<ResourceDocument>>) -> Result<Self, BundleError> {
        let mut resources = BTreeMap::new();
        for (name, documents) in raw {
            let category = Category::ALL
                .into_iter()
                .find(|c| c.name() == name)
                .ok_or(BundleError::UnknownCategory(name))?;
            resources.insert(category, documents);
        }
        Ok(Self { resources })
    }
}

// ============================================================================
// Findings and results
// ============================================================================

/// Kinds with no namespace semantics.
pub const CLUSTER_SCOPED_KINDS: &[&str] = &["ClusterRole"];

/// One decoded violation record for a (resource, rule module) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,

    #[serde(
        rename = "Namespace",
        alias = "namespace",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub namespace: Option<String>,

    #[serde(rename = "Type", alias = "type", alias = "kind")]
    pub kind: String,

    #[serde(rename = "Message", alias = "message")]
    pub message: String,
}

impl Finding {
    /// Whether this finding describes a cluster-scoped object.
    pub fn is_cluster_scoped(&self) -> bool {
        CLUSTER_SCOPED_KINDS.contains(&self.kind.as_str())
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Stage at which a rule module failed for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Compile,
    Evaluate,
    Decode,
}

/// A rule module that could not produce findings for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationFailure {
    /// Name of the failing rule module
    pub module: String,

    pub stage: FailureStage,

    /// Rendered error
    pub message: String,
}

impl EvaluationFailure {
    pub fn new(module: impl Into<String>, error: &PolicyError) -> Self {
        Self {
            module: module.into(),
            stage: error.stage(),
            message: error.to_string(),
        }
    }
}

/// Every message produced for one resource across all rule modules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    pub kind: String,

    /// Violation messages in evaluation order. Empty when the resource is clean.
    pub messages: Vec<String>,

    /// Rule modules that failed for this resource
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<EvaluationFailure>,
}

impl AggregateResult {
    /// True when no module reported a violation or failed.
    pub fn is_clean(&self) -> bool {
        self.messages.is_empty() && self.failures.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// The published result set of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub category: Category,

    /// One entry per input resource, in input order
    pub results: Vec<AggregateResult>,

    /// Whether the run was cancelled before every resource was validated
    #[serde(default)]
    pub cancelled: bool,

    pub generated_at: DateTime<Utc>,
}

impl CategoryReport {
    pub fn new(category: Category, results: Vec<AggregateResult>, cancelled: bool) -> Self {
        Self {
            category,
            results,
            cancelled,
            generated_at: Utc::now(),
        }
    }

    /// Total violation messages across all resources.
    pub fn violation_count(&self) -> usize {
        self.results.iter().map(|r| r.messages.len()).sum()
    }

    /// Total (resource, module) failures across all resources.
    pub fn failure_count(&self) -> usize {
        self.results.iter().map(|r| r.failures.len()).sum()
    }
}
