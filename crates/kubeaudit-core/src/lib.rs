//! # kubeaudit-core
//!
//! Deterministic policy validation of cluster resources.
//!
//! This crate checks a snapshot of cluster objects against a set of rule
//! modules and produces one report per resource category:
//! - Which resources violate which rules?
//! - Which rule modules could not be evaluated, and why?
//!
//! ## Key Guarantees
//!
//! 1. **One result per resource**: clean resources get an empty message list
//! 2. **No short-circuit**: every rule module runs against every resource
//! 3. **Local failures**: a broken module is recorded on the resource, never fatal
//! 4. **Order preserving**: results follow input order within a category
//!
//! ## Example
//!
//! ```rust,ignore
//! use kubeaudit_core::{validate_bundle, ResourceBundle, RuleSet};
//!
//! let rules = RuleSet::from_dir("rules/")?;
//! let bundle = ResourceBundle::from_yaml_file("snapshot.yaml")?;
//! let reports = validate_bundle(&engine, &rules, &bundle);
//!
//! for report in reports {
//!     for result in &report.results {
//!         println!("{} {}/{}: {:?}", report.category, result.kind, result.name, result.messages);
//!     }
//! }
//! ```

pub mod adapter;
pub mod cancel;
pub mod category;
pub mod decoder;
pub mod engine;
pub mod rules;
pub mod types;
pub mod validator;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types at crate root
pub use adapter::evaluate_module;
pub use cancel::CancelToken;
pub use category::{Category, QueryGroup};
pub use decoder::Decoded;
pub use engine::{EngineError, PolicyEngine, PolicyError, PreparedQuery, QueryResult};
pub use rules::{RuleModule, RuleSet, RulesError};
pub use types::{
    AggregateResult, BundleError, CategoryReport, EvaluationFailure, FailureStage, Finding,
    ResourceBundle, ResourceDocument,
};
pub use validator::CategoryValidator;

/// Validate every category of `bundle` sequentially with the default queries.
///
/// Returns one report per category in [`Category::ALL`] order, including
/// categories with no resources.
pub fn validate_bundle<E>(engine: &E, rules: &RuleSet, bundle: &ResourceBundle) -> Vec<CategoryReport>
where
    E: PolicyEngine + ?Sized,
{
    Category::ALL
        .into_iter()
        .map(|category| {
            CategoryValidator::new(engine, category, category.default_query())
                .validate(bundle.get(category), rules)
        })
        .collect()
}
