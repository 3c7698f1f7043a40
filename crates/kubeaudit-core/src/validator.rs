//! Generic category validator.
//!
//! One validator handles any category: it walks the category's resources in
//! order, runs every rule module against each one and folds the findings into
//! a single [`AggregateResult`] per resource. A failing module is recorded on
//! the resource and the loop moves on.

use tracing::{info, warn};

use crate::adapter::evaluate_module;
use crate::cancel::CancelToken;
use crate::category::Category;
use crate::engine::{PolicyEngine, PolicyError};
use crate::rules::{RuleModule, RuleSet};
use crate::types::{AggregateResult, CategoryReport, EvaluationFailure, Finding, ResourceDocument};

/// Validates the resources of one category against a rule set.
pub struct CategoryValidator<'a, E: PolicyEngine + ?Sized> {
    engine: &'a E,
    category: Category,
    query: &'a str,
    cancel: CancelToken,
}

impl<'a, E: PolicyEngine + ?Sized> CategoryValidator<'a, E> {
    pub fn new(engine: &'a E, category: Category, query: &'a str) -> Self {
        Self {
            engine,
            category,
            query,
            cancel: CancelToken::new(),
        }
    }

    /// Stop before the next resource once `cancel` is tripped. The token is
    /// also handed to every evaluation.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn query(&self) -> &str {
        self.query
    }

    /// Validate `resources` in order and build the category report.
    ///
    /// If cancelled, the report holds the resources completed so far and is
    /// flagged `cancelled`. An empty category is flagged when the token was
    /// already tripped.
    pub fn validate(&self, resources: &[ResourceDocument], rules: &RuleSet) -> CategoryReport {
        let mut results = Vec::with_capacity(resources.len());
        let mut cancelled = resources.is_empty() && self.cancel.is_cancelled();

        for resource in resources {
            if self.cancel.is_cancelled() {
                cancelled = true;
                info!(
                    category = %self.category,
                    completed = results.len(),
                    total = resources.len(),
                    "Category validation cancelled"
                );
                break;
            }
            results.push(self.validate_resource(resource, rules));
        }

        CategoryReport::new(self.category, results, cancelled)
    }

    /// Run every rule module against one resource.
    pub fn validate_resource(&self, resource: &ResourceDocument, rules: &RuleSet) -> AggregateResult {
        let mut aggregate = Aggregate::default();

        for module in rules {
            match evaluate_module(self.engine, self.query, module, resource, &self.cancel) {
                Ok(decoded) => {
                    decoded.findings.into_iter().for_each(|f| aggregate.absorb(f));
                    for e in &decoded.rejected {
                        self.record_failure(&mut aggregate, module, resource, e);
                    }
                }
                Err(e) => self.record_failure(&mut aggregate, module, resource, &e),
            }
        }

        aggregate.finish(resource, self.category)
    }

    fn record_failure(
        &self,
        aggregate: &mut Aggregate,
        module: &RuleModule,
        resource: &ResourceDocument,
        error: &PolicyError,
    ) {
        warn!(
            category = %self.category,
            module = %module.name,
            resource = resource.name().unwrap_or("<unnamed>"),
            error = %error,
            "Rule module failed"
        );
        aggregate.failures.push(EvaluationFailure::new(&module.name, error));
    }
}

/// Accumulates findings for one resource.
#[derive(Default)]
struct Aggregate {
    identity: Option<(String, Option<String>, String)>,
    messages: Vec<String>,
    failures: Vec<EvaluationFailure>,
}

impl Aggregate {
    /// Identity follows the latest finding.
    fn absorb(&mut self, finding: Finding) {
        self.identity = Some((finding.name, finding.namespace, finding.kind));
        self.messages.push(finding.message);
    }

    /// Resources without findings are identified from their own metadata.
    fn finish(self, resource: &ResourceDocument, category: Category) -> AggregateResult {
        let (name, namespace, kind) = self.identity.unwrap_or_else(|| {
            (
                resource.name().unwrap_or_default().to_string(),
                resource.namespace().map(str::to_string),
                resource.kind().unwrap_or(category.kind()).to_string(),
            )
        });

        let namespace = if crate::types::CLUSTER_SCOPED_KINDS.contains(&kind.as_str()) {
            None
        } else {
            namespace
        };

        AggregateResult {
            name,
            namespace,
            kind,
            messages: self.messages,
            failures: self.failures,
        }
    }
}
