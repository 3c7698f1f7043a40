//! Scripted policy engine and fixtures for tests.
//!
//! `ScriptedEngine` stands in for a real rule evaluator: each rule module is
//! backed by a closure that receives the input document and returns the
//! package document. A module only answers the query `data.<package>`; other
//! entry points evaluate to an empty result set. Source without a `package`
//! declaration fails to compile, and a tripped cancel token fails evaluation.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::engine::{EngineError, PolicyEngine, PreparedQuery, QueryResult};
use crate::rules::RuleModule;
use crate::types::ResourceDocument;

type RuleFn = dyn Fn(&ResourceDocument) -> Result<Value, EngineError> + Send + Sync;

/// Closure-backed engine for tests.
#[derive(Default, Clone)]
pub struct ScriptedEngine {
    rules: HashMap<String, Arc<RuleFn>>,
    evaluations: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back the module named `module` with `rule`.
    pub fn rule<F>(mut self, module: &str, rule: F) -> Self
    where
        F: Fn(&ResourceDocument) -> Result<Value, EngineError> + Send + Sync + 'static,
    {
        self.rules.insert(module.to_string(), Arc::new(rule));
        self
    }

    /// Number of prepared-query evaluations performed so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }
}

impl PolicyEngine for ScriptedEngine {
    fn compile(
        &self,
        query: &str,
        module: &RuleModule,
    ) -> Result<Box<dyn PreparedQuery>, EngineError> {
        let package = module
            .package()
            .ok_or_else(|| EngineError::new(format!("{}: missing package declaration", module.name)))?;

        Ok(Box::new(ScriptedQuery {
            answers: query == format!("data.{}", package),
            rule: self.rules.get(&module.name).cloned(),
            evaluations: Arc::clone(&self.evaluations),
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedQuery {
    answers: bool,
    rule: Option<Arc<RuleFn>>,
    evaluations: Arc<AtomicUsize>,
}

impl PreparedQuery for ScriptedQuery {
    fn evaluate(
        &self,
        input: &ResourceDocument,
        cancel: &CancelToken,
    ) -> Result<Vec<QueryResult>, EngineError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(EngineError::new("evaluation cancelled"));
        }
        if !self.answers {
            return Ok(Vec::new());
        }
        let document = match &self.rule {
            Some(rule) => rule(input)?,
            None => json!({}),
        };
        Ok(vec![QueryResult::new(vec![document])])
    }
}

/// A finding record for `input` in the wire format rules emit.
pub fn deny(input: &ResourceDocument, message: &str) -> Value {
    json!({
        "Name": input.name(),
        "Namespace": input.namespace(),
        "Type": input.kind(),
        "Message": message,
    })
}

/// A Deployment named `name` in namespace `default`, optionally with a CPU limit.
pub fn deployment(name: &str, with_cpu_limit: bool) -> ResourceDocument {
    let resources = if with_cpu_limit {
        json!({ "limits": { "cpu": "500m" } })
    } else {
        json!({})
    };
    ResourceDocument::new(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": name, "namespace": "default" },
        "spec": {
            "template": {
                "spec": {
                    "containers": [{ "name": "app", "image": "nginx:1.25", "resources": resources }]
                }
            }
        }
    }))
}

/// A ClusterRole named `name` granting `verbs` on pods.
pub fn cluster_role(name: &str, verbs: &[&str]) -> ResourceDocument {
    ResourceDocument::new(json!({
        "apiVersion": "rbac.authorization.k8s.io/v1",
        "kind": "ClusterRole",
        "metadata": { "name": name },
        "rules": [{ "apiGroups": [""], "resources": ["pods"], "verbs": verbs }]
    }))
}

/// The CPU-limit workload rule used across tests.
pub fn cpu_limit_rule(input: &ResourceDocument) -> Result<Value, EngineError> {
    let containers = input
        .as_value()
        .pointer("/spec/template/spec/containers")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let missing = containers
        .iter()
        .any(|c| c.pointer("/resources/limits/cpu").is_none());
    if missing {
        Ok(json!({ "deny": [deny(input, "CPU limits should be set")] }))
    } else {
        Ok(json!({ "deny": [] }))
    }
}

/// The wildcard-verb RBAC rule used across tests.
pub fn wildcard_verb_rule(input: &ResourceDocument) -> Result<Value, EngineError> {
    let wildcard = input
        .as_value()
        .get("rules")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|rule| rule.get("verbs").and_then(Value::as_array))
        .flatten()
        .any(|verb| verb == "*");
    if wildcard {
        Ok(json!({
            "deny": [{
                "Name": input.name(),
                "Namespace": "should-be-ignored",
                "Type": input.kind(),
                "Message": "Wildcard verbs grant every action",
            }]
        }))
    } else {
        Ok(json!({ "deny": [] }))
    }
}
