//! Rego evaluation through `regorus`.
//!
//! Each compile builds a fresh interpreter holding only the one module, so a
//! module can never observe rules from another. Values cross into the core as
//! JSON.

use kubeaudit_core::{
    CancelToken, EngineError, PolicyEngine, PreparedQuery, QueryResult, ResourceDocument,
    RuleModule,
};

/// Policy engine backed by the `regorus` interpreter.
#[derive(Debug, Clone, Default)]
pub struct RegoEngine;

impl RegoEngine {
    pub fn new() -> Self {
        Self
    }
}

impl PolicyEngine for RegoEngine {
    fn compile(
        &self,
        query: &str,
        module: &RuleModule,
    ) -> Result<Box<dyn PreparedQuery>, EngineError> {
        let mut engine = regorus::Engine::new();
        engine
            .add_policy(format!("{}.rego", module.name), module.source.clone())
            .map_err(|e| EngineError::new(e.to_string()))?;

        Ok(Box::new(RegoQuery {
            engine,
            query: query.to_string(),
        }))
    }

    fn name(&self) -> &str {
        "regorus"
    }
}

struct RegoQuery {
    engine: regorus::Engine,
    query: String,
}

impl PreparedQuery for RegoQuery {
    fn evaluate(
        &self,
        input: &ResourceDocument,
        cancel: &CancelToken,
    ) -> Result<Vec<QueryResult>, EngineError> {
        // The interpreter cannot be interrupted once running.
        if cancel.is_cancelled() {
            return Err(EngineError::new("evaluation cancelled"));
        }

        let mut engine = self.engine.clone();
        let input = regorus::Value::from_json_str(&input.as_value().to_string())
            .map_err(|e| EngineError::new(format!("invalid input document: {}", e)))?;
        engine.set_input(input);

        let results = engine
            .eval_query(self.query.clone(), false)
            .map_err(|e| EngineError::new(e.to_string()))?;

        results
            .result
            .into_iter()
            .map(|result| {
                let expressions = result
                    .expressions
                    .iter()
                    .map(|expression| serde_json::to_value(&expression.value))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| EngineError::new(format!("unserializable result: {}", e)))?;
                Ok(QueryResult::new(expressions))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeaudit_core::testing::{cluster_role, deployment};
    use kubeaudit_core::{evaluate_module, FailureStage, Finding};

    const LIMITS: &str = r#"
package kubeeye_workloads_rego

deny[msg] {
    resourcename := input.metadata.name
    resourcenamespace := input.metadata.namespace
    kind := input.kind
    container := input.spec.template.spec.containers[_]
    not container.resources.limits.cpu

    msg := {
        "Name": resourcename,
        "Namespace": resourcenamespace,
        "Type": kind,
        "Message": "CPU limits should be set"
    }
}
"#;

    const WILDCARDS: &str = r#"
package kubeeye_RBAC_rego

deny[msg] {
    input.kind == "ClusterRole"
    input.rules[_].verbs[_] == "*"

    msg := {
        "Name": input.metadata.name,
        "Namespace": "",
        "Type": input.kind,
        "Message": "Wildcard verbs grant every action"
    }
}
"#;

    fn findings(query: &str, module: &RuleModule, resource: &ResourceDocument) -> Vec<Finding> {
        let decoded =
            evaluate_module(&RegoEngine::new(), query, module, resource, &CancelToken::new())
                .unwrap();
        assert!(decoded.rejected.is_empty(), "{:?}", decoded.rejected);
        decoded.findings
    }

    #[test]
    fn test_limits_rule() {
        let module = RuleModule::new("limits", LIMITS);

        let flagged = findings("data.kubeeye_workloads_rego", &module, &deployment("depX", false));
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].message, "CPU limits should be set");

        let clean = findings("data.kubeeye_workloads_rego", &module, &deployment("depY", true));
        assert!(clean.is_empty());
    }

    #[test]
    fn test_wildcard_rule() {
        let module = RuleModule::new("wildcards", WILDCARDS);
        let flagged = findings("data.kubeeye_RBAC_rego", &module, &cluster_role("crZ", &["*"]));
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].namespace, None);
    }

    #[test]
    fn test_parse_error_is_compile_failure() {
        let module = RuleModule::new("broken", "package broken\n\ndeny[msg] {");
        let err = evaluate_module(
            &RegoEngine::new(),
            "data.broken",
            &module,
            &deployment("depX", false),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(err.stage(), FailureStage::Compile);
    }

    #[test]
    fn test_cancelled_before_evaluation() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = evaluate_module(
            &RegoEngine::new(),
            "data.kubeeye_workloads_rego",
            &RuleModule::new("limits", LIMITS),
            &deployment("depX", false),
            &cancel,
        )
        .unwrap_err();
        assert_eq!(err.stage(), FailureStage::Evaluate);
    }
}
