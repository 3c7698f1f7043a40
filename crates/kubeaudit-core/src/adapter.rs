//! Policy evaluation adapter.
//!
//! Runs one rule module against one resource: compile against the query entry
//! point, evaluate with the resource as input, decode the result set. Every
//! failure is returned to the caller with the module and query attached. A
//! panic inside the engine is caught and reported as a failure of the stage
//! that raised it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug_span;

use crate::cancel::CancelToken;
use crate::decoder::{self, Decoded};
use crate::engine::{EngineError, PolicyEngine, PolicyError};
use crate::rules::RuleModule;
use crate::types::ResourceDocument;

/// Evaluate `module` against `resource` through `query`.
///
/// Compile and evaluation failures are returned as errors. Bindings that do
/// not decode are listed in [`Decoded::rejected`] next to the findings that did.
pub fn evaluate_module<E>(
    engine: &E,
    query: &str,
    module: &RuleModule,
    resource: &ResourceDocument,
    cancel: &CancelToken,
) -> Result<Decoded, PolicyError>
where
    E: PolicyEngine + ?Sized,
{
    let span = debug_span!(
        "evaluate_module",
        engine = engine.name(),
        module = %module.name,
        query,
        resource = resource.name().unwrap_or("<unnamed>"),
    );
    let _enter = span.enter();

    let prepared = contain(|| engine.compile(query, module)).map_err(|source| {
        PolicyError::Compile {
            module: module.name.clone(),
            query: query.to_string(),
            source,
        }
    })?;

    let results = contain(|| prepared.evaluate(resource, cancel)).map_err(|source| {
        PolicyError::Eval {
            module: module.name.clone(),
            query: query.to_string(),
            source,
        }
    })?;

    let decoded = decoder::decode(&results);
    tracing::debug!(
        findings = decoded.findings.len(),
        rejected = decoded.rejected.len(),
        "Rule module evaluated"
    );

    Ok(decoded)
}

/// Run one engine call, turning a panic into an engine error.
fn contain<T>(call: impl FnOnce() -> Result<T, EngineError>) -> Result<T, EngineError> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        Err(EngineError::new(format!(
            "engine panicked: {}",
            panic_message(&*payload)
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{deny, deployment, ScriptedEngine};
    use crate::types::{FailureStage, Finding};
    use serde_json::json;

    const WORKLOADS: &str = "data.kubeeye_workloads_rego";

    fn cpu_limit_module() -> RuleModule {
        RuleModule::new("cpu_limits", "package kubeeye_workloads_rego")
    }

    fn engine() -> ScriptedEngine {
        ScriptedEngine::new().rule("cpu_limits", |input| {
            let limits = input.as_value().pointer("/spec/template/spec/containers/0/resources/limits/cpu");
            if limits.is_some() {
                Ok(json!({ "deny": [] }))
            } else {
                Ok(json!({ "deny": [deny(input, "CPU limits not set")] }))
            }
        })
    }

    fn findings(engine: &ScriptedEngine, query: &str, module: &RuleModule, resource: &ResourceDocument) -> Vec<Finding> {
        let decoded = evaluate_module(engine, query, module, resource, &CancelToken::new()).unwrap();
        assert!(decoded.rejected.is_empty());
        decoded.findings
    }

    #[test]
    fn test_violation_found() {
        let findings = findings(&engine(), WORKLOADS, &cpu_limit_module(), &deployment("depX", false));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].name, "depX");
        assert_eq!(findings[0].message, "CPU limits not set");
    }

    #[test]
    fn test_no_violation() {
        let findings = findings(&engine(), WORKLOADS, &cpu_limit_module(), &deployment("depY", true));
        assert!(findings.is_empty());
    }

    #[test]
    fn test_other_entry_point_yields_nothing() {
        let findings = findings(
            &engine(),
            "data.kubeeye_RBAC_rego",
            &cpu_limit_module(),
            &deployment("depX", false),
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_compile_error() {
        let module = RuleModule::new("broken", "deny[msg] {");
        let err = evaluate_module(&engine(), WORKLOADS, &module, &deployment("depX", false), &CancelToken::new())
            .unwrap_err();
        assert_eq!(err.stage(), FailureStage::Compile);
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_eval_error() {
        let engine = ScriptedEngine::new().rule("explodes", |_| {
            Err(crate::engine::EngineError::new("undefined function"))
        });
        let module = RuleModule::new("explodes", "package kubeeye_workloads_rego");
        let err = evaluate_module(&engine, WORKLOADS, &module, &deployment("depX", false), &CancelToken::new())
            .unwrap_err();
        assert_eq!(err.stage(), FailureStage::Evaluate);
    }

    #[test]
    fn test_engine_panic_is_eval_error() {
        let engine = ScriptedEngine::new().rule("panics", |_| panic!("index out of range"));
        let module = RuleModule::new("panics", "package kubeeye_workloads_rego");
        let err = evaluate_module(&engine, WORKLOADS, &module, &deployment("depX", false), &CancelToken::new())
            .unwrap_err();
        assert_eq!(err.stage(), FailureStage::Evaluate);
        assert!(err.to_string().contains("index out of range"));
    }

    #[test]
    fn test_cancelled_evaluation_is_eval_error() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = evaluate_module(&engine(), WORKLOADS, &cpu_limit_module(), &deployment("depX", false), &cancel)
            .unwrap_err();
        assert_eq!(err.stage(), FailureStage::Evaluate);
    }

    #[test]
    fn test_decode_error() {
        let engine = ScriptedEngine::new().rule("helpers", |_| Ok(json!({ "deny": "oops" })));
        let module = RuleModule::new("helpers", "package kubeeye_workloads_rego");
        let decoded = evaluate_module(&engine, WORKLOADS, &module, &deployment("depX", false), &CancelToken::new())
            .unwrap();
        assert!(decoded.findings.is_empty());
        assert_eq!(decoded.rejected.len(), 1);
        assert_eq!(decoded.rejected[0].stage(), FailureStage::Decode);
    }

    #[test]
    fn test_repeated_evaluation_is_identical() {
        let engine = engine();
        let module = cpu_limit_module();
        let resource = deployment("depX", false);

        let first = findings(&engine, WORKLOADS, &module, &resource);
        let second = findings(&engine, WORKLOADS, &module, &resource);
        assert_eq!(first, second);
    }
}
