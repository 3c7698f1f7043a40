//! Decoding of engine output into typed findings.
//!
//! A query over a rule package evaluates to the package document: an object
//! whose entries are the package's result bindings (for example `deny`), each
//! holding a list of finding records. Every binding is deserialized into
//! `Vec<Finding>`. A binding or expression of any other shape is rejected on
//! its own; the findings from well-formed bindings are kept.

use serde::Deserialize;
use serde_json::Value;

use crate::engine::{PolicyError, QueryResult};
use crate::types::Finding;

/// Findings decoded from one result set, plus the parts that did not decode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub findings: Vec<Finding>,
    pub rejected: Vec<PolicyError>,
}

/// Decode a result set into findings, in result, expression and binding order.
pub fn decode(results: &[QueryResult]) -> Decoded {
    let mut decoded = Decoded::default();

    for result in results {
        for expression in &result.expressions {
            let Some(bindings) = expression.as_object() else {
                decoded.rejected.push(PolicyError::Decode(format!(
                    "expected an object of result bindings, found {}",
                    value_kind(expression)
                )));
                continue;
            };

            for (binding, value) in bindings {
                match Vec::<Finding>::deserialize(value) {
                    Ok(findings) => decoded.findings.extend(findings.into_iter().map(project)),
                    Err(e) => decoded
                        .rejected
                        .push(PolicyError::Decode(format!("binding `{}`: {}", binding, e))),
                }
            }
        }
    }

    decoded
}

/// Drop namespaces that a cluster-scoped kind cannot have.
fn project(mut finding: Finding) -> Finding {
    if finding.is_cluster_scoped() {
        finding.namespace = None;
    }
    finding
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
