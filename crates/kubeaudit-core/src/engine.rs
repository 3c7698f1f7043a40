//! The policy engine seam.
//!
//! The rule language and its evaluator live outside this crate. An engine
//! compiles one rule module against a query entry point and evaluates the
//! prepared query with a resource as input. Its output is handed back in the
//! canonical interchange form (`serde_json::Value`) so that decoding into
//! typed findings happens in exactly one place.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::cancel::CancelToken;
use crate::rules::RuleModule;
use crate::types::{FailureStage, ResourceDocument};

/// Error reported by an engine implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors from evaluating one rule module against one resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Failed to compile rule module {module} for {query}: {source}")]
    Compile {
        module: String,
        query: String,
        source: EngineError,
    },

    #[error("Failed to evaluate rule module {module} for {query}: {source}")]
    Eval {
        module: String,
        query: String,
        source: EngineError,
    },

    #[error("Result does not match finding schema: {0}")]
    Decode(String),
}

impl PolicyError {
    pub fn stage(&self) -> FailureStage {
        match self {
            PolicyError::Compile { .. } => FailureStage::Compile,
            PolicyError::Eval { .. } => FailureStage::Evaluate,
            PolicyError::Decode(_) => FailureStage::Decode,
        }
    }
}

/// One result of a query evaluation.
///
/// Each expression value is expected to be an object of named result
/// bindings, each holding a list of findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub expressions: Vec<Value>,
}

impl QueryResult {
    pub fn new(expressions: Vec<Value>) -> Self {
        Self { expressions }
    }
}

/// A rule module compiled against one query entry point.
///
/// Prepared queries stay on the thread that compiled them.
pub trait PreparedQuery {
    /// Evaluate with `input` as the query input document.
    ///
    /// An entry point that is undefined for this module yields an empty
    /// result set, not an error. Engines that can interrupt a long
    /// evaluation should give up with an error once `cancel` is tripped.
    fn evaluate(
        &self,
        input: &ResourceDocument,
        cancel: &CancelToken,
    ) -> Result<Vec<QueryResult>, EngineError>;
}

/// A policy evaluation engine.
///
/// Engines are shared by every category worker and must be pure: the same
/// module, query and input always produce the same result set.
pub trait PolicyEngine: Send + Sync {
    /// Compile `module` so that `query` can be evaluated against it.
    fn compile(
        &self,
        query: &str,
        module: &RuleModule,
    ) -> Result<Box<dyn PreparedQuery>, EngineError>;

    /// Engine name for logging.
    fn name(&self) -> &str;
}
