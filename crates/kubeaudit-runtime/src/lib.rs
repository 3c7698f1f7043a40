//! # kubeaudit-runtime
//!
//! Concurrent validation runs for kubeaudit.
//!
//! This crate wires the deterministic validators from `kubeaudit-core` into a
//! tokio runtime:
//! - An intake barrier that receives the rule set and resource bundle once
//! - One blocking worker per resource category
//! - One report sink per category, read in any order
//! - Cancellation, by hand or by a configured deadline
//!
//! ## Example
//!
//! ```rust,ignore
//! use kubeaudit_runtime::{intake, Orchestrator, RuntimeConfig};
//!
//! let orchestrator = Orchestrator::new(engine, RuntimeConfig::default());
//! let (producer, intake) = intake::channel();
//!
//! producer.deliver_rules(rules)?;
//! producer.deliver_resources(bundle)?;
//!
//! let mut run = orchestrator.launch(intake).await?;
//! let deployments = run.recv(Category::Deployments).await?;
//! let everything_else = run.collect().await?;
//! ```

pub mod config;
pub mod intake;
pub mod orchestrator;
pub mod sink;

#[cfg(feature = "rego")]
pub mod rego;

pub use config::{ConfigError, RuntimeConfig};
pub use intake::{Intake, IntakeContract, IntakeError, IntakeProducer};
pub use orchestrator::{Orchestrator, RuntimeError, ValidationRun};
pub use sink::ReportSink;

#[cfg(feature = "rego")]
pub use rego::RegoEngine;
