//! Runtime orchestrator for concurrent category validation.
//!
//! The orchestrator implements:
//! - A single intake barrier before any work starts
//! - Fan-out of one blocking worker per category
//! - Per-category capacity-one sinks read independently by the consumer
//! - Cooperative cancellation, optionally driven by a deadline

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use kubeaudit_core::{
    CancelToken, Category, CategoryReport, CategoryValidator, PolicyEngine, ResourceBundle,
    RuleSet,
};

use crate::config::{ConfigError, RuntimeConfig};
use crate::intake::{self, Intake, IntakeContract, IntakeError};
use crate::sink::report_channel;

/// Errors from the runtime orchestrator.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Intake failed: {0}")]
    Intake(#[from] IntakeError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{0} report was already received")]
    AlreadyReceived(Category),

    #[error("{category} worker ended without publishing: {reason}")]
    WorkerFailed { category: Category, reason: String },
}

/// The runtime orchestrator fans a validation run out to category workers.
///
/// # Architecture
/// - Intake: waits until the rule set and the resource bundle are both bound
/// - Fan-out: one `spawn_blocking` worker per category, sharing inputs via `Arc`
/// - Fan-in: none; each category publishes to its own sink
pub struct Orchestrator {
    /// Policy engine shared by every worker
    engine: Arc<dyn PolicyEngine>,

    /// Configuration
    config: RuntimeConfig,
}

impl Orchestrator {
    /// Create a new orchestrator.
    pub fn new(engine: Arc<dyn PolicyEngine>, config: RuntimeConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Wait on `intake`, then start every category worker.
    ///
    /// Returns as soon as the workers are started; reports are read from the
    /// returned [`ValidationRun`].
    pub async fn launch(&self, intake: Intake) -> Result<ValidationRun, RuntimeError> {
        self.launch_with_cancel(intake, CancelToken::new()).await
    }

    /// Like [`Orchestrator::launch`], with a cancel token owned by the caller.
    ///
    /// A token tripped before launch still yields one report per category,
    /// each flagged `cancelled`.
    pub async fn launch_with_cancel(
        &self,
        intake: Intake,
        cancel: CancelToken,
    ) -> Result<ValidationRun, RuntimeError> {
        let deadline = self.config.deadline()?;
        let contract = intake.contract();
        let (rules, bundle) = intake.wait().await?;

        tracing::info!(
            engine = self.engine.name(),
            modules = rules.len(),
            resources = bundle.len(),
            "Starting validation run"
        );

        let rules = Arc::new(rules);
        let bundle = Arc::new(bundle);

        let mut receivers = BTreeMap::new();
        let mut workers = BTreeMap::new();

        for category in Category::ALL {
            let (sink, rx) = report_channel(category);
            let engine = Arc::clone(&self.engine);
            let rules = Arc::clone(&rules);
            let bundle = Arc::clone(&bundle);
            let query = self.config.query_for(category);
            let cancel = cancel.clone();

            let handle = tokio::task::spawn_blocking(move || {
                let report = CategoryValidator::new(&*engine, category, &query)
                    .with_cancel(cancel)
                    .validate(bundle.get(category), &rules);
                sink.publish(report);
            });

            receivers.insert(category, rx);
            workers.insert(category, handle);
        }

        let timer = deadline.map(|deadline| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                if !cancel.is_cancelled() {
                    tracing::info!(deadline = ?deadline, "Run deadline reached, cancelling");
                    cancel.cancel();
                }
            })
        });

        Ok(ValidationRun {
            receivers,
            workers,
            contract,
            cancel,
            timer,
        })
    }

    /// Deliver `rules` and `bundle` through a fresh intake and collect every report.
    pub async fn validate(
        &self,
        rules: RuleSet,
        bundle: ResourceBundle,
    ) -> Result<Vec<CategoryReport>, RuntimeError> {
        let (producer, intake) = intake::channel();
        producer.deliver_rules(rules)?;
        producer.deliver_resources(bundle)?;
        self.launch(intake).await?.collect().await
    }
}

/// A launched validation run.
///
/// Each category's report can be read once, in any order. A second delivery
/// on the intake the run was launched from fails every later read.
pub struct ValidationRun {
    receivers: BTreeMap<Category, mpsc::Receiver<CategoryReport>>,
    workers: BTreeMap<Category, JoinHandle<()>>,
    contract: IntakeContract,
    cancel: CancelToken,
    timer: Option<JoinHandle<()>>,
}

impl ValidationRun {
    /// Ask every worker to stop before its next resource.
    pub fn cancel(&self) {
        tracing::info!("Validation run cancelled");
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Categories whose reports have not been read yet.
    pub fn pending(&self) -> Vec<Category> {
        self.receivers.keys().copied().collect()
    }

    /// Wait for one category's report.
    pub async fn recv(&mut self, category: Category) -> Result<CategoryReport, RuntimeError> {
        self.contract.check()?;
        let mut rx = self
            .receivers
            .remove(&category)
            .ok_or(RuntimeError::AlreadyReceived(category))?;

        let report = rx.recv().await;
        self.contract.check()?;
        match report {
            Some(report) => Ok(report),
            None => Err(self.worker_failure(category).await),
        }
    }

    /// Wait for every unread report, returned in [`Category::ALL`] order.
    pub async fn collect(mut self) -> Result<Vec<CategoryReport>, RuntimeError> {
        self.contract.check()?;
        let receivers = std::mem::take(&mut self.receivers);
        let received = join_all(receivers.into_iter().map(|(category, mut rx)| async move {
            (category, rx.recv().await)
        }))
        .await;
        self.contract.check()?;

        let mut reports = Vec::with_capacity(received.len());
        for (category, report) in received {
            match report {
                Some(report) => reports.push(report),
                None => return Err(self.worker_failure(category).await),
            }
        }

        Ok(reports)
    }

    /// Explain why `category` closed its sink without publishing.
    async fn worker_failure(&mut self, category: Category) -> RuntimeError {
        let reason = match self.workers.remove(&category) {
            Some(handle) => match handle.await {
                Err(e) => e.to_string(),
                Ok(()) => "sink closed".to_string(),
            },
            None => "worker missing".to_string(),
        };
        tracing::error!(category = %category, reason = %reason, "Category worker failed");
        RuntimeError::WorkerFailed { category, reason }
    }
}

impl Drop for ValidationRun {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
