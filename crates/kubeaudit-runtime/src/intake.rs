//! One-shot intake barrier.
//!
//! Upstream producers hand over the rule set and the resource bundle exactly
//! once each. The orchestrator waits on [`Intake::wait`] until both are bound
//! and only then fans out. A second delivery of either input breaks the
//! contract: the producer gets an error, a pending wait is released with the
//! same error, and a run already launched from this intake fails.

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

use kubeaudit_core::{ResourceBundle, RuleSet};

/// Intake contract violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntakeError {
    #[error("{0} was already delivered")]
    AlreadyDelivered(&'static str),

    #[error("{0} was never delivered")]
    Missing(&'static str),

    #[error("Intake closed before {0} was delivered")]
    Closed(&'static str),
}

const RULES: &str = "rule set";
const RESOURCES: &str = "resource bundle";

/// Create a connected producer/intake pair.
pub fn channel() -> (IntakeProducer, Intake) {
    let (rules_tx, rules_rx) = oneshot::channel();
    let (resources_tx, resources_rx) = oneshot::channel();
    let contract = IntakeContract::default();

    let producer = IntakeProducer {
        rules: Arc::new(Mutex::new(Some(rules_tx))),
        resources: Arc::new(Mutex::new(Some(resources_tx))),
        contract: contract.clone(),
    };
    let intake = Intake {
        rules: rules_rx,
        resources: resources_rx,
        contract,
    };

    (producer, intake)
}

/// Shared record of the first intake contract violation.
#[derive(Debug, Clone, Default)]
pub struct IntakeContract {
    violation: Arc<Mutex<Option<IntakeError>>>,
}

impl IntakeContract {
    /// Fails with the recorded violation, if any.
    pub fn check(&self) -> Result<(), IntakeError> {
        match self.violation.lock().clone() {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }

    fn violate(&self, error: IntakeError) -> IntakeError {
        self.violation.lock().get_or_insert(error).clone()
    }
}

/// Delivery side of the intake. Clones share the same one-shot slots.
#[derive(Clone)]
pub struct IntakeProducer {
    rules: Arc<Mutex<Option<oneshot::Sender<RuleSet>>>>,
    resources: Arc<Mutex<Option<oneshot::Sender<ResourceBundle>>>>,
    contract: IntakeContract,
}

impl IntakeProducer {
    /// Deliver the rule set. A second delivery fails and poisons the intake.
    pub fn deliver_rules(&self, rules: RuleSet) -> Result<(), IntakeError> {
        let modules = rules.len();
        self.deliver(&self.rules, rules, RULES)?;
        tracing::debug!(modules, "Rule set delivered");
        Ok(())
    }

    /// Deliver the resource bundle. A second delivery fails and poisons the intake.
    pub fn deliver_resources(&self, bundle: ResourceBundle) -> Result<(), IntakeError> {
        let resources = bundle.len();
        self.deliver(&self.resources, bundle, RESOURCES)?;
        tracing::debug!(resources, "Resource bundle delivered");
        Ok(())
    }

    fn deliver<T>(
        &self,
        slot: &Mutex<Option<oneshot::Sender<T>>>,
        value: T,
        what: &'static str,
    ) -> Result<(), IntakeError> {
        self.contract.check()?;

        let sender = slot.lock().take();
        let Some(sender) = sender else {
            return Err(self.poison(what));
        };
        sender.send(value).map_err(|_| IntakeError::Closed(what))
    }

    /// Record a double delivery and release any pending wait.
    fn poison(&self, what: &'static str) -> IntakeError {
        let violation = self.contract.violate(IntakeError::AlreadyDelivered(what));
        tracing::error!(input = what, "Intake input delivered twice, failing the run");

        drop(self.rules.lock().take());
        drop(self.resources.lock().take());
        violation
    }
}

/// Receiving side of the intake, owned by the orchestrator.
pub struct Intake {
    rules: oneshot::Receiver<RuleSet>,
    resources: oneshot::Receiver<ResourceBundle>,
    contract: IntakeContract,
}

impl Intake {
    /// Handle for checking the contract after [`Intake::wait`] has returned.
    pub fn contract(&self) -> IntakeContract {
        self.contract.clone()
    }

    /// Wait until both the rule set and the resource bundle are delivered.
    ///
    /// Fails if a producer goes away without delivering, or if either input
    /// was delivered twice.
    pub async fn wait(self) -> Result<(RuleSet, ResourceBundle), IntakeError> {
        let (rules, resources) = tokio::join!(self.rules, self.resources);
        self.contract.check()?;

        let rules = rules.map_err(|_| IntakeError::Missing(RULES))?;
        let resources = resources.map_err(|_| IntakeError::Missing(RESOURCES))?;
        Ok((rules, resources))
    }
}
