//! Failure policy shared by the reconciliation and unlink paths.
//!
//! Synchronous callers want the first error. The webhook path wants every
//! independent write attempted, with the failures collected for the event
//! record. `StepLog` is the one place that difference is decided.

use std::fmt;

use crate::domain::billing::BillingError;

/// How a multi-step billing operation treats a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The first failure aborts the operation.
    Strict,
    /// Each step's failure is logged and recorded; later steps still run.
    Isolated,
}

/// Individually failing steps of reconcile and unlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    UpsertCustomer,
    FetchSnapshot,
    UpsertLedger,
    Link,
    MarkCanceled,
    Unlink,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::UpsertCustomer => "upsert_customer",
            Step::FetchSnapshot => "fetch_snapshot",
            Step::UpsertLedger => "upsert_ledger",
            Step::Link => "link",
            Step::MarkCanceled => "mark_canceled",
            Step::Unlink => "unlink",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step that failed under `FailurePolicy::Isolated`.
#[derive(Debug, Clone)]
pub struct StepFailure {
    pub step: Step,
    pub error: BillingError,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.error)
    }
}

/// Joins failures into the message stored on a dead-letter record.
pub fn summarize(failures: &[StepFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Applies a [`FailurePolicy`] to step results.
#[derive(Debug)]
pub struct StepLog {
    policy: FailurePolicy,
    failures: Vec<StepFailure>,
}

impl StepLog {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            failures: Vec::new(),
        }
    }

    /// Strict: a failure is returned as `Err`. Isolated: it is logged,
    /// recorded and swallowed, and the caller gets `Ok(None)`.
    pub fn check<T>(
        &mut self,
        step: Step,
        result: Result<T, BillingError>,
    ) -> Result<Option<T>, BillingError> {
        match (result, self.policy) {
            (Ok(value), _) => Ok(Some(value)),
            (Err(error), FailurePolicy::Strict) => Err(error),
            (Err(error), FailurePolicy::Isolated) => {
                tracing::error!(step = %step, error = %error, "Billing step failed");
                self.failures.push(StepFailure { step, error });
                Ok(None)
            }
        }
    }

    pub fn absorb(&mut self, failures: Vec<StepFailure>) {
        self.failures.extend(failures);
    }

    pub fn into_failures(self) -> Vec<StepFailure> {
        self.failures
    }
}
