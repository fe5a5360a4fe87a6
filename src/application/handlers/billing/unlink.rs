//! Ends a payer's membership with a trainer.
//!
//! Cancels the ledger row when there is one and removes the
//! trainer↔payer relation on both sides. Used by member kicks, by
//! `customer.subscription.deleted` webhooks and by reconciliation when a
//! subscription reaches a terminal status.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::{CustomerId, PayerId, SubscriptionId, TrainerId};
use crate::ports::{CustomerRegistry, MembershipLinker, SubscriptionLedger, UnlinkOutcome};

use super::outcome::{FailurePolicy, Step, StepFailure, StepLog};

/// What to unlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlinkTarget {
    pub trainer_id: TrainerId,
    pub payer_id: PayerId,

    /// Needed together with `subscription_id` to cancel the ledger row.
    pub customer_id: Option<CustomerId>,
    pub subscription_id: Option<SubscriptionId>,
}

impl UnlinkTarget {
    /// Relation only, no ledger write.
    pub fn membership(trainer_id: TrainerId, payer_id: PayerId) -> Self {
        Self {
            trainer_id,
            payer_id,
            customer_id: None,
            subscription_id: None,
        }
    }

    pub fn with_subscription(
        mut self,
        customer_id: CustomerId,
        subscription_id: Option<SubscriptionId>,
    ) -> Self {
        self.customer_id = Some(customer_id);
        self.subscription_id = subscription_id;
        self
    }
}

/// What an unlink actually changed.
#[derive(Debug, Clone)]
pub struct UnlinkReport {
    pub trainer_id: TrainerId,
    pub payer_id: PayerId,
    pub marked_canceled: bool,
    pub outcome: UnlinkOutcome,
    pub failures: Vec<StepFailure>,
}

impl UnlinkReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone)]
pub struct UnlinkEngine {
    registry: Arc<dyn CustomerRegistry>,
    ledger: Arc<dyn SubscriptionLedger>,
    linker: Arc<dyn MembershipLinker>,
}

impl UnlinkEngine {
    pub fn new(
        registry: Arc<dyn CustomerRegistry>,
        ledger: Arc<dyn SubscriptionLedger>,
        linker: Arc<dyn MembershipLinker>,
    ) -> Self {
        Self {
            registry,
            ledger,
            linker,
        }
    }

    /// Unlinks the (trainer, payer) pair recorded for a billing customer.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the customer is not in the registry
    pub async fn unlink_by_customer(
        &self,
        customer_id: &CustomerId,
        subscription_id: Option<SubscriptionId>,
        policy: FailurePolicy,
    ) -> Result<UnlinkReport, BillingError> {
        let record = self
            .registry
            .find_by_customer_id(customer_id)
            .await?
            .ok_or_else(|| BillingError::not_found("billing customer"))?;

        let target = UnlinkTarget::membership(record.trainer_id, record.payer_id)
            .with_subscription(record.customer_id, subscription_id);
        self.unlink(target, policy).await
    }

    pub async fn unlink(
        &self,
        target: UnlinkTarget,
        policy: FailurePolicy,
    ) -> Result<UnlinkReport, BillingError> {
        let mut log = StepLog::new(policy);

        let mut marked_canceled = false;
        if let (Some(customer_id), Some(subscription_id)) =
            (&target.customer_id, &target.subscription_id)
        {
            let result = self
                .ledger
                .mark_canceled(subscription_id, customer_id, &target.trainer_id)
                .await
                .map_err(BillingError::from);
            marked_canceled = log.check(Step::MarkCanceled, result)?.is_some();
        }

        let result = self
            .linker
            .unlink(&target.trainer_id, &target.payer_id)
            .await
            .map_err(BillingError::from);
        let outcome = log.check(Step::Unlink, result)?.unwrap_or_default();

        tracing::info!(
            trainer_id = %target.trainer_id,
            payer_id = %target.payer_id,
            marked_canceled,
            removed_from_trainer = outcome.removed_from_trainer,
            cleared_back_reference = outcome.cleared_back_reference,
            "Membership unlinked"
        );

        Ok(UnlinkReport {
            trainer_id: target.trainer_id,
            payer_id: target.payer_id,
            marked_canceled,
            outcome,
            failures: log.into_failures(),
        })
    }
}
