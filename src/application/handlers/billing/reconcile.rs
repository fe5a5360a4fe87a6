//! Reconciliation: applies one billing signal to the local stores.
//!
//! Every entry point that learns something from the billing platform
//! (checkout finalize, checkout and subscription webhooks, tier changes)
//! funnels through [`ReconciliationEngine::reconcile`]. The steps are:
//!
//! 1. resolve the payer (always fatal on failure)
//! 2. upsert the customer mapping
//! 3. obtain a subscription snapshot (supplied, fetched live, or synthesized
//!    for customer-only billing)
//! 4. upsert the ledger row
//! 5. link the membership, or unlink it when the status is terminal
//!
//! Steps 2 to 5 follow the caller's [`FailurePolicy`].

use std::sync::Arc;

use crate::domain::billing::{
    BillingError, CustomerRecord, PayerHint, PayerSource, SubscriptionSnapshot,
    SubscriptionStatus, SubscriptionUpsert,
};
use crate::domain::foundation::{CustomerId, PayerId, SubscriptionId, TrainerId};
use crate::ports::{
    BillingProvider, CustomerRegistry, MembershipLinker, SubscriptionLedger, UnlinkOutcome,
};

use super::outcome::{FailurePolicy, Step, StepFailure, StepLog};
use super::payer_resolver::PayerResolver;
use super::unlink::{UnlinkEngine, UnlinkTarget};

/// Where the subscription state comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSource {
    /// Re-read from the billing platform by subscription id.
    Live,
    /// Already in hand, e.g. an expanded checkout session.
    Known(SubscriptionSnapshot),
}

/// One piece of billing news to reconcile.
#[derive(Debug, Clone)]
pub struct BillingSignal {
    pub customer_id: CustomerId,

    /// `None` for customer-only billing; a local id is synthesized.
    pub subscription_id: Option<SubscriptionId>,

    pub trainer_id: TrainerId,
    pub payer: PayerHint,

    /// Takes precedence over the tier on the snapshot.
    pub tier_key: Option<String>,

    pub snapshot: SnapshotSource,
}

/// Effect on the trainer↔payer relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Linked,
    Unlinked(UnlinkOutcome),
    /// No snapshot could be obtained, so the relation was not touched.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub payer_id: PayerId,
    pub payer_source: PayerSource,
    pub subscription_id: Option<SubscriptionId>,
    pub status: Option<SubscriptionStatus>,
    pub membership: MembershipChange,
    pub failures: Vec<StepFailure>,
}

impl ReconcileOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    resolver: PayerResolver,
    registry: Arc<dyn CustomerRegistry>,
    ledger: Arc<dyn SubscriptionLedger>,
    linker: Arc<dyn MembershipLinker>,
    provider: Arc<dyn BillingProvider>,
    unlink: UnlinkEngine,
}

impl ReconciliationEngine {
    pub fn new(
        resolver: PayerResolver,
        registry: Arc<dyn CustomerRegistry>,
        ledger: Arc<dyn SubscriptionLedger>,
        linker: Arc<dyn MembershipLinker>,
        provider: Arc<dyn BillingProvider>,
    ) -> Self {
        let unlink = UnlinkEngine::new(registry.clone(), ledger.clone(), linker.clone());
        Self {
            resolver,
            registry,
            ledger,
            linker,
            provider,
            unlink,
        }
    }

    pub fn unlink_engine(&self) -> &UnlinkEngine {
        &self.unlink
    }

    pub async fn reconcile(
        &self,
        signal: BillingSignal,
        policy: FailurePolicy,
    ) -> Result<ReconcileOutcome, BillingError> {
        let (payer_id, payer_source) = self.resolver.resolve(&signal.payer).await?;
        let mut log = StepLog::new(policy);

        let record = CustomerRecord::new(
            signal.customer_id.clone(),
            signal.trainer_id.clone(),
            payer_id.clone(),
        );
        let result = self
            .registry
            .upsert_customer(&record)
            .await
            .map_err(BillingError::from);
        log.check(Step::UpsertCustomer, result)?;

        let snapshot = match signal.snapshot {
            SnapshotSource::Known(snapshot) => Some(snapshot),
            SnapshotSource::Live => match &signal.subscription_id {
                Some(id) => log.check(Step::FetchSnapshot, self.fetch_live(id).await)?,
                None => Some(SubscriptionSnapshot::local(signal.customer_id.clone())),
            },
        };

        let Some(snapshot) = snapshot else {
            return Ok(ReconcileOutcome {
                payer_id,
                payer_source,
                subscription_id: signal.subscription_id,
                status: None,
                membership: MembershipChange::Unchanged,
                failures: log.into_failures(),
            });
        };

        let status = self.effective_status(&snapshot).await;
        let upsert = SubscriptionUpsert {
            subscription_id: snapshot.subscription_id.clone(),
            customer_id: signal.customer_id.clone(),
            trainer_id: signal.trainer_id.clone(),
            status,
            price_id: snapshot.price_id.clone(),
            tier_key: signal.tier_key.or_else(|| snapshot.tier_key.clone()),
            current_period_end: snapshot.current_period_end,
        };
        let result = self
            .ledger
            .upsert_subscription(&upsert)
            .await
            .map_err(BillingError::from);
        log.check(Step::UpsertLedger, result)?;

        let membership = if status.is_terminal_negative() {
            let report = self
                .unlink
                .unlink(
                    UnlinkTarget::membership(signal.trainer_id.clone(), payer_id.clone()),
                    policy,
                )
                .await?;
            log.absorb(report.failures);
            MembershipChange::Unlinked(report.outcome)
        } else {
            let result = self
                .linker
                .link(&signal.trainer_id, &payer_id)
                .await
                .map_err(BillingError::from);
            match log.check(Step::Link, result)? {
                Some(()) => MembershipChange::Linked,
                None => MembershipChange::Unchanged,
            }
        };

        tracing::info!(
            trainer_id = %signal.trainer_id,
            payer_id = %payer_id,
            subscription_id = %snapshot.subscription_id,
            status = %status,
            membership = ?membership,
            "Billing signal reconciled"
        );

        Ok(ReconcileOutcome {
            payer_id,
            payer_source,
            subscription_id: Some(snapshot.subscription_id),
            status: Some(status),
            membership,
            failures: log.into_failures(),
        })
    }

    async fn fetch_live(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        self.provider
            .get_subscription(subscription_id)
            .await?
            .ok_or_else(|| BillingError::not_found(format!("subscription {}", subscription_id)))
    }

    /// The upstream status, except that a subscription a trainer already
    /// kicked (ledger `canceled`) stays canceled while the platform still
    /// reports it running until period end.
    async fn effective_status(&self, snapshot: &SubscriptionSnapshot) -> SubscriptionStatus {
        if !snapshot.cancel_at_period_end || snapshot.status.is_terminal_negative() {
            return snapshot.status;
        }

        match self.ledger.find_subscription(&snapshot.subscription_id).await {
            Ok(Some(row)) if row.status == SubscriptionStatus::Canceled => {
                tracing::debug!(
                    subscription_id = %snapshot.subscription_id,
                    "Deferred kick pending, keeping subscription canceled"
                );
                SubscriptionStatus::Canceled
            }
            Ok(_) => snapshot.status,
            Err(e) => {
                tracing::warn!(
                    subscription_id = %snapshot.subscription_id,
                    error = %e,
                    "Ledger lookup failed, using upstream status"
                );
                snapshot.status
            }
        }
    }
}
