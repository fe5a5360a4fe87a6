//! ChangeTierHandler - moves a payer's subscription to another tier.

use std::sync::Arc;

use crate::domain::billing::{ActiveStatusSet, BillingError, PayerHint, SubscriptionStatus};
use crate::domain::foundation::{AuthenticatedUser, SubscriptionId, TrainerId};
use crate::ports::{
    BillingProvider, CustomerRegistry, SubscriptionLedger, TierCatalog, UpdateSubscriptionRequest,
};

use super::outcome::FailurePolicy;
use super::reconcile::{BillingSignal, ReconciliationEngine, SnapshotSource};

#[derive(Debug, Clone)]
pub struct ChangeTierCommand {
    pub caller: AuthenticatedUser,
    pub trainer_id: TrainerId,
    pub tier_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeTierResult {
    pub subscription_id: SubscriptionId,
    pub tier_key: String,
    pub status: Option<SubscriptionStatus>,
}

pub struct ChangeTierHandler {
    tiers: Arc<dyn TierCatalog>,
    registry: Arc<dyn CustomerRegistry>,
    ledger: Arc<dyn SubscriptionLedger>,
    provider: Arc<dyn BillingProvider>,
    reconciler: ReconciliationEngine,
    active_statuses: ActiveStatusSet,
}

impl ChangeTierHandler {
    pub fn new(
        tiers: Arc<dyn TierCatalog>,
        registry: Arc<dyn CustomerRegistry>,
        ledger: Arc<dyn SubscriptionLedger>,
        provider: Arc<dyn BillingProvider>,
        reconciler: ReconciliationEngine,
    ) -> Self {
        Self {
            tiers,
            registry,
            ledger,
            provider,
            reconciler,
            active_statuses: ActiveStatusSet::default(),
        }
    }

    pub fn with_active_statuses(mut self, statuses: ActiveStatusSet) -> Self {
        self.active_statuses = statuses;
        self
    }

    pub async fn handle(&self, cmd: ChangeTierCommand) -> Result<ChangeTierResult, BillingError> {
        if cmd.tier_key.trim().is_empty() {
            return Err(BillingError::Validation("tier_key is required".to_string()));
        }

        let payer_id = cmd.caller.as_payer();

        // 1. Find the live subscription to this trainer
        let customer_id = self
            .registry
            .find_customer(&payer_id, &cmd.trainer_id)
            .await?
            .ok_or_else(|| BillingError::not_found("active subscription"))?;
        let current = self
            .ledger
            .find_active_subscription(&customer_id, &cmd.trainer_id, &self.active_statuses)
            .await?
            .ok_or_else(|| BillingError::not_found("active subscription"))?;

        if current.subscription_id.is_local() {
            return Err(BillingError::Validation(
                "subscription is not managed by the billing platform".to_string(),
            ));
        }

        // 2. Resolve the new price
        let price_id = self
            .tiers
            .price_for(&cmd.trainer_id, &cmd.tier_key)
            .await?
            .ok_or_else(|| BillingError::not_found(format!("tier {}", cmd.tier_key)))?;

        // 3. Update upstream, then mirror the returned state
        let snapshot = self
            .provider
            .update_subscription(UpdateSubscriptionRequest {
                subscription_id: current.subscription_id.clone(),
                price_id,
                tier_key: cmd.tier_key.clone(),
            })
            .await?;

        let signal = BillingSignal {
            customer_id: customer_id.clone(),
            subscription_id: Some(current.subscription_id.clone()),
            trainer_id: cmd.trainer_id.clone(),
            payer: PayerHint::new().with_caller(payer_id),
            tier_key: Some(cmd.tier_key.clone()),
            snapshot: SnapshotSource::Known(snapshot),
        };
        let outcome = self.reconciler.reconcile(signal, FailurePolicy::Strict).await?;

        tracing::info!(
            subscription_id = %current.subscription_id,
            trainer_id = %cmd.trainer_id,
            from = current.tier_key.as_deref().unwrap_or("unknown"),
            to = %cmd.tier_key,
            "Subscription tier changed"
        );

        Ok(ChangeTierResult {
            subscription_id: current.subscription_id,
            tier_key: cmd.tier_key,
            status: outcome.status,
        })
    }
}
