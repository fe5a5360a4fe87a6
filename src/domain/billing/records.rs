//! Billing records mirrored from the payment platform.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CustomerId, PayerId, SubscriptionId, Timestamp, TrainerId};

use super::SubscriptionStatus;

/// Maps a (payer, trainer) pair to a billing-platform customer.
///
/// Unique on `customer_id`; a payer has at most one customer per trainer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub customer_id: CustomerId,
    pub trainer_id: TrainerId,
    pub payer_id: PayerId,
}

impl CustomerRecord {
    pub fn new(customer_id: CustomerId, trainer_id: TrainerId, payer_id: PayerId) -> Self {
        Self {
            customer_id,
            trainer_id,
            payer_id,
        }
    }
}

/// Latest known state of one subscription, keyed by `subscription_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub subscription_id: SubscriptionId,
    pub customer_id: CustomerId,
    pub trainer_id: TrainerId,
    pub status: SubscriptionStatus,
    pub price_id: Option<String>,
    pub tier_key: Option<String>,
    pub current_period_end: Option<Timestamp>,
}

/// Partial write to the subscription ledger.
///
/// `status`, `customer_id` and `trainer_id` always overwrite. The optional
/// fields only overwrite when `Some`; `None` keeps the stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionUpsert {
    pub subscription_id: SubscriptionId,
    pub customer_id: CustomerId,
    pub trainer_id: TrainerId,
    pub status: SubscriptionStatus,
    pub price_id: Option<String>,
    pub tier_key: Option<String>,
    pub current_period_end: Option<Timestamp>,
}

impl SubscriptionUpsert {
    /// A status-only patch.
    pub fn status_only(
        subscription_id: SubscriptionId,
        customer_id: CustomerId,
        trainer_id: TrainerId,
        status: SubscriptionStatus,
    ) -> Self {
        Self {
            subscription_id,
            customer_id,
            trainer_id,
            status,
            price_id: None,
            tier_key: None,
            current_period_end: None,
        }
    }

    /// Applies this patch on top of an existing record (or creates one).
    pub fn apply_to(self, existing: Option<SubscriptionRecord>) -> SubscriptionRecord {
        let (price_id, tier_key, current_period_end) = match existing {
            Some(prev) => (
                self.price_id.or(prev.price_id),
                self.tier_key.or(prev.tier_key),
                self.current_period_end.or(prev.current_period_end),
            ),
            None => (self.price_id, self.tier_key, self.current_period_end),
        };

        SubscriptionRecord {
            subscription_id: self.subscription_id,
            customer_id: self.customer_id,
            trainer_id: self.trainer_id,
            status: self.status,
            price_id,
            tier_key,
            current_period_end,
        }
    }
}

/// Subscription state as read from the billing platform.
///
/// Metadata written at checkout (`trainer_id`, `user_id`, `tier_key`) is
/// lifted into typed fields by the provider adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    pub subscription_id: SubscriptionId,
    pub customer_id: CustomerId,
    pub status: SubscriptionStatus,
    pub price_id: Option<String>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    pub trainer_id: Option<TrainerId>,
    pub payer_id: Option<PayerId>,
    pub tier_key: Option<String>,
}

impl SubscriptionSnapshot {
    /// Minimal snapshot, mostly useful for synthesized subscriptions and tests.
    pub fn new(
        subscription_id: SubscriptionId,
        customer_id: CustomerId,
        status: SubscriptionStatus,
    ) -> Self {
        Self {
            subscription_id,
            customer_id,
            status,
            price_id: None,
            current_period_end: None,
            cancel_at_period_end: false,
            trainer_id: None,
            payer_id: None,
            tier_key: None,
        }
    }

    /// Snapshot for a customer billed without an upstream subscription.
    pub fn local(customer_id: CustomerId) -> Self {
        Self::new(
            SubscriptionId::local_for(&customer_id),
            customer_id,
            SubscriptionStatus::Active,
        )
    }
}
