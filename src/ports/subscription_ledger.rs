//! Subscription ledger port.
//!
//! Mirrors the latest known status of each platform subscription.

use async_trait::async_trait;

use crate::domain::billing::{ActiveStatusSet, SubscriptionRecord, SubscriptionUpsert};
use crate::domain::foundation::{CustomerId, DomainError, SubscriptionId, TrainerId};

/// Repository port for mirrored subscriptions.
#[async_trait]
pub trait SubscriptionLedger: Send + Sync {
    /// Idempotent upsert keyed on the subscription id, with patch semantics
    /// described on [`SubscriptionUpsert`].
    ///
    /// # Errors
    ///
    /// - `DatabaseError` on persistence failure
    async fn upsert_subscription(&self, upsert: &SubscriptionUpsert) -> Result<(), DomainError>;

    /// Find a subscription by id.
    async fn find_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<SubscriptionRecord>, DomainError>;

    /// The subscription for this customer and trainer whose status is in
    /// `statuses`. When several match, the latest `current_period_end` wins
    /// (missing period ends sort last), then the greatest subscription id.
    async fn find_active_subscription(
        &self,
        customer_id: &CustomerId,
        trainer_id: &TrainerId,
        statuses: &ActiveStatusSet,
    ) -> Result<Option<SubscriptionRecord>, DomainError>;

    /// Set the status to `canceled`, creating the row when absent.
    async fn mark_canceled(
        &self,
        subscription_id: &SubscriptionId,
        customer_id: &CustomerId,
        trainer_id: &TrainerId,
    ) -> Result<(), DomainError>;
}
