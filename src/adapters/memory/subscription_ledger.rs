//! In-memory subscription ledger.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{
    ActiveStatusSet, SubscriptionRecord, SubscriptionStatus, SubscriptionUpsert,
};
use crate::domain::foundation::{CustomerId, DomainError, SubscriptionId, TrainerId};
use crate::ports::SubscriptionLedger;

#[derive(Default)]
pub struct InMemorySubscriptionLedger {
    rows: RwLock<HashMap<SubscriptionId, SubscriptionRecord>>,
}

impl InMemorySubscriptionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing patch semantics.
    pub fn with_record(mut self, record: SubscriptionRecord) -> Self {
        self.rows
            .get_mut()
            .insert(record.subscription_id.clone(), record);
        self
    }

    /// Snapshot of every record, for assertions.
    pub async fn all(&self) -> Vec<SubscriptionRecord> {
        let rows = self.rows.read().await;
        let mut all: Vec<_> = rows.values().cloned().collect();
        all.sort_by(|a, b| a.subscription_id.as_str().cmp(b.subscription_id.as_str()));
        all
    }
}

#[async_trait]
impl SubscriptionLedger for InMemorySubscriptionLedger {
    async fn upsert_subscription(&self, upsert: &SubscriptionUpsert) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        let existing = rows.remove(&upsert.subscription_id);
        let record = upsert.clone().apply_to(existing);
        rows.insert(record.subscription_id.clone(), record);
        Ok(())
    }

    async fn find_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        Ok(self.rows.read().await.get(subscription_id).cloned())
    }

    async fn find_active_subscription(
        &self,
        customer_id: &CustomerId,
        trainer_id: &TrainerId,
        statuses: &ActiveStatusSet,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|r| {
                &r.customer_id == customer_id
                    && &r.trainer_id == trainer_id
                    && statuses.contains(r.status)
            })
            .max_by(|a, b| {
                a.current_period_end
                    .cmp(&b.current_period_end)
                    .then_with(|| a.subscription_id.as_str().cmp(b.subscription_id.as_str()))
            })
            .cloned())
    }

    async fn mark_canceled(
        &self,
        subscription_id: &SubscriptionId,
        customer_id: &CustomerId,
        trainer_id: &TrainerId,
    ) -> Result<(), DomainError> {
        self.upsert_subscription(&SubscriptionUpsert::status_only(
            subscription_id.clone(),
            customer_id.clone(),
            trainer_id.clone(),
            SubscriptionStatus::Canceled,
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;

    fn ids() -> (SubscriptionId, CustomerId, TrainerId) {
        (
            SubscriptionId::new("sub_1").unwrap(),
            CustomerId::new("cus_1").unwrap(),
            TrainerId::new("T1").unwrap(),
        )
    }

    #[tokio::test]
    async fn upsert_then_partial_patch_keeps_tier() {
        let ledger = InMemorySubscriptionLedger::new();
        let (sub, cus, trainer) = ids();

        let mut first = SubscriptionUpsert::status_only(
            sub.clone(),
            cus.clone(),
            trainer.clone(),
            SubscriptionStatus::Active,
        );
        first.tier_key = Some("plus".to_string());
        ledger.upsert_subscription(&first).await.unwrap();

        ledger
            .upsert_subscription(&SubscriptionUpsert::status_only(
                sub.clone(),
                cus,
                trainer,
                SubscriptionStatus::PastDue,
            ))
            .await
            .unwrap();

        let record = ledger.find_subscription(&sub).await.unwrap().unwrap();
        assert_eq!(record.status, SubscriptionStatus::PastDue);
        assert_eq!(record.tier_key.as_deref(), Some("plus"));
    }

    #[tokio::test]
    async fn find_active_never_returns_canceled() {
        let ledger = InMemorySubscriptionLedger::new();
        let (sub, cus, trainer) = ids();
        ledger.mark_canceled(&sub, &cus, &trainer).await.unwrap();

        let everything = ActiveStatusSet::new(SubscriptionStatus::ALL);
        let found = ledger
            .find_active_subscription(&cus, &trainer, &everything)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn find_active_prefers_latest_period_end() {
        let ledger = InMemorySubscriptionLedger::new();
        let (_, cus, trainer) = ids();

        for (id, end) in [("sub_a", 1_000), ("sub_b", 2_000)] {
            let mut upsert = SubscriptionUpsert::status_only(
                SubscriptionId::new(id).unwrap(),
                cus.clone(),
                trainer.clone(),
                SubscriptionStatus::Active,
            );
            upsert.current_period_end = Timestamp::from_unix_secs(end);
            ledger.upsert_subscription(&upsert).await.unwrap();
        }

        let found = ledger
            .find_active_subscription(&cus, &trainer, &ActiveStatusSet::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.subscription_id.as_str(), "sub_b");
    }

    #[tokio::test]
    async fn find_active_orders_missing_period_end_last_then_by_id() {
        let ledger = InMemorySubscriptionLedger::new();
        let (_, cus, trainer) = ids();

        for (id, end) in [("sub_a", Some(1_000)), ("sub_c", Some(1_000)), ("sub_z", None)] {
            let mut upsert = SubscriptionUpsert::status_only(
                SubscriptionId::new(id).unwrap(),
                cus.clone(),
                trainer.clone(),
                SubscriptionStatus::Active,
            );
            upsert.current_period_end = end.and_then(Timestamp::from_unix_secs);
            ledger.upsert_subscription(&upsert).await.unwrap();
        }

        let found = ledger
            .find_active_subscription(&cus, &trainer, &ActiveStatusSet::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.subscription_id.as_str(), "sub_c");
    }

    #[tokio::test]
    async fn mark_canceled_creates_missing_row() {
        let ledger = InMemorySubscriptionLedger::new();
        let (sub, cus, trainer) = ids();

        ledger.mark_canceled(&sub, &cus, &trainer).await.unwrap();

        let record = ledger.find_subscription(&sub).await.unwrap().unwrap();
        assert_eq!(record.status, SubscriptionStatus::Canceled);
        assert!(record.tier_key.is_none());
    }
}
