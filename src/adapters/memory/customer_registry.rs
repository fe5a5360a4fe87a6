//! In-memory customer registry.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::CustomerRecord;
use crate::domain::foundation::{CustomerId, DomainError, PayerId, TrainerId};
use crate::ports::CustomerRegistry;

#[derive(Default)]
struct State {
    rows: HashMap<CustomerId, (CustomerRecord, u64)>,
    next_seq: u64,
}

/// Customer registry backed by a map, ordered by write sequence so
/// "most recent" lookups match the Postgres adapter's `updated_at` ordering.
#[derive(Default)]
pub struct InMemoryCustomerRegistry {
    state: RwLock<State>,
}

impl InMemoryCustomerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored customers.
    pub async fn len(&self) -> usize {
        self.state.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of every record, for assertions.
    pub async fn all(&self) -> Vec<CustomerRecord> {
        let state = self.state.read().await;
        let mut rows: Vec<_> = state.rows.values().cloned().collect();
        rows.sort_by_key(|(_, seq)| *seq);
        rows.into_iter().map(|(record, _)| record).collect()
    }

    async fn latest_matching<F>(&self, predicate: F) -> Option<CustomerId>
    where
        F: Fn(&CustomerRecord) -> bool,
    {
        let state = self.state.read().await;
        state
            .rows
            .values()
            .filter(|(record, _)| predicate(record))
            .max_by_key(|(_, seq)| *seq)
            .map(|(record, _)| record.customer_id.clone())
    }
}

#[async_trait]
impl CustomerRegistry for InMemoryCustomerRegistry {
    async fn upsert_customer(&self, record: &CustomerRecord) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        state.next_seq += 1;
        let seq = state.next_seq;
        state
            .rows
            .insert(record.customer_id.clone(), (record.clone(), seq));
        Ok(())
    }

    async fn find_customer(
        &self,
        payer_id: &PayerId,
        trainer_id: &TrainerId,
    ) -> Result<Option<CustomerId>, DomainError> {
        Ok(self
            .latest_matching(|r| &r.payer_id == payer_id && &r.trainer_id == trainer_id)
            .await)
    }

    async fn find_any_customer_for_trainer(
        &self,
        trainer_id: &TrainerId,
    ) -> Result<Option<CustomerId>, DomainError> {
        Ok(self.latest_matching(|r| &r.trainer_id == trainer_id).await)
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerRecord>, DomainError> {
        let state = self.state.read().await;
        Ok(state.rows.get(customer_id).map(|(record, _)| record.clone()))
    }
}
