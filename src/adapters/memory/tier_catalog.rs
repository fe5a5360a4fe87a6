//! In-memory tier catalog.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, TrainerId};
use crate::ports::TierCatalog;

#[derive(Default)]
pub struct InMemoryTierCatalog {
    prices: RwLock<HashMap<(TrainerId, String), String>>,
}

impl InMemoryTierCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tier(
        mut self,
        trainer_id: TrainerId,
        tier_key: impl Into<String>,
        price_id: impl Into<String>,
    ) -> Self {
        self.prices
            .get_mut()
            .insert((trainer_id, tier_key.into()), price_id.into());
        self
    }
}

#[async_trait]
impl TierCatalog for InMemoryTierCatalog {
    async fn price_for(
        &self,
        trainer_id: &TrainerId,
        tier_key: &str,
    ) -> Result<Option<String>, DomainError> {
        let prices = self.prices.read().await;
        Ok(prices
            .get(&(trainer_id.clone(), tier_key.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tiers_are_scoped_per_trainer() {
        let t1 = TrainerId::new("T1").unwrap();
        let t2 = TrainerId::new("T2").unwrap();
        let catalog = InMemoryTierCatalog::new().with_tier(t1.clone(), "plus", "price_t1_plus");

        assert_eq!(
            catalog.price_for(&t1, "plus").await.unwrap().as_deref(),
            Some("price_t1_plus")
        );
        assert!(catalog.price_for(&t2, "plus").await.unwrap().is_none());
        assert!(catalog.price_for(&t1, "pro").await.unwrap().is_none());
    }
}
