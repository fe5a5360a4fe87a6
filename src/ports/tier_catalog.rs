//! Tier catalog port: the platform price behind each trainer tier.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, TrainerId};

#[async_trait]
pub trait TierCatalog: Send + Sync {
    /// Price id for `tier_key` offered by the trainer, if the tier exists.
    async fn price_for(
        &self,
        trainer_id: &TrainerId,
        tier_key: &str,
    ) -> Result<Option<String>, DomainError>;
}
