//! PostgreSQL implementation of TierCatalog.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, TrainerId};
use crate::ports::TierCatalog;

use super::db_error;

pub struct PostgresTierCatalog {
    pool: PgPool,
}

impl PostgresTierCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TierCatalog for PostgresTierCatalog {
    async fn price_for(
        &self,
        trainer_id: &TrainerId,
        tier_key: &str,
    ) -> Result<Option<String>, DomainError> {
        sqlx::query_scalar(
            "SELECT price_id FROM trainer_tiers WHERE trainer_id = $1 AND tier_key = $2",
        )
        .bind(trainer_id.as_str())
        .bind(tier_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("load tier price"))
    }
}
