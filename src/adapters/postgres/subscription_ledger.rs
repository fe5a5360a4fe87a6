//! PostgreSQL implementation of SubscriptionLedger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::{
    ActiveStatusSet, SubscriptionRecord, SubscriptionStatus, SubscriptionUpsert,
};
use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, SubscriptionId, Timestamp, TrainerId,
};
use crate::ports::SubscriptionLedger;

use super::{corrupt_row, db_error};

/// Ledger rows in `billing_subscriptions`, one per subscription id.
///
/// Optional columns use `COALESCE(EXCLUDED.col, col)` so a partial upsert
/// never clears a value an earlier event supplied.
pub struct PostgresSubscriptionLedger {
    pool: PgPool,
}

impl PostgresSubscriptionLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    subscription_id: String,
    customer_id: String,
    trainer_id: String,
    status: String,
    price_id: Option<String>,
    tier_key: Option<String>,
    current_period_end: Option<DateTime<Utc>>,
}

impl TryFrom<SubscriptionRow> for SubscriptionRecord {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status: SubscriptionStatus = row.status.parse().map_err(|_| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid subscription status: {}", row.status),
            )
        })?;

        Ok(SubscriptionRecord {
            subscription_id: SubscriptionId::new(row.subscription_id).map_err(corrupt_row)?,
            customer_id: CustomerId::new(row.customer_id).map_err(corrupt_row)?,
            trainer_id: TrainerId::new(row.trainer_id).map_err(corrupt_row)?,
            status,
            price_id: row.price_id,
            tier_key: row.tier_key,
            current_period_end: row.current_period_end.map(Timestamp::from_datetime),
        })
    }
}

const SELECT_COLUMNS: &str = "subscription_id, customer_id, trainer_id, status, price_id, \
                              tier_key, current_period_end";

#[async_trait]
impl SubscriptionLedger for PostgresSubscriptionLedger {
    async fn upsert_subscription(&self, upsert: &SubscriptionUpsert) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO billing_subscriptions (
                subscription_id, customer_id, trainer_id, status,
                price_id, tier_key, current_period_end, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (subscription_id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                trainer_id = EXCLUDED.trainer_id,
                status = EXCLUDED.status,
                price_id = COALESCE(EXCLUDED.price_id, billing_subscriptions.price_id),
                tier_key = COALESCE(EXCLUDED.tier_key, billing_subscriptions.tier_key),
                current_period_end = COALESCE(
                    EXCLUDED.current_period_end,
                    billing_subscriptions.current_period_end
                ),
                updated_at = NOW()
            "#,
        )
        .bind(upsert.subscription_id.as_str())
        .bind(upsert.customer_id.as_str())
        .bind(upsert.trainer_id.as_str())
        .bind(upsert.status.as_str())
        .bind(&upsert.price_id)
        .bind(&upsert.tier_key)
        .bind(upsert.current_period_end.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(db_error("upsert subscription"))?;

        Ok(())
    }

    async fn find_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM billing_subscriptions WHERE subscription_id = $1",
            SELECT_COLUMNS
        ))
        .bind(subscription_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("load subscription"))?;

        row.map(SubscriptionRecord::try_from).transpose()
    }

    async fn find_active_subscription(
        &self,
        customer_id: &CustomerId,
        trainer_id: &TrainerId,
        statuses: &ActiveStatusSet,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        if statuses.is_empty() {
            return Ok(None);
        }

        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM billing_subscriptions
            WHERE customer_id = $1 AND trainer_id = $2 AND status = ANY($3)
            ORDER BY current_period_end DESC NULLS LAST, subscription_id DESC
            LIMIT 1
            "#,
            SELECT_COLUMNS
        ))
        .bind(customer_id.as_str())
        .bind(trainer_id.as_str())
        .bind(statuses.as_strs())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("find active subscription"))?;

        row.map(SubscriptionRecord::try_from).transpose()
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
