//! PostgreSQL implementation of CustomerRegistry.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::billing::CustomerRecord;
use crate::domain::foundation::{CustomerId, DomainError, PayerId, TrainerId};
use crate::ports::CustomerRegistry;

use super::{corrupt_row, db_error};

/// Customer mappings stored in `billing_customers`, keyed by customer id.
pub struct PostgresCustomerRegistry {
    pool: PgPool,
}

impl PostgresCustomerRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    customer_id: String,
    trainer_id: String,
    payer_id: String,
}

impl TryFrom<CustomerRow> for CustomerRecord {
    type Error = DomainError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        Ok(CustomerRecord {
            customer_id: CustomerId::new(row.customer_id).map_err(corrupt_row)?,
            trainer_id: TrainerId::new(row.trainer_id).map_err(corrupt_row)?,
            payer_id: PayerId::new(row.payer_id).map_err(corrupt_row)?,
        })
    }
}

#[async_trait]
impl CustomerRegistry for PostgresCustomerRegistry {
    async fn upsert_customer(&self, record: &CustomerRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO billing_customers (customer_id, trainer_id, payer_id, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (customer_id) DO UPDATE SET
                trainer_id = EXCLUDED.trainer_id,
                payer_id = EXCLUDED.payer_id,
                updated_at = NOW()
            "#,
        )
        .bind(record.customer_id.as_str())
        .bind(record.trainer_id.as_str())
        .bind(record.payer_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error("upsert billing customer"))?;

        Ok(())
    }

    async fn find_customer(
        &self,
        payer_id: &PayerId,
        trainer_id: &TrainerId,
    ) -> Result<Option<CustomerId>, DomainError> {
        let id: Option<String> = sqlx::query_scalar(
            r#"
            SELECT customer_id FROM billing_customers
            WHERE payer_id = $1 AND trainer_id = $2
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(payer_id.as_str())
        .bind(trainer_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("find billing customer"))?;

        id.map(|id| CustomerId::new(id).map_err(corrupt_row)).transpose()
    }

    async fn find_any_customer_for_trainer(
        &self,
        trainer_id: &TrainerId,
    ) -> Result<Option<CustomerId>, DomainError> {
        let id: Option<String> = sqlx::query_scalar(
            r#"
            SELECT customer_id FROM billing_customers
            WHERE trainer_id = $1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(trainer_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("find trainer billing customer"))?;

        id.map(|id| CustomerId::new(id).map_err(corrupt_row)).transpose()
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerRecord>, DomainError> {
        let row: Option<CustomerRow> = sqlx::query_as(
            r#"
            SELECT customer_id, trainer_id, payer_id
            FROM billing_customers
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("load billing customer"))?;

        row.map(CustomerRecord::try_from).transpose()
    }
}
