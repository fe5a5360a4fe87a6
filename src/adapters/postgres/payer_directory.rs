//! PostgreSQL implementation of PayerDirectory over the `payers` table.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::billing::normalize_email;
use crate::domain::foundation::{DomainError, PayerId};
use crate::ports::PayerDirectory;

use super::{corrupt_row, db_error};

pub struct PostgresPayerDirectory {
    pool: PgPool,
}

impl PostgresPayerDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PayerDirectory for PostgresPayerDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<PayerId>, DomainError> {
        let Some(email) = normalize_email(email) else {
            return Ok(None);
        };

        let id: Option<String> = sqlx::query_scalar(
            "SELECT id FROM payers WHERE LOWER(email) = $1 ORDER BY id LIMIT 1",
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("find payer by email"))?;

        id.map(|id| PayerId::new(id).map_err(corrupt_row)).transpose()
    }

    async fn email_for(&self, payer_id: &PayerId) -> Result<Option<String>, DomainError> {
        let email: Option<Option<String>> =
            sqlx::query_scalar("SELECT email FROM payers WHERE id = $1")
                .bind(payer_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("load payer email"))?;

        Ok(email.flatten().and_then(|e| normalize_email(&e)))
    }
}
