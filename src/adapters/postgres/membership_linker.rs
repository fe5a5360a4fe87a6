//! PostgreSQL implementation of MembershipLinker.
//!
//! The trainer→members set is the `trainer_members` join table and the
//! back-reference is `payers.trainer_id`. Each operation touches both inside
//! one transaction, so concurrent links for the same trainer cannot lose
//! each other's writes.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, PayerId, TrainerId};
use crate::ports::{MembershipLinker, UnlinkOutcome};

use super::{corrupt_row, db_error};

pub struct PostgresMembershipLinker {
    pool: PgPool,
}

impl PostgresMembershipLinker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipLinker for PostgresMembershipLinker {
    async fn link(&self, trainer_id: &TrainerId, payer_id: &PayerId) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin link"))?;

        sqlx::query(
            r#"
            INSERT INTO trainer_members (trainer_id, payer_id)
            VALUES ($1, $2)
            ON CONFLICT (trainer_id, payer_id) DO NOTHING
            "#,
        )
        .bind(trainer_id.as_str())
        .bind(payer_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_error("add trainer member"))?;

        sqlx::query(
            r#"
            INSERT INTO payers (id, trainer_id)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET trainer_id = EXCLUDED.trainer_id
            "#,
        )
        .bind(payer_id.as_str())
        .bind(trainer_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_error("set payer trainer"))?;

        tx.commit().await.map_err(db_error("commit link"))?;
        Ok(())
    }

    async fn unlink(
        &self,
        trainer_id: &TrainerId,
        payer_id: &PayerId,
    ) -> Result<UnlinkOutcome, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin unlink"))?;

        let removed = sqlx::query(
            "DELETE FROM trainer_members WHERE trainer_id = $1 AND payer_id = $2",
        )
        .bind(trainer_id.as_str())
        .bind(payer_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_error("remove trainer member"))?;

        // Guarded: a payer who has moved on keeps their new trainer.
        let cleared = sqlx::query(
            "UPDATE payers SET trainer_id = NULL WHERE id = $2 AND trainer_id = $1",
        )
        .bind(trainer_id.as_str())
        .bind(payer_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_error("clear payer trainer"))?;

        tx.commit().await.map_err(db_error("commit unlink"))?;

        Ok(UnlinkOutcome {
            removed_from_trainer: removed.rows_affected() > 0,
            cleared_back_reference: cleared.rows_affected() > 0,
        })
    }

    async fn members_of(&self, trainer_id: &TrainerId) -> Result<Vec<PayerId>, DomainError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT payer_id FROM trainer_members WHERE trainer_id = $1 ORDER BY payer_id",
        )
        .bind(trainer_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list trainer members"))?;

        ids.into_iter()
            .map(|id| PayerId::new(id).map_err(corrupt_row))
            .collect()
    }

    async fn trainer_of(&self, payer_id: &PayerId) -> Result<Option<TrainerId>, DomainError> {
        let id: Option<Option<String>> =
            sqlx::query_scalar("SELECT trainer_id FROM payers WHERE id = $1")
                .bind(payer_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("load payer trainer"))?;

        id.flatten()
            .map(|id| TrainerId::new(id).map_err(corrupt_row))
            .transpose()
    }
}
