//! Customer registry port.
//!
//! Maps a (payer, trainer) pair to the billing-platform customer created
//! for it. Rows are only ever upserted, never deleted.

use async_trait::async_trait;

use crate::domain::billing::CustomerRecord;
use crate::domain::foundation::{CustomerId, DomainError, PayerId, TrainerId};

/// Repository port for billing customers.
#[async_trait]
pub trait CustomerRegistry: Send + Sync {
    /// Insert or update keyed on `customer_id`; last writer wins for the
    /// trainer and payer columns. Re-upserting identical values is a no-op.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` on persistence failure
    async fn upsert_customer(&self, record: &CustomerRecord) -> Result<(), DomainError>;

    /// The customer created for this payer with this trainer.
    ///
    /// When more than one row matches, the most recently written wins.
    async fn find_customer(
        &self,
        payer_id: &PayerId,
        trainer_id: &TrainerId,
    ) -> Result<Option<CustomerId>, DomainError>;

    /// Any customer attached to the trainer, for legacy rows written
    /// before payer ids were recorded.
    async fn find_any_customer_for_trainer(
        &self,
        trainer_id: &TrainerId,
    ) -> Result<Option<CustomerId>, DomainError>;

    /// Full record by customer id; the only key available at cancellation.
    async fn find_by_customer_id(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerRecord>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_registry_is_object_safe() {
        fn _accepts_dyn(_registry: &dyn CustomerRegistry) {}
    }
}
