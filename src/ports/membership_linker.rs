//! Membership linker port.
//!
//! The only writer of the trainer → members set and the member → trainer
//! back-reference. Implementations must change both sides atomically: a
//! join-table insert/delete and the back-reference update share one
//! transaction, so concurrent links against one trainer cannot lose writes.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, PayerId, TrainerId};

/// What an unlink actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnlinkOutcome {
    /// The payer was in the trainer's member set.
    pub removed_from_trainer: bool,

    /// The payer's back-reference pointed at this trainer and was cleared.
    pub cleared_back_reference: bool,
}

#[async_trait]
pub trait MembershipLinker: Send + Sync {
    /// Add the payer to the trainer's members and point the payer at the trainer.
    ///
    /// Safe to repeat. Does not touch any other trainer's member set.
    async fn link(&self, trainer_id: &TrainerId, payer_id: &PayerId) -> Result<(), DomainError>;

    /// Remove the payer from the trainer's members. The back-reference is
    /// cleared only if it still names this trainer.
    async fn unlink(
        &self,
        trainer_id: &TrainerId,
        payer_id: &PayerId,
    ) -> Result<UnlinkOutcome, DomainError>;

    /// Current members of a trainer, in no particular order.
    async fn members_of(&self, trainer_id: &TrainerId) -> Result<Vec<PayerId>, DomainError>;

    /// The trainer a payer is currently linked to.
    async fn trainer_of(&self, payer_id: &PayerId) -> Result<Option<TrainerId>, DomainError>;
}
