//! In-memory membership linker.
//!
//! Both sides of the relation live behind one lock, so a link or unlink
//! is a single atomic step.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, PayerId, TrainerId};
use crate::ports::{MembershipLinker, UnlinkOutcome};

#[derive(Default)]
struct Relation {
    subs: HashMap<TrainerId, BTreeSet<PayerId>>,
    trainer_of: HashMap<PayerId, TrainerId>,
}

#[derive(Default)]
pub struct InMemoryMembershipLinker {
    relation: RwLock<Relation>,
}

impl InMemoryMembershipLinker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a trainer's member set without touching back-references,
    /// e.g. to model a stale entry left behind by a re-link elsewhere.
    pub fn with_members(mut self, trainer_id: TrainerId, payers: Vec<PayerId>) -> Self {
        self.relation
            .get_mut()
            .subs
            .entry(trainer_id)
            .or_default()
            .extend(payers);
        self
    }

    /// Seed a back-reference directly.
    pub fn with_back_reference(mut self, payer_id: PayerId, trainer_id: TrainerId) -> Self {
        self.relation.get_mut().trainer_of.insert(payer_id, trainer_id);
        self
    }
}

#[async_trait]
impl MembershipLinker for InMemoryMembershipLinker {
    async fn link(&self, trainer_id: &TrainerId, payer_id: &PayerId) -> Result<(), DomainError> {
        let mut relation = self.relation.write().await;
        relation
            .subs
            .entry(trainer_id.clone())
            .or_default()
            .insert(payer_id.clone());
        relation
            .trainer_of
            .insert(payer_id.clone(), trainer_id.clone());
        Ok(())
    }

    async fn unlink(
        &self,
        trainer_id: &TrainerId,
        payer_id: &PayerId,
    ) -> Result<UnlinkOutcome, DomainError> {
        let mut relation = self.relation.write().await;

        let removed_from_trainer = relation
            .subs
            .get_mut(trainer_id)
            .map(|members| members.remove(payer_id))
            .unwrap_or(false);

        let cleared_back_reference = relation.trainer_of.get(payer_id) == Some(trainer_id);
        if cleared_back_reference {
            relation.trainer_of.remove(payer_id);
        }

        Ok(UnlinkOutcome {
            removed_from_trainer,
            cleared_back_reference,
        })
    }

    async fn members_of(&self, trainer_id: &TrainerId) -> Result<Vec<PayerId>, DomainError> {
        let relation = self.relation.read().await;
        Ok(relation
            .subs
            .get(trainer_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn trainer_of(&self, payer_id: &PayerId) -> Result<Option<TrainerId>, DomainError> {
        Ok(self.relation.read().await.trainer_of.get(payer_id).cloned())
    }
}
