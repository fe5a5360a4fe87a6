//! FinalizeCheckoutHandler - reconciles a completed checkout synchronously
//! when the payer returns to the app, ahead of the webhook.

use std::sync::Arc;

use crate::domain::billing::{BillingError, PayerHint, SubscriptionStatus};
use crate::domain::foundation::{AuthenticatedUser, PayerId, SubscriptionId, TrainerId};
use crate::ports::BillingProvider;

use super::outcome::FailurePolicy;
use super::reconcile::{BillingSignal, ReconciliationEngine, SnapshotSource};

/// Command to finalize a checkout session.
#[derive(Debug, Clone)]
pub struct FinalizeCheckoutCommand {
    pub caller: AuthenticatedUser,
    pub trainer_id: TrainerId,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeCheckoutResult {
    pub trainer_id: TrainerId,
    pub payer_id: PayerId,
    pub subscription_id: Option<SubscriptionId>,
    pub status: Option<SubscriptionStatus>,
}

/// Handler for finalizing checkouts.
///
/// Ownership is checked before anything is written: the session must carry
/// this trainer's id, and when it records a payer that payer must be the
/// caller.
pub struct FinalizeCheckoutHandler {
    provider: Arc<dyn BillingProvider>,
    reconciler: ReconciliationEngine,
}

impl FinalizeCheckoutHandler {
    pub fn new(provider: Arc<dyn BillingProvider>, reconciler: ReconciliationEngine) -> Self {
        Self {
            provider,
            reconciler,
        }
    }

    pub async fn handle(
        &self,
        cmd: FinalizeCheckoutCommand,
    ) -> Result<FinalizeCheckoutResult, BillingError> {
        if cmd.session_id.trim().is_empty() {
            return Err(BillingError::Validation("session_id is required".to_string()));
        }

        // 1. Retrieve the session with subscription expanded
        let session = self
            .provider
            .retrieve_checkout_session(&cmd.session_id)
            .await?
            .ok_or_else(|| BillingError::not_found("checkout session"))?;

        // 2. Ownership checks
        if session.trainer_id.as_ref() != Some(&cmd.trainer_id) {
            tracing::warn!(
                session_id = %session.id,
                trainer_id = %cmd.trainer_id,
                "Checkout finalize for wrong trainer"
            );
            return Err(BillingError::TrainerMismatch);
        }

        let caller = cmd.caller.as_payer();
        if let Some(payer_id) = &session.payer_id {
            if payer_id != &caller {
                tracing::warn!(
                    session_id = %session.id,
                    caller = %caller,
                    "Checkout finalize by someone other than the payer"
                );
                return Err(BillingError::PayerMismatch);
            }
        }

        // 3. Session must be complete and carry a customer
        if !session.complete {
            return Err(BillingError::CheckoutIncomplete(session.id));
        }
        let customer_id = session
            .customer_id
            .clone()
            .ok_or_else(|| BillingError::CheckoutIncomplete(session.id.clone()))?;

        // 4. Reconcile with the expanded subscription when present
        let (subscription_id, snapshot) = match session.subscription {
            Some(snapshot) => (
                Some(snapshot.subscription_id.clone()),
                SnapshotSource::Known(snapshot),
            ),
            None => (None, SnapshotSource::Live),
        };

        let signal = BillingSignal {
            customer_id: customer_id.clone(),
            subscription_id,
            trainer_id: cmd.trainer_id.clone(),
            payer: PayerHint::new()
                .with_explicit(session.payer_id)
                .with_email(session.customer_email)
                .with_customer(customer_id)
                .with_caller(caller),
            tier_key: session.tier_key,
            snapshot,
        };

        let outcome = self.reconciler.reconcile(signal, FailurePolicy::Strict).await?;

        tracing::info!(
            session_id = %cmd.session_id,
            trainer_id = %cmd.trainer_id,
            payer_id = %outcome.payer_id,
            "Checkout finalized"
        );

        Ok(FinalizeCheckoutResult {
            trainer_id: cmd.trainer_id,
            payer_id: outcome.payer_id,
            subscription_id: outcome.subscription_id,
            status: outcome.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryCustomerRegistry, InMemoryMembershipLinker, InMemoryPayerDirectory,
        InMemorySubscriptionLedger,
    };
    use crate::adapters::stripe::MockBillingProvider;
    use crate::application::handlers::billing::PayerResolver;
    use crate::domain::billing::SubscriptionSnapshot;
    use crate::domain::foundation::{CustomerId, UserId};
    use crate::ports::{CheckoutSessionDetails, CustomerRegistry, MembershipLinker, SubscriptionLedger};

    fn trainer(id: &str) -> TrainerId {
        TrainerId::new(id).unwrap()
    }

    fn customer(id: &str) -> CustomerId {
        CustomerId::new(id).unwrap()
    }

    fn caller(id: &str) -> AuthenticatedUser {
        AuthenticatedUser::new(UserId::new(id).unwrap(), Some(format!("{}@example.com", id)))
    }

    struct Fixture {
        provider: MockBillingProvider,
        registry: Arc<InMemoryCustomerRegistry>,
        ledger: Arc<InMemorySubscriptionLedger>,
        linker: Arc<InMemoryMembershipLinker>,
        handler: FinalizeCheckoutHandler,
    }

    fn fixture() -> Fixture {
        let provider = MockBillingProvider::new();
        let registry = Arc::new(InMemoryCustomerRegistry::new());
        let ledger = Arc::new(InMemorySubscriptionLedger::new());
        let linker = Arc::new(InMemoryMembershipLinker::new());
        let provider_port: Arc<dyn BillingProvider> = Arc::new(provider.clone());
        let reconciler = ReconciliationEngine::new(
            PayerResolver::new(Arc::new(InMemoryPayerDirectory::new()), provider_port.clone()),
            registry.clone(),
            ledger.clone(),
            linker.clone(),
            provider_port.clone(),
        );
        Fixture {
            provider,
            registry,
            ledger,
            linker,
            handler: FinalizeCheckoutHandler::new(provider_port, reconciler),
        }
    }

    fn session(trainer_id: &str, payer_id: Option<&str>, complete: bool) -> CheckoutSessionDetails {
        CheckoutSessionDetails {
            id: "cs_1".to_string(),
            complete,
            customer_id: Some(customer("cus_1")),
            customer_email: Some("U1@example.com".to_string()),
            trainer_id: Some(trainer(trainer_id)),
            payer_id: payer_id.map(|p| PayerId::new(p).unwrap()),
            tier_key: Some("basic".to_string()),
            subscription: Some(SubscriptionSnapshot::new(
                SubscriptionId::new("sub_1").unwrap(),
                customer("cus_1"),
                SubscriptionStatus::Active,
            )),
        }
    }

    fn cmd(trainer_id: &str, caller_id: &str) -> FinalizeCheckoutCommand {
        FinalizeCheckoutCommand {
            caller: caller(caller_id),
            trainer_id: trainer(trainer_id),
            session_id: "cs_1".to_string(),
        }
    }

    async fn nothing_written(f: &Fixture) -> bool {
        f.registry.is_empty().await
            && f.ledger.all().await.is_empty()
            && f.linker.members_of(&trainer("T1")).await.unwrap().is_empty()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Success Cases
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn completed_session_is_reconciled() {
        let f = fixture();
        f.provider.add_checkout_session(session("T1", Some("U1"), true));

        let result = f.handler.handle(cmd("T1", "U1")).await.unwrap();

        assert_eq!(result.payer_id, PayerId::new("U1").unwrap());
        assert_eq!(result.status, Some(SubscriptionStatus::Active));
        assert!(!f.provider.was_called("get_subscription"));
        assert_eq!(
            f.linker.trainer_of(&result.payer_id).await.unwrap(),
            Some(trainer("T1"))
        );
        let record = f.registry.find_by_customer_id(&customer("cus_1")).await.unwrap().unwrap();
        assert_eq!(record.trainer_id, trainer("T1"));
    }

    #[tokio::test]
    async fn session_without_payer_metadata_resolves_to_caller() {
        let f = fixture();
        f.provider.add_checkout_session(session("T1", None, true));

        let result = f.handler.handle(cmd("T1", "U7")).await.unwrap();

        assert_eq!(result.payer_id, PayerId::new("U7").unwrap());
    }

    #[tokio::test]
    async fn customer_only_session_gets_local_subscription() {
        let f = fixture();
        let mut details = session("T1", Some("U1"), true);
        details.subscription = None;
        f.provider.add_checkout_session(details);

        let result = f.handler.handle(cmd("T1", "U1")).await.unwrap();

        assert!(result.subscription_id.unwrap().is_local());
    }

    #[tokio::test]
    async fn finalize_twice_is_harmless() {
        let f = fixture();
        f.provider.add_checkout_session(session("T1", Some("U1"), true));

        f.handler.handle(cmd("T1", "U1")).await.unwrap();
        f.handler.handle(cmd("T1", "U1")).await.unwrap();

        assert_eq!(f.registry.len().await, 1);
        assert_eq!(f.ledger.all().await.len(), 1);
        assert_eq!(f.linker.members_of(&trainer("T1")).await.unwrap().len(), 1);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Rejections
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn wrong_trainer_is_rejected_without_writes() {
        let f = fixture();
        f.provider.add_checkout_session(session("T1", Some("U1"), true));

        let err = f.handler.handle(cmd("T2", "U1")).await.unwrap_err();

        assert!(matches!(err, BillingError::TrainerMismatch));
        assert!(nothing_written(&f).await);
    }

    #[tokio::test]
    async fn wrong_payer_is_rejected_without_writes() {
        let f = fixture();
        f.provider.add_checkout_session(session("T1", Some("U1"), true));

        let err = f.handler.handle(cmd("T1", "U2")).await.unwrap_err();

        assert!(matches!(err, BillingError::PayerMismatch));
        assert!(nothing_written(&f).await);
    }

    #[tokio::test]
    async fn incomplete_session_is_rejected() {
        let f = fixture();
        f.provider.add_checkout_session(session("T1", Some("U1"), false));

        let err = f.handler.handle(cmd("T1", "U1")).await.unwrap_err();

        assert!(matches!(err, BillingError::CheckoutIncomplete(ref id) if id == "cs_1"));
        assert!(nothing_written(&f).await);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let f = fixture();

        let err = f.handler.handle(cmd("T1", "U1")).await.unwrap_err();

        assert!(matches!(err, BillingError::NotFound(_)));
    }

    #[tokio::test]
    async fn blank_session_id_is_invalid() {
        let f = fixture();
        let mut command = cmd("T1", "U1");
        command.session_id = "  ".to_string();

        let err = f.handler.handle(command).await.unwrap_err();

        assert!(matches!(err, BillingError::Validation(_)));
        assert!(!f.provider.was_called("retrieve_checkout_session"));
    }
}
