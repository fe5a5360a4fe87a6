//! KickMemberHandler - a trainer removes a paying member.

use std::sync::Arc;

use crate::domain::billing::{ActiveStatusSet, BillingError};
use crate::domain::foundation::{AuthenticatedUser, PayerId, SubscriptionId, TrainerId};
use crate::ports::{BillingProvider, CustomerRegistry, PaymentErrorCode, SubscriptionLedger};

use super::outcome::FailurePolicy;
use super::unlink::{UnlinkEngine, UnlinkReport, UnlinkTarget};

#[derive(Debug, Clone)]
pub struct KickMemberCommand {
    pub caller: AuthenticatedUser,
    pub trainer_id: TrainerId,
    pub payer_id: PayerId,

    /// Cancel now instead of at the end of the paid period.
    pub immediate: bool,
}

#[derive(Debug, Clone)]
pub struct KickMemberResult {
    pub subscription_id: Option<SubscriptionId>,
    /// Whether a cancellation was sent to the billing platform.
    pub canceled_upstream: bool,
    pub report: UnlinkReport,
}

/// Handler for removing a member.
///
/// The ledger row is marked canceled and the relation removed immediately,
/// even when the upstream cancellation only takes effect at period end.
/// Reconciliation keeps such a member unlinked until the platform's final
/// `customer.subscription.deleted` arrives.
pub struct KickMemberHandler {
    registry: Arc<dyn CustomerRegistry>,
    ledger: Arc<dyn SubscriptionLedger>,
    provider: Arc<dyn BillingProvider>,
    unlink: UnlinkEngine,
    active_statuses: ActiveStatusSet,
}

impl KickMemberHandler {
    pub fn new(
        registry: Arc<dyn CustomerRegistry>,
        ledger: Arc<dyn SubscriptionLedger>,
        provider: Arc<dyn BillingProvider>,
        unlink: UnlinkEngine,
    ) -> Self {
        Self {
            registry,
            ledger,
            provider,
            unlink,
            active_statuses: ActiveStatusSet::default(),
        }
    }

    pub fn with_active_statuses(mut self, statuses: ActiveStatusSet) -> Self {
        self.active_statuses = statuses;
        self
    }

    pub async fn handle(&self, cmd: KickMemberCommand) -> Result<KickMemberResult, BillingError> {
        // 1. Only the trainer may kick their members
        if !cmd.trainer_id.is_user(&cmd.caller.id) {
            return Err(BillingError::Forbidden);
        }

        // 2. Find the member's live subscription, if any
        let customer_id = self
            .registry
            .find_customer(&cmd.payer_id, &cmd.trainer_id)
            .await?;
        let subscription_id = match &customer_id {
            Some(customer_id) => self
                .ledger
                .find_active_subscription(customer_id, &cmd.trainer_id, &self.active_statuses)
                .await?
                .map(|row| row.subscription_id),
            None => None,
        };

        // 3. Cancel upstream
        let mut canceled_upstream = false;
        if let Some(subscription_id) = subscription_id.as_ref().filter(|id| !id.is_local()) {
            match self
                .provider
                .cancel_subscription(subscription_id, !cmd.immediate)
                .await
            {
                Ok(_) => canceled_upstream = true,
                Err(e) if e.code == PaymentErrorCode::NotFound => {
                    tracing::warn!(
                        subscription_id = %subscription_id,
                        "Subscription already gone upstream"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        // 4. Cancel locally and unlink
        let mut target = UnlinkTarget::membership(cmd.trainer_id.clone(), cmd.payer_id.clone());
        if let Some(customer_id) = customer_id {
            target = target.with_subscription(customer_id, subscription_id.clone());
        }
        let report = self.unlink.unlink(target, FailurePolicy::Strict).await?;

        tracing::info!(
            trainer_id = %cmd.trainer_id,
            payer_id = %cmd.payer_id,
            immediate = cmd.immediate,
            canceled_upstream,
            "Member kicked"
        );

        Ok(KickMemberResult {
            subscription_id,
            canceled_upstream,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryCustomerRegistry, InMemoryMembershipLinker, InMemorySubscriptionLedger,
    };
    use crate::adapters::stripe::MockBillingProvider;
    use crate::domain::billing::{CustomerRecord, SubscriptionRecord, SubscriptionStatus};
    use crate::domain::foundation::{CustomerId, UserId};
    use crate::ports::MembershipLinker;

    fn trainer(id: &str) -> TrainerId {
        TrainerId::new(id).unwrap()
    }

    fn payer(id: &str) -> PayerId {
        PayerId::new(id).unwrap()
    }

    fn customer(id: &str) -> CustomerId {
        CustomerId::new(id).unwrap()
    }

    fn sub(id: &str) -> SubscriptionId {
        SubscriptionId::new(id).unwrap()
    }

    struct Fixture {
        provider: MockBillingProvider,
        ledger: Arc<InMemorySubscriptionLedger>,
        linker: Arc<InMemoryMembershipLinker>,
        handler: KickMemberHandler,
    }

    async fn fixture() -> Fixture {
        let provider = MockBillingProvider::with_active_subscription(customer("cus_1"), sub("sub_1"));
        let registry = Arc::new(InMemoryCustomerRegistry::new());
        registry
            .upsert_customer(&CustomerRecord::new(customer("cus_1"), trainer("T1"), payer("U1")))
            .await
            .unwrap();
        let ledger = Arc::new(InMemorySubscriptionLedger::new().with_record(SubscriptionRecord {
            subscription_id: sub("sub_1"),
            customer_id: customer("cus_1"),
            trainer_id: trainer("T1"),
            status: SubscriptionStatus::Active,
            price_id: None,
            tier_key: Some("basic".to_string()),
            current_period_end: None,
        }));
        let linker = Arc::new(
            InMemoryMembershipLinker::new()
                .with_members(trainer("T1"), vec![payer("U1")])
                .with_back_reference(payer("U1"), trainer("T1")),
        );
        let unlink = UnlinkEngine::new(registry.clone(), ledger.clone(), linker.clone());
        let handler = KickMemberHandler::new(
            registry,
            ledger.clone(),
            Arc::new(provider.clone()),
            unlink,
        );
        Fixture {
            provider,
            ledger,
            linker,
            handler,
        }
    }

    fn cmd(caller: &str, immediate: bool) -> KickMemberCommand {
        KickMemberCommand {
            caller: AuthenticatedUser::new(UserId::new(caller).unwrap(), None),
            trainer_id: trainer("T1"),
            payer_id: payer("U1"),
            immediate,
        }
    }

    #[tokio::test]
    async fn deferred_kick_cancels_at_period_end_and_unlinks_now() {
        let f = fixture().await;

        let result = f.handler.handle(cmd("T1", false)).await.unwrap();

        assert!(result.canceled_upstream);
        let upstream = f.provider.subscription(&sub("sub_1")).unwrap();
        assert!(upstream.cancel_at_period_end);
        assert_eq!(upstream.status, SubscriptionStatus::Active);

        let row = f.ledger.find_subscription(&sub("sub_1")).await.unwrap().unwrap();
        assert_eq!(row.status, SubscriptionStatus::Canceled);
        assert!(f.linker.members_of(&trainer("T1")).await.unwrap().is_empty());
        assert_eq!(f.linker.trainer_of(&payer("U1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn immediate_kick_cancels_upstream_now() {
        let f = fixture().await;

        f.handler.handle(cmd("T1", true)).await.unwrap();

        let upstream = f.provider.subscription(&sub("sub_1")).unwrap();
        assert_eq!(upstream.status, SubscriptionStatus::Canceled);
    }

    #[tokio::test]
    async fn only_the_trainer_may_kick() {
        let f = fixture().await;

        let err = f.handler.handle(cmd("U5", false)).await.unwrap_err();

        assert!(matches!(err, BillingError::Forbidden));
        assert!(!f.provider.was_called("cancel_subscription"));
        assert_eq!(f.linker.members_of(&trainer("T1")).await.unwrap(), vec![payer("U1")]);
    }

    #[tokio::test]
    async fn member_without_subscription_is_still_unlinked() {
        let f = fixture().await;
        let mut command = cmd("T1", false);
        command.payer_id = payer("U2");
        f.linker.link(&trainer("T1"), &payer("U2")).await.unwrap();

        let result = f.handler.handle(command).await.unwrap();

        assert!(!result.canceled_upstream);
        assert!(result.subscription_id.is_none());
        assert!(result.report.outcome.removed_from_trainer);
    }

    #[tokio::test]
    async fn upstream_not_found_still_cancels_locally() {
        let f = fixture().await;
        f.provider.set_method_error(
            "cancel_subscription",
            crate::ports::PaymentError::not_found("Subscription"),
        );

        let result = f.handler.handle(cmd("T1", false)).await.unwrap();

        assert!(!result.canceled_upstream);
        assert!(result.report.marked_canceled);
    }

    #[tokio::test]
    async fn upstream_failure_aborts_kick() {
        let f = fixture().await;
        f.provider.set_method_error(
            "cancel_subscription",
            crate::ports::PaymentError::network("reset"),
        );

        let err = f.handler.handle(cmd("T1", false)).await.unwrap_err();

        assert!(matches!(err, BillingError::UpstreamBilling(_)));
        assert_eq!(f.linker.members_of(&trainer("T1")).await.unwrap(), vec![payer("U1")]);
    }
}
