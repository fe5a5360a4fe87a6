//! End-to-end reconciliation flows over the in-memory adapters.
//!
//! Each test drives the billing handlers the way the HTTP layer does and
//! then inspects all three stores: customer registry, subscription ledger
//! and the trainer/member links.

use std::sync::Arc;

use serde_json::json;

use trainer_billing::adapters::http::BillingAppState;
use trainer_billing::adapters::memory::{
    InMemoryCustomerRegistry, InMemoryMembershipLinker, InMemoryPayerDirectory,
    InMemorySubscriptionLedger, InMemoryTierCatalog, InMemoryWebhookEventRepository,
};
use trainer_billing::adapters::stripe::MockBillingProvider;
use trainer_billing::application::handlers::billing::{
    CreateCheckoutCommand, FinalizeCheckoutCommand, HandleBillingWebhookCommand,
    KickMemberCommand, OpenPortalCommand, WebhookAck,
};
use trainer_billing::domain::billing::{
    BillingError, CustomerRecord, SubscriptionSnapshot, SubscriptionStatus,
};
use trainer_billing::domain::foundation::{
    AuthenticatedUser, CustomerId, PayerId, SubscriptionId, TrainerId, UserId,
};
use trainer_billing::ports::{
    CheckoutSessionDetails, CustomerRegistry, MembershipLinker, SubscriptionLedger,
    WebhookEventRepository, WebhookEventResult,
};

// =============================================================================
// Test Infrastructure
// =============================================================================

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

fn user(id: &str) -> AuthenticatedUser {
    AuthenticatedUser::new(
        UserId::new(id).unwrap(),
        Some(format!("{}@example.com", id.to_lowercase())),
    )
}

struct Harness {
    registry: Arc<InMemoryCustomerRegistry>,
    ledger: Arc<InMemorySubscriptionLedger>,
    linker: Arc<InMemoryMembershipLinker>,
    events: Arc<InMemoryWebhookEventRepository>,
    provider: MockBillingProvider,
    state: BillingAppState,
}

impl Harness {
    fn new() -> Self {
        let registry = Arc::new(InMemoryCustomerRegistry::new());
        let ledger = Arc::new(InMemorySubscriptionLedger::new());
        let linker = Arc::new(InMemoryMembershipLinker::new());
        let events = Arc::new(InMemoryWebhookEventRepository::new());
        let provider = MockBillingProvider::new();
        let state = BillingAppState {
            tiers: Arc::new(
                InMemoryTierCatalog::new()
                    .with_tier(trainer("T1"), "plus", "price_plus")
                    .with_tier(trainer("T2"), "plus", "price_t2_plus"),
            ),
            registry: registry.clone(),
            ledger: ledger.clone(),
            linker: linker.clone(),
            directory: Arc::new(
                InMemoryPayerDirectory::new().with_payer(payer("U1"), "u1@example.com"),
            ),
            events: events.clone(),
            provider: Arc::new(provider.clone()),
        };
        Self {
            registry,
            ledger,
            linker,
            events,
            provider,
            state,
        }
    }

    async fn deliver(&self, event: serde_json::Value) -> WebhookAck {
        self.state
            .webhook_handler()
            .handle(HandleBillingWebhookCommand {
                payload: serde_json::to_vec(&event).unwrap(),
                signature: "t=1,v1=00".to_string(),
            })
            .await
            .unwrap()
    }

    async fn status_of(&self, id: &str) -> Option<SubscriptionStatus> {
        self.ledger
            .find_subscription(&sub(id))
            .await
            .unwrap()
            .map(|row| row.status)
    }

    async fn members_of(&self, id: &str) -> Vec<PayerId> {
        self.linker.members_of(&trainer(id)).await.unwrap()
    }

    async fn trainer_of(&self, id: &str) -> Option<TrainerId> {
        self.linker.trainer_of(&payer(id)).await.unwrap()
    }
}

fn checkout_completed(event_id: &str, trainer_id: &str, customer_id: &str, sub_id: &str) -> serde_json::Value {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "created": 1_706_745_600,
        "livemode": false,
        "data": {
            "object": {
                "id": format!("cs_{}", event_id),
                "customer": customer_id,
                "subscription": sub_id,
                "status": "complete",
                "payment_status": "paid",
                "mode": "subscription",
                "metadata": {
                    "trainer_id": trainer_id,
                    "tier_key": "plus",
                    "user_id": "U1"
                }
            }
        }
    })
}

fn subscription_event(event_id: &str, kind: &str, sub_id: &str, customer_id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": event_id,
        "type": format!("customer.subscription.{}", kind),
        "created": 1_706_745_700,
        "data": {
            "object": {
                "id": sub_id,
                "customer": customer_id,
                "status": status,
                "items": { "data": [ { "price": { "id": "price_plus" } } ] }
            }
        }
    })
}

/// U1 subscribed to T1 through a completed checkout webhook.
async fn subscribed() -> Harness {
    let h = Harness::new();
    h.provider.add_subscription(SubscriptionSnapshot::new(
        sub("sub_1"),
        customer("cus_1"),
        SubscriptionStatus::Active,
    ));
    let ack = h.deliver(checkout_completed("evt_1", "T1", "cus_1", "sub_1")).await;
    assert_eq!(ack, WebhookAck::Processed { event_id: "evt_1".to_string() });
    h
}

// =============================================================================
// Checkout and cancellation
// =============================================================================

#[tokio::test]
async fn checkout_completed_writes_registry_ledger_and_links() {
    let h = subscribed().await;

    let record = h.registry.find_by_customer_id(&customer("cus_1")).await.unwrap().unwrap();
    assert_eq!(record.payer_id, payer("U1"));
    assert_eq!(record.trainer_id, trainer("T1"));

    let row = h.ledger.find_subscription(&sub("sub_1")).await.unwrap().unwrap();
    assert_eq!(row.status, SubscriptionStatus::Active);
    assert_eq!(row.tier_key.as_deref(), Some("plus"));

    assert_eq!(h.members_of("T1").await, vec![payer("U1")]);
    assert_eq!(h.trainer_of("U1").await, Some(trainer("T1")));

    let stored = h.events.find_by_event_id("evt_1").await.unwrap().unwrap();
    assert_eq!(stored.result, WebhookEventResult::Success);
}

#[tokio::test]
async fn replayed_delivery_is_deduplicated() {
    let h = subscribed().await;

    let ack = h.deliver(checkout_completed("evt_1", "T1", "cus_1", "sub_1")).await;

    assert_eq!(ack, WebhookAck::AlreadyProcessed { event_id: "evt_1".to_string() });
    assert_eq!(h.provider.call_count("get_subscription"), 1);
}

#[tokio::test]
async fn reprocessing_the_same_checkout_converges() {
    let h = subscribed().await;

    // A second platform event describing the same checkout.
    let ack = h.deliver(checkout_completed("evt_1b", "T1", "cus_1", "sub_1")).await;

    assert_eq!(ack, WebhookAck::Processed { event_id: "evt_1b".to_string() });
    assert_eq!(h.members_of("T1").await, vec![payer("U1")]);
    assert_eq!(h.registry.len().await, 1);
    assert_eq!(h.status_of("sub_1").await, Some(SubscriptionStatus::Active));
}

#[tokio::test]
async fn replayed_updates_converge_on_live_state() {
    let h = subscribed().await;
    let mut past_due = SubscriptionSnapshot::new(sub("sub_1"), customer("cus_1"), SubscriptionStatus::PastDue);
    past_due.price_id = Some("price_plus".to_string());
    h.provider.add_subscription(past_due);

    for event_id in ["evt_u1", "evt_u2", "evt_u3"] {
        let ack = h
            .deliver(subscription_event(event_id, "updated", "sub_1", "cus_1", "past_due"))
            .await;
        assert!(matches!(ack, WebhookAck::Processed { .. }));
    }

    assert_eq!(h.status_of("sub_1").await, Some(SubscriptionStatus::PastDue));
    assert_eq!(h.members_of("T1").await, vec![payer("U1")]);
}

#[tokio::test]
async fn subscription_deleted_removes_both_sides() {
    let h = subscribed().await;

    let ack = h
        .deliver(subscription_event("evt_del", "deleted", "sub_1", "cus_1", "canceled"))
        .await;

    assert_eq!(ack, WebhookAck::Processed { event_id: "evt_del".to_string() });
    assert_eq!(h.status_of("sub_1").await, Some(SubscriptionStatus::Canceled));
    assert!(h.members_of("T1").await.is_empty());
    assert_eq!(h.trainer_of("U1").await, None);
}

#[tokio::test]
async fn stale_update_after_delete_follows_live_state() {
    let h = subscribed().await;
    h.provider.add_subscription(SubscriptionSnapshot::new(
        sub("sub_1"),
        customer("cus_1"),
        SubscriptionStatus::Canceled,
    ));

    h.deliver(subscription_event("evt_del", "deleted", "sub_1", "cus_1", "canceled"))
        .await;
    // Delivered late, still carrying the old status and items without ids.
    let ack = h
        .deliver(subscription_event("evt_old", "updated", "sub_1", "cus_1", "active"))
        .await;

    assert_eq!(ack, WebhookAck::Processed { event_id: "evt_old".to_string() });
    assert_eq!(h.status_of("sub_1").await, Some(SubscriptionStatus::Canceled));
    assert!(h.members_of("T1").await.is_empty());
    assert_eq!(h.trainer_of("U1").await, None);
}

#[tokio::test]
async fn terminal_update_unlinks_without_rewriting_status() {
    let h = subscribed().await;
    h.provider.add_subscription(SubscriptionSnapshot::new(
        sub("sub_1"),
        customer("cus_1"),
        SubscriptionStatus::IncompleteExpired,
    ));

    h.deliver(subscription_event("evt_exp", "updated", "sub_1", "cus_1", "incomplete_expired"))
        .await;

    assert_eq!(h.status_of("sub_1").await, Some(SubscriptionStatus::IncompleteExpired));
    assert!(h.members_of("T1").await.is_empty());
}

// =============================================================================
// Failures and the dead-letter trail
// =============================================================================

#[tokio::test]
async fn unprocessable_event_is_acked_and_recorded_as_failed() {
    let h = Harness::new();
    h.provider.add_subscription(SubscriptionSnapshot::new(
        sub("sub_9"),
        customer("cus_9"),
        SubscriptionStatus::Active,
    ));

    let ack = h
        .deliver(subscription_event("evt_f", "updated", "sub_9", "cus_9", "active"))
        .await;

    assert!(matches!(ack, WebhookAck::Failed { ref error, .. } if error.contains("cus_9")));
    let stored = h.events.find_by_event_id("evt_f").await.unwrap().unwrap();
    assert_eq!(stored.result, WebhookEventResult::Failed);
    assert!(h.members_of("T1").await.is_empty());
}

#[tokio::test]
async fn failed_event_is_repaired_by_replay() {
    let h = Harness::new();
    h.provider.add_subscription(SubscriptionSnapshot::new(
        sub("sub_9"),
        customer("cus_9"),
        SubscriptionStatus::Active,
    ));
    let event = subscription_event("evt_r", "updated", "sub_9", "cus_9", "active");
    h.deliver(event.clone()).await;

    // The missing registry row shows up later, e.g. from a finalize call.
    h.registry
        .upsert_customer(&CustomerRecord::new(customer("cus_9"), trainer("T1"), payer("U1")))
        .await
        .unwrap();
    let ack = h.deliver(event).await;

    assert_eq!(ack, WebhookAck::Processed { event_id: "evt_r".to_string() });
    let stored = h.events.find_by_event_id("evt_r").await.unwrap().unwrap();
    assert_eq!(stored.result, WebhookEventResult::Success);
    assert_eq!(h.members_of("T1").await, vec![payer("U1")]);
}

#[tokio::test]
async fn unhandled_event_type_is_ignored() {
    let h = Harness::new();

    let ack = h
        .deliver(json!({
            "id": "evt_inv",
            "type": "invoice.paid",
            "created": 1_706_745_600,
            "data": { "object": { "id": "in_1" } }
        }))
        .await;

    assert_eq!(ack, WebhookAck::Ignored { event_id: "evt_inv".to_string() });
    let stored = h.events.find_by_event_id("evt_inv").await.unwrap().unwrap();
    assert_eq!(stored.result, WebhookEventResult::Ignored);
}

// =============================================================================
// Finalize
// =============================================================================

fn completed_session(trainer_id: &str) -> CheckoutSessionDetails {
    CheckoutSessionDetails {
        id: "cs_fin".to_string(),
        complete: true,
        customer_id: Some(customer("cus_f")),
        customer_email: Some("u1@example.com".to_string()),
        trainer_id: Some(trainer(trainer_id)),
        payer_id: Some(payer("U1")),
        tier_key: Some("plus".to_string()),
        subscription: Some(SubscriptionSnapshot::new(
            sub("sub_f"),
            customer("cus_f"),
            SubscriptionStatus::Active,
        )),
    }
}

#[tokio::test]
async fn finalize_links_the_caller() {
    let h = Harness::new();
    h.provider.add_checkout_session(completed_session("T1"));

    let result = h
        .state
        .finalize_checkout_handler()
        .handle(FinalizeCheckoutCommand {
            caller: user("U1"),
            trainer_id: trainer("T1"),
            session_id: "cs_fin".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(result.payer_id, payer("U1"));
    assert_eq!(result.status, Some(SubscriptionStatus::Active));
    assert_eq!(h.members_of("T1").await, vec![payer("U1")]);
}

#[tokio::test]
async fn finalize_for_wrong_trainer_writes_nothing() {
    let h = Harness::new();
    h.provider.add_checkout_session(completed_session("T2"));

    let err = h
        .state
        .finalize_checkout_handler()
        .handle(FinalizeCheckoutCommand {
            caller: user("U1"),
            trainer_id: trainer("T1"),
            session_id: "cs_fin".to_string(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::TrainerMismatch));
    assert!(h.registry.is_empty().await);
    assert!(h.ledger.all().await.is_empty());
    assert!(h.members_of("T1").await.is_empty());
    assert!(h.members_of("T2").await.is_empty());
    assert_eq!(h.trainer_of("U1").await, None);
}

// =============================================================================
// Kick
// =============================================================================

#[tokio::test]
async fn deferred_kick_survives_period_end_updates() {
    let h = subscribed().await;

    let result = h
        .state
        .kick_member_handler()
        .handle(KickMemberCommand {
            caller: user("T1"),
            trainer_id: trainer("T1"),
            payer_id: payer("U1"),
            immediate: false,
        })
        .await
        .unwrap();

    assert!(result.canceled_upstream);
    assert!(h.provider.subscription(&sub("sub_1")).unwrap().cancel_at_period_end);
    assert_eq!(h.status_of("sub_1").await, Some(SubscriptionStatus::Canceled));
    assert!(h.members_of("T1").await.is_empty());

    // The platform still reports the subscription active until period end.
    h.deliver(subscription_event("evt_after", "updated", "sub_1", "cus_1", "active"))
        .await;

    assert_eq!(h.status_of("sub_1").await, Some(SubscriptionStatus::Canceled));
    assert!(h.members_of("T1").await.is_empty());
    assert_eq!(h.trainer_of("U1").await, None);
}

#[tokio::test]
async fn kick_after_payer_moved_keeps_new_link() {
    let h = subscribed().await;
    h.provider.add_subscription(SubscriptionSnapshot::new(
        sub("sub_2"),
        customer("cus_2"),
        SubscriptionStatus::Active,
    ));
    h.deliver(checkout_completed("evt_2", "T2", "cus_2", "sub_2")).await;
    assert_eq!(h.trainer_of("U1").await, Some(trainer("T2")));

    h.state
        .kick_member_handler()
        .handle(KickMemberCommand {
            caller: user("T1"),
            trainer_id: trainer("T1"),
            payer_id: payer("U1"),
            immediate: true,
        })
        .await
        .unwrap();

    assert!(h.members_of("T1").await.is_empty());
    assert_eq!(h.members_of("T2").await, vec![payer("U1")]);
    assert_eq!(h.trainer_of("U1").await, Some(trainer("T2")));
    assert_eq!(h.status_of("sub_1").await, Some(SubscriptionStatus::Canceled));
    assert_eq!(h.status_of("sub_2").await, Some(SubscriptionStatus::Active));
}

#[tokio::test]
async fn kick_by_non_trainer_is_forbidden() {
    let h = subscribed().await;

    let err = h
        .state
        .kick_member_handler()
        .handle(KickMemberCommand {
            caller: user("U7"),
            trainer_id: trainer("T1"),
            payer_id: payer("U1"),
            immediate: true,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Forbidden));
    assert_eq!(h.members_of("T1").await, vec![payer("U1")]);
}

// =============================================================================
// Checkout creation and portal
// =============================================================================

#[tokio::test]
async fn second_checkout_with_same_trainer_is_refused() {
    let h = subscribed().await;

    let err = h
        .state
        .create_checkout_handler()
        .handle(CreateCheckoutCommand {
            caller: user("U1"),
            trainer_id: trainer("T1"),
            tier_key: "plus".to_string(),
            success_url: "https://app.example.com/ok".to_string(),
            cancel_url: "https://app.example.com/cancel".to_string(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::AlreadySubscribed(ref t) if t == &trainer("T1")));
    assert!(!h.provider.was_called("create_checkout_session"));
}

#[tokio::test]
async fn portal_never_reuses_another_payers_customer() {
    let h = Harness::new();
    h.registry
        .upsert_customer(&CustomerRecord::new(customer("cus_legacy"), trainer("T1"), payer("U2")))
        .await
        .unwrap();
    h.provider.add_customer(customer("cus_legacy"), Some("u2@example.com"));

    let result = h
        .state
        .open_portal_handler()
        .handle(OpenPortalCommand {
            caller: user("U1"),
            trainer_id: trainer("T1"),
            return_url: "https://app.example.com/billing".to_string(),
        })
        .await
        .unwrap();

    assert_ne!(result.customer_id, customer("cus_legacy"));
    assert!(h.provider.was_called("create_customer"));
    assert_eq!(
        h.registry.find_customer(&payer("U1"), &trainer("T1")).await.unwrap(),
        Some(result.customer_id)
    );
}
