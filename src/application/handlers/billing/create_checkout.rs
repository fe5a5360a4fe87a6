//! CreateCheckoutHandler - starts a subscription checkout for a payer.

use std::sync::Arc;

use crate::domain::billing::{ActiveStatusSet, BillingError};
use crate::domain::foundation::{AuthenticatedUser, TrainerId};
use crate::ports::{
    BillingProvider, CreateCheckoutRequest, CustomerRegistry, PayerDirectory, SubscriptionLedger,
    TierCatalog,
};

use super::payer_resolver::caller_email;

/// Command to create a checkout session.
#[derive(Debug, Clone)]
pub struct CreateCheckoutCommand {
    pub caller: AuthenticatedUser,
    pub trainer_id: TrainerId,
    pub tier_key: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCheckoutResult {
    pub session_id: String,
    pub checkout_url: String,
}

/// Handler for creating checkout sessions.
///
/// Reuses the payer's existing billing customer for this trainer so that
/// repeat checkouts do not fan out into duplicate customers upstream.
pub struct CreateCheckoutHandler {
    tiers: Arc<dyn TierCatalog>,
    registry: Arc<dyn CustomerRegistry>,
    ledger: Arc<dyn SubscriptionLedger>,
    directory: Arc<dyn PayerDirectory>,
    provider: Arc<dyn BillingProvider>,
    active_statuses: ActiveStatusSet,
}

impl CreateCheckoutHandler {
    pub fn new(
        tiers: Arc<dyn TierCatalog>,
        registry: Arc<dyn CustomerRegistry>,
        ledger: Arc<dyn SubscriptionLedger>,
        directory: Arc<dyn PayerDirectory>,
        provider: Arc<dyn BillingProvider>,
    ) -> Self {
        Self {
            tiers,
            registry,
            ledger,
            directory,
            provider,
            active_statuses: ActiveStatusSet::default(),
        }
    }

    pub fn with_active_statuses(mut self, statuses: ActiveStatusSet) -> Self {
        self.active_statuses = statuses;
        self
    }

    pub async fn handle(
        &self,
        cmd: CreateCheckoutCommand,
    ) -> Result<CreateCheckoutResult, BillingError> {
        if cmd.tier_key.trim().is_empty() {
            return Err(BillingError::Validation("tier_key is required".to_string()));
        }
        if cmd.success_url.trim().is_empty() || cmd.cancel_url.trim().is_empty() {
            return Err(BillingError::Validation(
                "success_url and cancel_url are required".to_string(),
            ));
        }

        let payer_id = cmd.caller.as_payer();

        // 1. Resolve the trainer's price for the tier
        let price_id = self
            .tiers
            .price_for(&cmd.trainer_id, &cmd.tier_key)
            .await?
            .ok_or_else(|| BillingError::not_found(format!("tier {}", cmd.tier_key)))?;

        // 2. Refuse a second live subscription to the same trainer
        let customer_id = self.registry.find_customer(&payer_id, &cmd.trainer_id).await?;
        if let Some(customer_id) = &customer_id {
            let active = self
                .ledger
                .find_active_subscription(customer_id, &cmd.trainer_id, &self.active_statuses)
                .await?;
            if active.is_some() {
                return Err(BillingError::AlreadySubscribed(cmd.trainer_id));
            }
        }

        // 3. Pre-fill email only when no customer is attached
        let customer_email = match customer_id {
            Some(_) => None,
            None => caller_email(self.directory.as_ref(), &cmd.caller).await?,
        };

        let request = CreateCheckoutRequest {
            trainer_id: cmd.trainer_id.clone(),
            payer_id: payer_id.clone(),
            tier_key: cmd.tier_key,
            price_id,
            customer_id,
            customer_email,
            success_url: cmd.success_url,
            cancel_url: cmd.cancel_url,
        };
        let session = self.provider.create_checkout_session(request).await?;

        tracing::info!(
            session_id = %session.id,
            trainer_id = %cmd.trainer_id,
            payer_id = %payer_id,
            "Checkout session created"
        );

        Ok(CreateCheckoutResult {
            session_id: session.id,
            checkout_url: session.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryCustomerRegistry, InMemoryPayerDirectory, InMemorySubscriptionLedger,
        InMemoryTierCatalog,
    };
    use crate::adapters::stripe::MockBillingProvider;
    use crate::domain::billing::{CustomerRecord, SubscriptionRecord, SubscriptionStatus};
    use crate::domain::foundation::{CustomerId, PayerId, SubscriptionId, UserId};
    use crate::ports::PaymentError;

    fn trainer(id: &str) -> TrainerId {
        TrainerId::new(id).unwrap()
    }

    fn customer(id: &str) -> CustomerId {
        CustomerId::new(id).unwrap()
    }

    fn record(status: SubscriptionStatus) -> SubscriptionRecord {
        SubscriptionRecord {
            subscription_id: SubscriptionId::new("sub_1").unwrap(),
            customer_id: customer("cus_1"),
            trainer_id: trainer("T1"),
            status,
            price_id: Some("price_basic".to_string()),
            tier_key: Some("basic".to_string()),
            current_period_end: None,
        }
    }

    async fn handler_with(
        ledger: InMemorySubscriptionLedger,
        known_customer: bool,
        provider: MockBillingProvider,
    ) -> CreateCheckoutHandler {
        let registry = InMemoryCustomerRegistry::new();
        if known_customer {
            registry
                .upsert_customer(&CustomerRecord::new(
                    customer("cus_1"),
                    trainer("T1"),
                    PayerId::new("U1").unwrap(),
                ))
                .await
                .unwrap();
        }
        CreateCheckoutHandler::new(
            Arc::new(InMemoryTierCatalog::new().with_tier(trainer("T1"), "basic", "price_basic")),
            Arc::new(registry),
            Arc::new(ledger),
            Arc::new(
                InMemoryPayerDirectory::new()
                    .with_payer(PayerId::new("U1").unwrap(), "u1@example.com"),
            ),
            Arc::new(provider),
        )
    }

    fn cmd(tier: &str) -> CreateCheckoutCommand {
        CreateCheckoutCommand {
            caller: AuthenticatedUser::new(UserId::new("U1").unwrap(), None),
            trainer_id: trainer("T1"),
            tier_key: tier.to_string(),
            success_url: "https://app.example.com/billing/success".to_string(),
            cancel_url: "https://app.example.com/billing/cancel".to_string(),
        }
    }

    #[tokio::test]
    async fn new_payer_gets_checkout_with_email_prefill() {
        let provider = MockBillingProvider::new();
        let handler =
            handler_with(InMemorySubscriptionLedger::new(), false, provider.clone()).await;

        let result = handler.handle(cmd("basic")).await.unwrap();

        assert!(result.checkout_url.contains(&result.session_id));
        let requests = provider.checkout_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].price_id, "price_basic");
        assert_eq!(requests[0].customer_email.as_deref(), Some("u1@example.com"));
        assert!(requests[0].customer_id.is_none());
    }

    #[tokio::test]
    async fn known_customer_is_reused() {
        let provider = MockBillingProvider::new();
        let ledger = InMemorySubscriptionLedger::new().with_record(record(SubscriptionStatus::Canceled));
        let handler = handler_with(ledger, true, provider.clone()).await;

        handler.handle(cmd("basic")).await.unwrap();

        let requests = provider.checkout_requests();
        assert_eq!(requests[0].customer_id, Some(customer("cus_1")));
        assert!(requests[0].customer_email.is_none());
    }

    #[tokio::test]
    async fn active_subscription_blocks_checkout() {
        let provider = MockBillingProvider::new();
        let ledger = InMemorySubscriptionLedger::new().with_record(record(SubscriptionStatus::PastDue));
        let handler = handler_with(ledger, true, provider.clone()).await;

        let err = handler.handle(cmd("basic")).await.unwrap_err();

        assert!(matches!(err, BillingError::AlreadySubscribed(ref t) if t == &trainer("T1")));
        assert!(!provider.was_called("create_checkout_session"));
    }

    #[tokio::test]
    async fn unknown_tier_is_not_found() {
        let handler =
            handler_with(InMemorySubscriptionLedger::new(), false, MockBillingProvider::new()).await;

        let err = handler.handle(cmd("gold")).await.unwrap_err();

        assert!(matches!(err, BillingError::NotFound(ref what) if what.contains("gold")));
    }

    #[tokio::test]
    async fn missing_urls_fail_validation() {
        let handler =
            handler_with(InMemorySubscriptionLedger::new(), false, MockBillingProvider::new()).await;
        let mut command = cmd("basic");
        command.cancel_url = String::new();

        let err = handler.handle(command).await.unwrap_err();

        assert!(matches!(err, BillingError::Validation(_)));
    }

    #[tokio::test]
    async fn provider_failure_is_upstream_error() {
        let provider = MockBillingProvider::new();
        provider.set_method_error("create_checkout_session", PaymentError::network("reset"));
        let handler = handler_with(InMemorySubscriptionLedger::new(), false, provider).await;

        let err = handler.handle(cmd("basic")).await.unwrap_err();

        assert!(matches!(err, BillingError::UpstreamBilling(_)));
    }
}
