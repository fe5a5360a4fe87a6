//! Mock billing provider for testing.
//!
//! Provides a configurable implementation of `BillingProvider` for unit and
//! integration tests. Supports:
//! - Seeded customers, subscriptions and checkout sessions
//! - Error injection per method
//! - Call tracking
//! - Webhook decoding without signatures

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::billing::{SubscriptionSnapshot, SubscriptionStatus, WebhookEnvelope, WebhookError};
use crate::domain::foundation::{CustomerId, SubscriptionId};
use crate::ports::{
    BillingProvider, CheckoutSession, CheckoutSessionDetails, CreateCheckoutRequest,
    CreateCustomerRequest, PaymentError, PortalSession, ProviderCustomer,
    UpdateSubscriptionRequest,
};

use super::webhook_types::decode_webhook_payload;

/// Mock billing provider.
///
/// Clones share state, so a test can keep a handle for assertions after
/// moving another into the handler under test.
///
/// ```ignore
/// let provider = MockBillingProvider::new();
/// provider.add_subscription(snapshot);
/// provider.set_method_error("get_subscription", PaymentError::network("reset"));
/// assert_eq!(provider.call_count("get_subscription"), 1);
/// ```
#[derive(Clone, Default)]
pub struct MockBillingProvider {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    customers: HashMap<CustomerId, ProviderCustomer>,
    subscriptions: HashMap<SubscriptionId, SubscriptionSnapshot>,
    checkout_sessions: HashMap<String, CheckoutSessionDetails>,

    /// Checkout requests received, in order.
    checkout_requests: Vec<CreateCheckoutRequest>,

    /// Queued envelopes returned by `verify_webhook` before decoding.
    queued_webhooks: Vec<WebhookEnvelope>,

    method_errors: HashMap<String, PaymentError>,
    call_log: Vec<MethodCall>,
    webhook_mode: WebhookVerifyMode,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

#[derive(Default, Clone, Copy)]
enum WebhookVerifyMode {
    /// Any signature is accepted and the payload decoded as Stripe JSON.
    #[default]
    AcceptAll,

    /// Every delivery fails verification.
    Reject,

    /// Behaves as if no signing secret were configured.
    NoSecret,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose webhook verification always fails.
    pub fn rejecting_webhooks() -> Self {
        let mock = Self::new();
        mock.state().webhook_mode = WebhookVerifyMode::Reject;
        mock
    }

    /// A mock with no webhook signing secret.
    pub fn without_webhook_secret() -> Self {
        let mock = Self::new();
        mock.state().webhook_mode = WebhookVerifyMode::NoSecret;
        mock
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    pub fn add_customer(&self, customer_id: CustomerId, email: Option<&str>) {
        self.state().customers.insert(
            customer_id.clone(),
            ProviderCustomer {
                id: customer_id,
                email: email.map(str::to_string),
            },
        );
    }

    pub fn add_subscription(&self, snapshot: SubscriptionSnapshot) {
        self.state()
            .subscriptions
            .insert(snapshot.subscription_id.clone(), snapshot);
    }

    pub fn add_checkout_session(&self, details: CheckoutSessionDetails) {
        self.state()
            .checkout_sessions
            .insert(details.id.clone(), details);
    }

    /// Queue an envelope for the next `verify_webhook` call.
    pub fn queue_webhook(&self, envelope: WebhookEnvelope) {
        self.state().queued_webhooks.push(envelope);
    }

    /// Set a persistent error for a specific method.
    pub fn set_method_error(&self, method: &str, error: PaymentError) {
        self.state()
            .method_errors
            .insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        self.state().method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Inspection
    // ════════════════════════════════════════════════════════════════════════════

    pub fn subscription(&self, id: &SubscriptionId) -> Option<SubscriptionSnapshot> {
        self.state().subscriptions.get(id).cloned()
    }

    pub fn customers(&self) -> Vec<ProviderCustomer> {
        self.state().customers.values().cloned().collect()
    }

    pub fn checkout_requests(&self) -> Vec<CreateCheckoutRequest> {
        self.state().checkout_requests.clone()
    }

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    /// Record the call, then fail if an error is configured for `method`.
    fn enter(&self, method: &str, args: Vec<String>) -> Result<MutexGuard<'_, MockState>, PaymentError> {
        let mut state = self.state();
        state.call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
        match state.method_errors.get(method) {
            Some(error) => Err(error.clone()),
            None => Ok(state),
        }
    }

    /// Logs the call and surfaces any configured error without holding the lock.
    fn record(&self, method: &str, args: Vec<String>) -> Result<(), PaymentError> {
        self.enter(method, args).map(drop)
    }
}

fn mock_id(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_mock_{}", prefix, &suffix[..12])
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<ProviderCustomer, PaymentError> {
        let mut state = self.enter(
            "create_customer",
            vec![
                request.email.clone(),
                request.trainer_id.to_string(),
                request.payer_id.to_string(),
            ],
        )?;

        let customer = ProviderCustomer {
            id: CustomerId::new(mock_id("cus")).map_err(|e| PaymentError::provider(e.to_string()))?,
            email: Some(request.email),
        };
        state.customers.insert(customer.id.clone(), customer.clone());
        Ok(customer)
    }

    async fn get_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<ProviderCustomer>, PaymentError> {
        let state = self.enter("get_customer", vec![customer_id.to_string()])?;
        Ok(state.customers.get(customer_id).cloned())
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSessionDetails>, PaymentError> {
        let state = self.enter("retrieve_checkout_session", vec![session_id.to_string()])?;
        Ok(state.checkout_sessions.get(session_id).cloned())
    }

    async fn get_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<SubscriptionSnapshot>, PaymentError> {
        let state = self.enter("get_subscription", vec![subscription_id.to_string()])?;
        Ok(state.subscriptions.get(subscription_id).cloned())
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &SubscriptionId,
        at_period_end: bool,
    ) -> Result<SubscriptionSnapshot, PaymentError> {
        let mut state = self.enter(
            "cancel_subscription",
            vec![subscription_id.to_string(), at_period_end.to_string()],
        )?;

        let subscription = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| PaymentError::not_found("Subscription"))?;

        if at_period_end {
            subscription.cancel_at_period_end = true;
        } else {
            subscription.status = SubscriptionStatus::Canceled;
        }

        Ok(subscription.clone())
    }

    async fn update_subscription(
        &self,
        request: UpdateSubscriptionRequest,
    ) -> Result<SubscriptionSnapshot, PaymentError> {
        let mut state = self.enter(
            "update_subscription",
            vec![
                request.subscription_id.to_string(),
                request.price_id.clone(),
                request.tier_key.clone(),
            ],
        )?;

        let subscription = state
            .subscriptions
            .get_mut(&request.subscription_id)
            .ok_or_else(|| PaymentError::not_found("Subscription"))?;

        subscription.price_id = Some(request.price_id);
        subscription.tier_key = Some(request.tier_key);
        Ok(subscription.clone())
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let mut state = self.enter(
            "create_checkout_session",
            vec![
                request.trainer_id.to_string(),
                request.payer_id.to_string(),
                request.tier_key.clone(),
            ],
        )?;

        let id = mock_id("cs");
        state.checkout_sessions.insert(
            id.clone(),
            CheckoutSessionDetails {
                id: id.clone(),
                complete: false,
                customer_id: request.customer_id.clone(),
                customer_email: request.customer_email.clone(),
                trainer_id: Some(request.trainer_id.clone()),
                payer_id: Some(request.payer_id.clone()),
                tier_key: Some(request.tier_key.clone()),
                subscription: None,
            },
        );
        state.checkout_requests.push(request);

        Ok(CheckoutSession {
            url: format!("https://checkout.stripe.com/c/pay/{}", id),
            id,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &CustomerId,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError> {
        self.record(
            "create_portal_session",
            vec![customer_id.to_string(), return_url.to_string()],
        )?;

        let id = mock_id("bps");
        Ok(PortalSession {
            url: format!("https://billing.stripe.com/p/session/{}", id),
            id,
        })
    }

    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEnvelope, WebhookError> {
        let mut state = self.state();
        state.call_log.push(MethodCall {
            method: "verify_webhook".to_string(),
            args: vec![signature.chars().take(20).collect()],
        });

        match state.webhook_mode {
            WebhookVerifyMode::AcceptAll => {}
            WebhookVerifyMode::Reject => return Err(WebhookError::InvalidSignature),
            WebhookVerifyMode::NoSecret => return Err(WebhookError::MissingSecret),
        }

        if !state.queued_webhooks.is_empty() {
            return Ok(state.queued_webhooks.remove(0));
        }
        drop(state);

        decode_webhook_payload(payload, false)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Test Helpers
// ════════════════════════════════════════════════════════════════════════════════

impl MockBillingProvider {
    /// A mock holding one customer with one active subscription.
    pub fn with_active_subscription(
        customer_id: CustomerId,
        subscription_id: SubscriptionId,
    ) -> Self {
        let mock = Self::new();
        mock.add_customer(customer_id.clone(), Some("member@example.com"));
        mock.add_subscription(SubscriptionSnapshot::new(
            subscription_id,
            customer_id,
            SubscriptionStatus::Active,
        ));
        mock
    }
}
