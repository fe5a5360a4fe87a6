//! Stripe billing provider adapter.
//!
//! Implements the `BillingProvider` port against the Stripe REST API.
//!
//! # Security
//!
//! - HMAC-SHA256 signature verification with constant-time comparison
//! - Timestamp validation (5-minute window) for replay attack prevention
//! - Secrets handled via `secrecy::SecretString`
//!
//! # Configuration
//!
//! Both keys are optional. Without an API key every outbound call fails
//! with `PaymentErrorCode::NotConfigured`; without a webhook secret
//! `verify_webhook` returns `WebhookError::MissingSecret`.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::PaymentConfig;
use crate::domain::billing::{SubscriptionSnapshot, WebhookEnvelope, WebhookError};
use crate::domain::foundation::{CustomerId, SubscriptionId};
use crate::ports::{
    BillingProvider, CheckoutSession, CheckoutSessionDetails, CreateCheckoutRequest,
    CreateCustomerRequest, PaymentError, PaymentErrorCode, PortalSession, ProviderCustomer,
    UpdateSubscriptionRequest,
};

use super::webhook_types::{
    decode_webhook_payload, SignatureHeader, StripeCheckoutSession, StripeCustomer,
    StripeErrorResponse, StripeSubscription,
};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age for webhook events (5 minutes).
const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps (60 seconds).
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: Option<SecretString>,

    /// Webhook signing secret (whsec_...).
    webhook_secret: Option<SecretString>,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Whether to reject test-mode events.
    require_livemode: bool,
}

impl StripeConfig {
    /// Create a fully configured Stripe configuration.
    pub fn new(api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            api_key: Some(SecretString::new(api_key.into())),
            webhook_secret: Some(SecretString::new(webhook_secret.into())),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            require_livemode: false,
        }
    }

    /// Configuration with neither key set.
    pub fn unconfigured() -> Self {
        Self {
            api_key: None,
            webhook_secret: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            require_livemode: false,
        }
    }

    /// Build from the `payment` config section.
    pub fn from_payment_config(config: &PaymentConfig) -> Self {
        Self {
            api_key: config.stripe_api_key.clone(),
            webhook_secret: config.stripe_webhook_secret.clone(),
            api_base_url: config.stripe_api_base_url.clone(),
            require_livemode: config.require_livemode,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Require livemode events in production.
    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }
}

/// Stripe billing provider adapter.
pub struct StripeBillingAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripeBillingAdapter {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    fn api_key(&self) -> Result<&SecretString, PaymentError> {
        self.config
            .api_key
            .as_ref()
            .ok_or_else(|| PaymentError::not_configured("Stripe API key"))
    }

    /// Send an authenticated request and decode the body.
    ///
    /// A 404 reads as `Ok(None)`; callers decide whether absence is an error.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<Option<T>, PaymentError> {
        let api_key = self.api_key()?;

        let response = request
            .basic_auth(api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(operation, error = %e, "Stripe request failed");
                PaymentError::network(e.to_string())
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                operation,
                status = status.as_u16(),
                error = %error_text,
                "Stripe API error"
            );
            return Err(api_error(status, &error_text));
        }

        let body = response.json::<T>().await.map_err(|e| {
            PaymentError::provider(format!("Failed to parse Stripe response: {}", e))
        })?;

        Ok(Some(body))
    }

    /// Like [`send`](Self::send), for calls where the object must exist.
    async fn send_expecting<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
        resource: &str,
    ) -> Result<T, PaymentError> {
        self.send(request, operation)
            .await?
            .ok_or_else(|| PaymentError::not_found(resource))
    }

    async fn fetch_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<StripeSubscription>, PaymentError> {
        let url = self.url(&format!("/v1/subscriptions/{}", subscription_id));
        self.send(self.http_client.get(&url), "get_subscription")
            .await
    }

    /// Verify webhook signature using HMAC-SHA256.
    ///
    /// # Security
    ///
    /// - Uses constant-time comparison to prevent timing attacks
    /// - Validates timestamp to prevent replay attacks
    fn verify_signature(
        &self,
        secret: &SecretString,
        payload: &[u8],
        header: &SignatureHeader,
    ) -> Result<(), WebhookError> {
        let now = chrono::Utc::now().timestamp();
        let age = now - header.timestamp;

        if age > MAX_TIMESTAMP_AGE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                current_time = now,
                age_secs = age,
                "Webhook event too old - possible replay attack"
            );
            return Err(WebhookError::TimestampOutOfRange(format!(
                "Event too old ({} seconds)",
                age
            )));
        }

        if age < -MAX_FUTURE_TOLERANCE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                current_time = now,
                "Webhook event from future - clock skew or manipulation"
            );
            return Err(WebhookError::TimestampOutOfRange(
                "Event timestamp in future".to_string(),
            ));
        }

        let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(header.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = mac.finalize().into_bytes();
        let expected_bytes: &[u8] = expected.as_slice();

        let matched = header
            .v1_signatures
            .iter()
            .any(|provided| expected_bytes.ct_eq(provided.as_slice()).unwrap_u8() == 1);

        if !matched {
            tracing::warn!(
                signatures = header.v1_signatures.len(),
                "Invalid webhook signature"
            );
            return Err(WebhookError::InvalidSignature);
        }

        Ok(())
    }
}

/// Map a non-2xx Stripe response to a payment error.
fn api_error(status: reqwest::StatusCode, body: &str) -> PaymentError {
    let parsed = serde_json::from_str::<StripeErrorResponse>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|p| p.error.message.clone())
        .unwrap_or_else(|| body.to_string());

    let code = match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            PaymentErrorCode::AuthenticationError
        }
        reqwest::StatusCode::TOO_MANY_REQUESTS => PaymentErrorCode::RateLimitExceeded,
        s if s.is_server_error() => PaymentErrorCode::NetworkError,
        _ => PaymentErrorCode::ProviderError,
    };

    let err = PaymentError::new(code, format!("Stripe API error: {}", message));
    match parsed.and_then(|p| p.error.code.or(p.error.error_type)) {
        Some(provider_code) => err.with_provider_code(provider_code),
        None => err,
    }
}

fn snapshot_of(sub: StripeSubscription) -> Result<SubscriptionSnapshot, PaymentError> {
    sub.to_snapshot().map_err(PaymentError::provider)
}

fn customer_of(customer: StripeCustomer) -> Result<ProviderCustomer, PaymentError> {
    Ok(ProviderCustomer {
        id: CustomerId::new(customer.id)
            .map_err(|e| PaymentError::provider(e.to_string()))?,
        email: customer.email,
    })
}

#[async_trait]
impl BillingProvider for StripeBillingAdapter {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<ProviderCustomer, PaymentError> {
        let params = [
            ("email", request.email.clone()),
            ("metadata[trainer_id]", request.trainer_id.to_string()),
            ("metadata[user_id]", request.payer_id.to_string()),
        ];

        let customer: StripeCustomer = self
            .send_expecting(
                self.http_client.post(self.url("/v1/customers")).form(&params),
                "create_customer",
                "Customer",
            )
            .await?;

        tracing::info!(
            customer_id = %customer.id,
            trainer_id = %request.trainer_id,
            payer_id = %request.payer_id,
            "Stripe customer created"
        );

        let mut created = customer_of(customer)?;
        created.email = created.email.or(Some(request.email));
        Ok(created)
    }

    async fn get_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<ProviderCustomer>, PaymentError> {
        let url = self.url(&format!("/v1/customers/{}", customer_id));
        let customer: Option<StripeCustomer> =
            self.send(self.http_client.get(&url), "get_customer").await?;

        match customer {
            Some(c) if !c.deleted => customer_of(c).map(Some),
            _ => Ok(None),
        }
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSessionDetails>, PaymentError> {
        let url = self.url(&format!("/v1/checkout/sessions/{}", session_id));
        let request = self
            .http_client
            .get(&url)
            .query(&[("expand[]", "subscription"), ("expand[]", "customer")]);

        let session: Option<StripeCheckoutSession> =
            self.send(request, "retrieve_checkout_session").await?;

        session
            .map(|s| s.to_details().map_err(PaymentError::provider))
            .transpose()
    }

    async fn get_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<SubscriptionSnapshot>, PaymentError> {
        self.fetch_subscription(subscription_id)
            .await?
            .map(snapshot_of)
            .transpose()
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &SubscriptionId,
        at_period_end: bool,
    ) -> Result<SubscriptionSnapshot, PaymentError> {
        let url = self.url(&format!("/v1/subscriptions/{}", subscription_id));

        let request = if at_period_end {
            self.http_client
                .post(&url)
                .form(&[("cancel_at_period_end", "true")])
        } else {
            self.http_client.delete(&url)
        };

        let sub: StripeSubscription = self
            .send_expecting(request, "cancel_subscription", "Subscription")
            .await?;

        tracing::info!(
            subscription_id = %subscription_id,
            at_period_end,
            status = %sub.status,
            "Stripe subscription canceled"
        );

        snapshot_of(sub)
    }

    async fn update_subscription(
        &self,
        request: UpdateSubscriptionRequest,
    ) -> Result<SubscriptionSnapshot, PaymentError> {
        // The item id is needed to replace the price instead of adding a second item.
        let current = self
            .fetch_subscription(&request.subscription_id)
            .await?
            .ok_or_else(|| PaymentError::not_found("Subscription"))?;
        let item_id = swappable_item_id(&current)?;

        let url = self.url(&format!("/v1/subscriptions/{}", request.subscription_id));
        let params = [
            ("items[0][id]", item_id),
            ("items[0][price]", request.price_id.clone()),
            ("metadata[tier_key]", request.tier_key.clone()),
            ("proration_behavior", "create_prorations".to_string()),
        ];

        let sub: StripeSubscription = self
            .send_expecting(
                self.http_client.post(&url).form(&params),
                "update_subscription",
                "Subscription",
            )
            .await?;

        snapshot_of(sub)
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let mut params: Vec<(String, String)> = vec![
            ("mode".into(), "subscription".into()),
            ("line_items[0][price]".into(), request.price_id.clone()),
            ("line_items[0][quantity]".into(), "1".into()),
            ("success_url".into(), request.success_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
        ];

        for (key, value) in request.metadata() {
            params.push((format!("metadata[{}]", key), value.clone()));
            params.push((format!("subscription_data[metadata][{}]", key), value));
        }

        match (&request.customer_id, &request.customer_email) {
            (Some(customer_id), _) => params.push(("customer".into(), customer_id.to_string())),
            (None, Some(email)) => params.push(("customer_email".into(), email.clone())),
            (None, None) => {}
        }

        let session: StripeCheckoutSession = self
            .send_expecting(
                self.http_client
                    .post(self.url("/v1/checkout/sessions"))
                    .form(&params),
                "create_checkout_session",
                "Checkout session",
            )
            .await?;

        let url = session
            .url
            .clone()
            .ok_or_else(|| PaymentError::provider("Checkout session has no URL"))?;

        tracing::info!(
            session_id = %session.id,
            trainer_id = %request.trainer_id,
            payer_id = %request.payer_id,
            tier_key = %request.tier_key,
            "Stripe checkout session created"
        );

        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &CustomerId,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError> {
        #[derive(Deserialize)]
        struct PortalSessionResponse {
            id: String,
            url: String,
        }

        let portal: PortalSessionResponse = self
            .send_expecting(
                self.http_client
                    .post(self.url("/v1/billing_portal/sessions"))
                    .form(&[("customer", customer_id.as_str()), ("return_url", return_url)]),
                "create_portal_session",
                "Customer",
            )
            .await?;

        Ok(PortalSession {
            id: portal.id,
            url: portal.url,
        })
    }

    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEnvelope, WebhookError> {
        let secret = self
            .config
            .webhook_secret
            .as_ref()
            .ok_or(WebhookError::MissingSecret)?;

        let header = SignatureHeader::parse(signature).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse Stripe-Signature header");
            WebhookError::from(e)
        })?;

        self.verify_signature(secret, payload, &header)?;

        let envelope = decode_webhook_payload(payload, self.config.require_livemode)?;

        tracing::info!(
            event_id = %envelope.event_id,
            event_type = %envelope.event_type,
            "Webhook signature verified"
        );

        Ok(envelope)
    }
}

/// Item whose price a tier change replaces.
fn swappable_item_id(subscription: &StripeSubscription) -> Result<String, PaymentError> {
    subscription
        .first_item()
        .and_then(|item| item.id.clone())
        .ok_or_else(|| PaymentError::provider("Subscription has no item id to update"))
}
