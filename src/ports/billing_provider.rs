//! Billing provider port for the external payment platform.
//!
//! Defines the outbound calls the reconciliation core and the billing
//! handlers make (Stripe in production), plus webhook verification.
//!
//! # Design
//!
//! - **Snapshots, not raw objects**: subscription reads come back as
//!   [`SubscriptionSnapshot`] with checkout metadata already typed
//! - **Explicit configuration failures**: an adapter without credentials
//!   returns `PaymentErrorCode::NotConfigured` instead of panicking

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{BillingError, SubscriptionSnapshot, WebhookEnvelope, WebhookError};
use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, PayerId, SubscriptionId, TrainerId,
};

/// Port for the payment platform.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a customer in the payment system.
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<ProviderCustomer, PaymentError>;

    /// Get customer by provider ID. Deleted customers read as `None`.
    async fn get_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<ProviderCustomer>, PaymentError>;

    /// Retrieve a checkout session with its subscription and customer expanded.
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSessionDetails>, PaymentError>;

    /// Get the live state of a subscription.
    async fn get_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<SubscriptionSnapshot>, PaymentError>;

    /// Cancel a subscription.
    ///
    /// If `at_period_end` is true, the subscription stays active until the
    /// period ends and the returned snapshot has `cancel_at_period_end` set.
    async fn cancel_subscription(
        &self,
        subscription_id: &SubscriptionId,
        at_period_end: bool,
    ) -> Result<SubscriptionSnapshot, PaymentError>;

    /// Move a subscription's single item to a new price.
    async fn update_subscription(
        &self,
        request: UpdateSubscriptionRequest,
    ) -> Result<SubscriptionSnapshot, PaymentError>;

    /// Create a subscription-mode checkout session.
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Create a billing portal session for subscription management.
    async fn create_portal_session(
        &self,
        customer_id: &CustomerId,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError>;

    /// Verify a webhook signature and decode the event.
    ///
    /// Returns `WebhookError::MissingSecret` when no signing secret is
    /// configured; callers acknowledge such deliveries without processing.
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEnvelope, WebhookError>;
}

/// Request to create a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    pub email: String,
    pub trainer_id: TrainerId,
    pub payer_id: PayerId,
}

/// Customer in the payment system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCustomer {
    pub id: CustomerId,
    pub email: Option<String>,
}

/// Request to create a checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCheckoutRequest {
    pub trainer_id: TrainerId,
    pub payer_id: PayerId,
    pub tier_key: String,
    pub price_id: String,

    /// Existing customer to attach; otherwise the platform creates one.
    pub customer_id: Option<CustomerId>,

    /// Pre-fill when no customer is attached.
    pub customer_email: Option<String>,

    pub success_url: String,
    pub cancel_url: String,
}

impl CreateCheckoutRequest {
    /// Metadata written on both the session and the subscription it creates.
    pub fn metadata(&self) -> HashMap<&'static str, String> {
        HashMap::from([
            ("trainer_id", self.trainer_id.to_string()),
            ("tier_key", self.tier_key.clone()),
            ("user_id", self.payer_id.to_string()),
        ])
    }
}

/// Request to change the price of a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub subscription_id: SubscriptionId,
    pub price_id: String,
    pub tier_key: String,
}

/// Checkout session for payment completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Portal session for subscription management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSession {
    pub id: String,
    pub url: String,
}

/// A retrieved checkout session, as used by the finalize path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionDetails {
    pub id: String,

    /// True once the platform reports the session `complete`.
    pub complete: bool,

    pub customer_id: Option<CustomerId>,
    pub customer_email: Option<String>,

    /// `trainer_id` metadata written at session creation.
    pub trainer_id: Option<TrainerId>,

    /// `user_id` metadata written at session creation.
    pub payer_id: Option<PayerId>,

    pub tier_key: Option<String>,

    /// Expanded subscription, absent for customer-only sessions.
    pub subscription: Option<SubscriptionSnapshot>,
}

/// Errors from payment provider operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentError {
    /// Error code for categorization.
    pub code: PaymentErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl PaymentError {
    /// Create a new payment error.
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    /// Create with provider code.
    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    /// Create a not found error.
    pub fn not_found(resource: &str) -> Self {
        Self::new(PaymentErrorCode::NotFound, format!("{} not found", resource))
    }

    /// Create a provider (API or malformed response) error.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ProviderError, message)
    }

    /// Credentials are missing from configuration.
    pub fn not_configured(what: &str) -> Self {
        Self::new(
            PaymentErrorCode::NotConfigured,
            format!("{} is not configured", what),
        )
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for DomainError {
    fn from(err: PaymentError) -> Self {
        let code = match err.code {
            PaymentErrorCode::NotFound => ErrorCode::CustomerNotFound,
            PaymentErrorCode::NotConfigured => ErrorCode::InternalError,
            _ => ErrorCode::PaymentProviderError,
        };

        let mut domain = DomainError::new(code, err.message);
        if let Some(provider_code) = err.provider_code {
            domain = domain.with_detail("provider_code", provider_code);
        }
        domain
    }
}

impl From<PaymentError> for BillingError {
    fn from(err: PaymentError) -> Self {
        match err.code {
            PaymentErrorCode::NotConfigured => BillingError::MissingConfiguration(err.message),
            PaymentErrorCode::NotFound => BillingError::NotFound(err.message),
            _ => BillingError::UpstreamBilling(err.to_string()),
        }
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    /// Network connectivity issue.
    NetworkError,

    /// API authentication failed.
    AuthenticationError,

    /// Resource not found.
    NotFound,

    /// Rate limit exceeded.
    RateLimitExceeded,

    /// Provider API error or unparseable response.
    ProviderError,

    /// Credentials absent from configuration.
    NotConfigured,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::NetworkError | PaymentErrorCode::RateLimitExceeded
        )
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::ProviderError => "provider_error",
            PaymentErrorCode::NotConfigured => "not_configured",
        };
        write!(f, "{}", s)
    }
}
