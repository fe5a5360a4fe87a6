//! Stripe billing provider adapter.
//!
//! Implements the `BillingProvider` port for Stripe, including:
//! - Customer and subscription calls
//! - Checkout and billing portal sessions
//! - Webhook signature verification and event decoding
//!
//! # Security
//!
//! - Webhook signatures use HMAC-SHA256 with constant-time comparison
//! - Timestamps are validated to prevent replay attacks (5-minute window)
//! - All secrets are handled via `secrecy::SecretString`

mod mock_billing_provider;
mod stripe_adapter;
mod webhook_types;

pub use mock_billing_provider::{MethodCall, MockBillingProvider};
pub use stripe_adapter::{StripeBillingAdapter, StripeConfig};
pub use webhook_types::{
    decode_webhook_payload, hex_encode, Expandable, SignatureHeader, SignatureParseError,
    StripeCheckoutSession, StripeCustomer, StripeSubscription, StripeWebhookEvent,
};
