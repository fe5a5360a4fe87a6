//! HTTP adapter for billing endpoints.
//!
//! - `POST /api/billing/checkout` - Start a subscription checkout
//! - `POST /api/billing/checkout/finalize` - Reconcile a completed checkout
//! - `POST /api/billing/portal` - Open the billing portal
//! - `POST /api/billing/tier` - Change tier
//! - `POST /api/billing/kick` - Remove a member
//! - `POST /api/webhooks/stripe` - Receive billing platform events

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{BillingApiError, BillingAppState, WebhookApiError};
pub use routes::{billing_router, billing_routes, webhook_routes};
