//! Axum router configuration for billing endpoints.

use axum::{middleware, routing::post, Router};

use crate::adapters::http::middleware::{auth_middleware, AuthState};

use super::handlers::{
    change_tier, create_checkout, finalize_checkout, handle_stripe_webhook, kick_member,
    open_portal, BillingAppState,
};

/// Authenticated billing routes, mounted at `/billing`.
///
/// - `POST /checkout` - Start a subscription checkout
/// - `POST /checkout/finalize` - Reconcile a completed checkout
/// - `POST /portal` - Open the billing portal
/// - `POST /tier` - Change tier
/// - `POST /kick` - Remove a member (trainer only)
pub fn billing_routes(auth: AuthState) -> Router<BillingAppState> {
    Router::new()
        .route("/checkout", post(create_checkout))
        .route("/checkout/finalize", post(finalize_checkout))
        .route("/portal", post(open_portal))
        .route("/tier", post(change_tier))
        .route("/kick", post(kick_member))
        .route_layer(middleware::from_fn_with_state(auth, auth_middleware))
}

/// Webhook routes, mounted at `/webhooks`.
///
/// Deliveries are verified by signature rather than bearer auth.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook))
}

/// Combined router suitable for nesting under `/api`.
///
/// ```ignore
/// let app = Router::new()
///     .nest("/api", billing_router(auth_state))
///     .with_state(billing_state);
/// ```
pub fn billing_router(auth: AuthState) -> Router<BillingAppState> {
    Router::new()
        .nest("/billing", billing_routes(auth))
        .nest("/webhooks", webhook_routes())
}
