//! HTTP handlers for billing endpoints.
//!
//! These handlers connect axum routes to the billing command handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::adapters::http::middleware::RequireAuth;
use crate::application::handlers::billing::{
    ChangeTierCommand, ChangeTierHandler, CreateCheckoutCommand, CreateCheckoutHandler,
    FinalizeCheckoutCommand, FinalizeCheckoutHandler, HandleBillingWebhookCommand,
    HandleBillingWebhookHandler, KickMemberCommand, KickMemberHandler, OpenPortalCommand,
    OpenPortalHandler, PayerResolver, ReconciliationEngine, UnlinkEngine,
};
use crate::domain::billing::{BillingError, WebhookError};
use crate::domain::foundation::{PayerId, TrainerId};
use crate::ports::{
    BillingProvider, CustomerRegistry, MembershipLinker, PayerDirectory, SubscriptionLedger,
    TierCatalog, WebhookEventRepository,
};

use super::dto::{
    ChangeTierRequest, ChangeTierResponse, CheckoutResponse, CreateCheckoutRequest,
    ErrorResponse, FinalizeCheckoutRequest, FinalizeCheckoutResponse, KickMemberRequest,
    KickMemberResponse, OpenPortalRequest, PortalResponse, WebhookResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the billing endpoints.
///
/// Cloned per request; every dependency is behind an `Arc`.
#[derive(Clone)]
pub struct BillingAppState {
    pub tiers: Arc<dyn TierCatalog>,
    pub registry: Arc<dyn CustomerRegistry>,
    pub ledger: Arc<dyn SubscriptionLedger>,
    pub linker: Arc<dyn MembershipLinker>,
    pub directory: Arc<dyn PayerDirectory>,
    pub events: Arc<dyn WebhookEventRepository>,
    pub provider: Arc<dyn BillingProvider>,
}

impl BillingAppState {
    fn reconciler(&self) -> ReconciliationEngine {
        ReconciliationEngine::new(
            PayerResolver::new(self.directory.clone(), self.provider.clone()),
            self.registry.clone(),
            self.ledger.clone(),
            self.linker.clone(),
            self.provider.clone(),
        )
    }

    pub fn create_checkout_handler(&self) -> CreateCheckoutHandler {
        CreateCheckoutHandler::new(
            self.tiers.clone(),
            self.registry.clone(),
            self.ledger.clone(),
            self.directory.clone(),
            self.provider.clone(),
        )
    }

    pub fn finalize_checkout_handler(&self) -> FinalizeCheckoutHandler {
        FinalizeCheckoutHandler::new(self.provider.clone(), self.reconciler())
    }

    pub fn open_portal_handler(&self) -> OpenPortalHandler {
        OpenPortalHandler::new(
            self.registry.clone(),
            self.directory.clone(),
            self.provider.clone(),
        )
    }

    pub fn change_tier_handler(&self) -> ChangeTierHandler {
        ChangeTierHandler::new(
            self.tiers.clone(),
            self.registry.clone(),
            self.ledger.clone(),
            self.provider.clone(),
            self.reconciler(),
        )
    }

    pub fn kick_member_handler(&self) -> KickMemberHandler {
        KickMemberHandler::new(
            self.registry.clone(),
            self.ledger.clone(),
            self.provider.clone(),
            UnlinkEngine::new(
                self.registry.clone(),
                self.ledger.clone(),
                self.linker.clone(),
            ),
        )
    }

    pub fn webhook_handler(&self) -> HandleBillingWebhookHandler {
        HandleBillingWebhookHandler::new(
            self.provider.clone(),
            self.registry.clone(),
            self.events.clone(),
            self.reconciler(),
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Authenticated endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/checkout - Start a subscription checkout
pub async fn create_checkout(
    State(state): State<BillingAppState>,
    RequireAuth(caller): RequireAuth,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CreateCheckoutCommand {
        caller,
        trainer_id: TrainerId::new(request.trainer_id).map_err(BillingError::from)?,
        tier_key: request.tier_key,
        success_url: request.success_url,
        cancel_url: request.cancel_url,
    };

    let result = state.create_checkout_handler().handle(cmd).await?;

    Ok((StatusCode::CREATED, Json(CheckoutResponse::from(result))))
}

/// POST /api/billing/checkout/finalize - Reconcile a completed checkout
pub async fn finalize_checkout(
    State(state): State<BillingAppState>,
    RequireAuth(caller): RequireAuth,
    Json(request): Json<FinalizeCheckoutRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = FinalizeCheckoutCommand {
        caller,
        trainer_id: TrainerId::new(request.trainer_id).map_err(BillingError::from)?,
        session_id: request.session_id,
    };

    let result = state.finalize_checkout_handler().handle(cmd).await?;

    Ok(Json(FinalizeCheckoutResponse::from(result)))
}

/// POST /api/billing/portal - Open the billing portal
pub async fn open_portal(
    State(state): State<BillingAppState>,
    RequireAuth(caller): RequireAuth,
    Json(request): Json<OpenPortalRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = OpenPortalCommand {
        caller,
        trainer_id: TrainerId::new(request.trainer_id).map_err(BillingError::from)?,
        return_url: request.return_url,
    };

    let result = state.open_portal_handler().handle(cmd).await?;

    Ok(Json(PortalResponse::from(result)))
}

/// POST /api/billing/tier - Change the caller's tier
pub async fn change_tier(
    State(state): State<BillingAppState>,
    RequireAuth(caller): RequireAuth,
    Json(request): Json<ChangeTierRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = ChangeTierCommand {
        caller,
        trainer_id: TrainerId::new(request.trainer_id).map_err(BillingError::from)?,
        tier_key: request.tier_key,
    };

    let result = state.change_tier_handler().handle(cmd).await?;

    Ok(Json(ChangeTierResponse::from(result)))
}

/// POST /api/billing/kick - Remove a member (trainer only)
pub async fn kick_member(
    State(state): State<BillingAppState>,
    RequireAuth(caller): RequireAuth,
    Json(request): Json<KickMemberRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = KickMemberCommand {
        caller,
        trainer_id: TrainerId::new(request.trainer_id).map_err(BillingError::from)?,
        payer_id: PayerId::new(request.payer_id).map_err(BillingError::from)?,
        immediate: request.immediate,
    };

    let result = state.kick_member_handler().handle(cmd).await?;

    Ok(Json(KickMemberResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook endpoint (signature verified, no bearer auth)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/stripe - Receive billing platform events
pub async fn handle_stripe_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| WebhookError::InvalidHeader("missing Stripe-Signature".to_string()))?;

    let cmd = HandleBillingWebhookCommand {
        payload: body.to_vec(),
        signature: signature.to_string(),
    };

    let ack = state.webhook_handler().handle(cmd).await?;

    Ok(Json(WebhookResponse::from(ack)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

const GENERIC_SERVER_MESSAGE: &str = "Unable to complete the billing request";

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl BillingApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            BillingError::Validation(_) => StatusCode::BAD_REQUEST,
            BillingError::Forbidden
            | BillingError::TrainerMismatch
            | BillingError::PayerMismatch => StatusCode::FORBIDDEN,
            BillingError::NotFound(_) => StatusCode::NOT_FOUND,
            BillingError::AlreadySubscribed(_) | BillingError::CheckoutIncomplete(_) => {
                StatusCode::CONFLICT
            }
            BillingError::UnresolvedPayer => StatusCode::UNPROCESSABLE_ENTITY,
            BillingError::UpstreamBilling(_) => StatusCode::BAD_GATEWAY,
            BillingError::Persistence(_) | BillingError::MissingConfiguration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "Billing request failed");
            GENERIC_SERVER_MESSAGE.to_string()
        } else {
            self.0.to_string()
        };

        (status, Json(ErrorResponse::new(self.0.code(), message))).into_response()
    }
}

/// Rejection for webhook deliveries that fail verification.
#[derive(Debug)]
pub struct WebhookApiError(WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let code = match &self.0 {
            WebhookError::MissingSecret => "WEBHOOK_NOT_CONFIGURED",
            WebhookError::InvalidHeader(_) | WebhookError::InvalidSignature => {
                "INVALID_WEBHOOK_SIGNATURE"
            }
            WebhookError::TimestampOutOfRange(_) => "WEBHOOK_TIMESTAMP_OUT_OF_RANGE",
            WebhookError::LivemodeMismatch => "WEBHOOK_LIVEMODE_MISMATCH",
            WebhookError::ParseError(_) => "INVALID_WEBHOOK_PAYLOAD",
        };
        tracing::warn!(code, error = %self.0, "Rejected webhook delivery");

        (
            self.0.status_code(),
            Json(ErrorResponse::new(code, self.0.to_string())),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: BillingError) -> StatusCode {
        BillingApiError::from(err).into_response().status()
    }

    #[test]
    fn caller_errors_map_to_4xx() {
        assert_eq!(status_of(BillingError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(BillingError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status_of(BillingError::TrainerMismatch), StatusCode::FORBIDDEN);
        assert_eq!(status_of(BillingError::PayerMismatch), StatusCode::FORBIDDEN);
        assert_eq!(status_of(BillingError::not_found("tier plus")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(BillingError::AlreadySubscribed(TrainerId::new("T1").unwrap())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(BillingError::CheckoutIncomplete("cs_1".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(BillingError::UnresolvedPayer),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn server_errors_map_to_5xx() {
        assert_eq!(status_of(BillingError::upstream("timeout")), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_of(BillingError::Persistence("pool closed".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(BillingError::MissingConfiguration("Stripe API key".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn server_error_body_hides_details() {
        let response =
            BillingApiError::from(BillingError::Persistence("password=hunter2".into()))
                .into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["code"], "PERSISTENCE_ERROR");
        assert_eq!(json["message"], GENERIC_SERVER_MESSAGE);
    }

    #[test]
    fn webhook_signature_failure_is_400() {
        let response = WebhookApiError::from(WebhookError::InvalidSignature).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
