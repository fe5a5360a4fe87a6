//! Data Transfer Objects for the billing HTTP endpoints.
//!
//! Request DTOs carry raw strings; identifiers are validated when the
//! handler builds its command, so a blank id surfaces as a 400.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::{
    ChangeTierResult, CreateCheckoutResult, FinalizeCheckoutResult, KickMemberResult,
    OpenPortalResult, WebhookAck,
};
use crate::domain::billing::SubscriptionStatus;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to start a subscription checkout with a trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCheckoutRequest {
    pub trainer_id: String,
    pub tier_key: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Request to finalize a checkout after the payer is redirected back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeCheckoutRequest {
    pub session_id: String,
    pub trainer_id: String,
}

/// Request to open the billing portal for a trainer relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPortalRequest {
    pub trainer_id: String,
    pub return_url: String,
}

/// Request to move the caller's subscription to another tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeTierRequest {
    pub trainer_id: String,
    pub tier_key: String,
}

/// Request from a trainer to remove a member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KickMemberRequest {
    pub trainer_id: String,
    pub payer_id: String,

    /// Cancel now instead of at period end.
    #[serde(default)]
    pub immediate: bool,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
}

impl From<CreateCheckoutResult> for CheckoutResponse {
    fn from(result: CreateCheckoutResult) -> Self {
        Self {
            session_id: result.session_id,
            url: result.checkout_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeCheckoutResponse {
    pub status: Option<SubscriptionStatus>,
    pub subscription_id: Option<String>,
    pub trainer_id: String,
}

impl From<FinalizeCheckoutResult> for FinalizeCheckoutResponse {
    fn from(result: FinalizeCheckoutResult) -> Self {
        Self {
            status: result.status,
            subscription_id: result.subscription_id.map(|id| id.to_string()),
            trainer_id: result.trainer_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalResponse {
    pub url: String,
}

impl From<OpenPortalResult> for PortalResponse {
    fn from(result: OpenPortalResult) -> Self {
        Self {
            url: result.portal_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeTierResponse {
    pub subscription_id: String,
    pub status: Option<SubscriptionStatus>,
    pub tier_key: String,
}

impl From<ChangeTierResult> for ChangeTierResponse {
    fn from(result: ChangeTierResult) -> Self {
        Self {
            subscription_id: result.subscription_id.to_string(),
            status: result.status,
            tier_key: result.tier_key,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KickMemberResponse {
    pub kicked: bool,
    pub canceled_upstream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

impl From<KickMemberResult> for KickMemberResponse {
    fn from(result: KickMemberResult) -> Self {
        Self {
            kicked: true,
            canceled_upstream: result.canceled_upstream,
            subscription_id: result.subscription_id.map(|id| id.to_string()),
        }
    }
}

/// Acknowledgement body for webhook deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub received: bool,

    /// `processed`, `already_processed`, `ignored`, `failed` or `skipped`.
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl From<WebhookAck> for WebhookResponse {
    fn from(ack: WebhookAck) -> Self {
        let (status, event_id) = match ack {
            WebhookAck::Processed { event_id } => ("processed", Some(event_id)),
            WebhookAck::AlreadyProcessed { event_id } => ("already_processed", Some(event_id)),
            WebhookAck::Ignored { event_id } => ("ignored", Some(event_id)),
            // The failure detail stays in the event store and the logs.
            WebhookAck::Failed { event_id, .. } => ("failed", Some(event_id)),
            WebhookAck::Skipped => ("skipped", None),
        };
        Self {
            received: true,
            status: status.to_string(),
            event_id,
        }
    }
}

/// Error body shared by every billing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable code for programmatic handling.
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::billing::UnlinkReport;
    use crate::domain::foundation::{PayerId, SubscriptionId, TrainerId};
    use crate::ports::UnlinkOutcome;

    #[test]
    fn kick_request_defaults_to_period_end() {
        let request: KickMemberRequest =
            serde_json::from_str(r#"{"trainer_id":"T1","payer_id":"U1"}"#).unwrap();
        assert!(!request.immediate);
    }

    #[test]
    fn finalize_response_serializes_status_in_snake_case() {
        let response = FinalizeCheckoutResponse::from(FinalizeCheckoutResult {
            trainer_id: TrainerId::new("T1").unwrap(),
            payer_id: PayerId::new("U1").unwrap(),
            subscription_id: Some(SubscriptionId::new("sub_1").unwrap()),
            status: Some(SubscriptionStatus::PastDue),
        });

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "past_due");
        assert_eq!(json["subscription_id"], "sub_1");
        assert_eq!(json["trainer_id"], "T1");
    }

    #[test]
    fn kick_response_always_reports_kicked() {
        let response = KickMemberResponse::from(KickMemberResult {
            subscription_id: None,
            canceled_upstream: false,
            report: UnlinkReport {
                trainer_id: TrainerId::new("T1").unwrap(),
                payer_id: PayerId::new("U1").unwrap(),
                marked_canceled: false,
                outcome: UnlinkOutcome::default(),
                failures: Vec::new(),
            },
        });

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""kicked":true"#));
        assert!(!json.contains("subscription_id"));
    }

    #[test]
    fn failed_ack_is_still_received() {
        let response = WebhookResponse::from(WebhookAck::Failed {
            event_id: "evt_1".to_string(),
            error: "link: database unavailable".to_string(),
        });

        assert!(response.received);
        assert_eq!(response.status, "failed");
        assert_eq!(response.event_id.as_deref(), Some("evt_1"));
    }

    #[test]
    fn skipped_ack_has_no_event_id() {
        let json = serde_json::to_value(WebhookResponse::from(WebhookAck::Skipped)).unwrap();
        assert_eq!(json, serde_json::json!({"received": true, "status": "skipped"}));
    }
}
