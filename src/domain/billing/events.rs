//! Billing events delivered by the payment platform.
//!
//! Webhook bodies arrive as loosely typed JSON. The provider adapter
//! validates each variant's required fields and produces one of these
//! variants; anything it cannot make sense of becomes `Malformed` or
//! `Unhandled` instead of a half-filled struct.

use crate::domain::foundation::{CustomerId, PayerId, SubscriptionId, TrainerId};

use super::SubscriptionSnapshot;

/// A verified webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEnvelope {
    /// Platform event id (`evt_...`), the idempotency key.
    pub event_id: String,

    /// Raw platform event type, kept for logging and the event store.
    pub event_type: String,

    /// Unix seconds at which the platform created the event.
    pub created: i64,

    pub event: BillingEvent,
}

/// Discriminated union over the events the reconciliation core consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    /// `checkout.session.completed`
    CheckoutCompleted(CheckoutCompletion),

    /// `customer.subscription.created` / `customer.subscription.updated`
    SubscriptionChanged {
        kind: SubscriptionChange,
        snapshot: SubscriptionSnapshot,
    },

    /// `customer.subscription.deleted`
    SubscriptionDeleted {
        subscription_id: SubscriptionId,
        customer_id: CustomerId,
    },

    /// A known event type whose payload failed validation.
    Malformed { reason: String },

    /// An event type the core does not act on.
    Unhandled,
}

impl BillingEvent {
    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            BillingEvent::CheckoutCompleted(_) => "checkout_completed",
            BillingEvent::SubscriptionChanged {
                kind: SubscriptionChange::Created,
                ..
            } => "subscription_created",
            BillingEvent::SubscriptionChanged {
                kind: SubscriptionChange::Updated,
                ..
            } => "subscription_updated",
            BillingEvent::SubscriptionDeleted { .. } => "subscription_deleted",
            BillingEvent::Malformed { .. } => "malformed",
            BillingEvent::Unhandled => "unhandled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChange {
    Created,
    Updated,
}

/// A completed checkout session.
///
/// `trainer_id` comes from session metadata and is required; `payer_id`
/// may be absent on sessions created before it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutCompletion {
    pub session_id: String,
    pub customer_id: CustomerId,
    pub subscription_id: Option<SubscriptionId>,
    pub trainer_id: TrainerId,
    pub tier_key: Option<String>,
    pub payer_id: Option<PayerId>,
    pub customer_email: Option<String>,
}
