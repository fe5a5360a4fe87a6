//! Stripe wire types and their translation into billing domain types.
//!
//! These types mirror the Stripe objects the billing core reads, either in
//! webhook payloads or in API responses. Fields Stripe may omit are
//! `Option`/`#[serde(default)]`, so a newer API version does not break
//! deserialization. Required-field validation happens in the `to_*`
//! conversions, where a missing value becomes a `Malformed` event rather
//! than a parse failure of the whole delivery.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::billing::{
    normalize_email, BillingEvent, CheckoutCompletion, SubscriptionChange, SubscriptionSnapshot,
    SubscriptionStatus, WebhookEnvelope, WebhookError,
};
use crate::domain::foundation::{CustomerId, PayerId, SubscriptionId, Timestamp, TrainerId};
use crate::ports::CheckoutSessionDetails;

// ════════════════════════════════════════════════════════════════════════════════
// Signature Parsing
// ════════════════════════════════════════════════════════════════════════════════

/// Error parsing the Stripe-Signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureParseError {
    /// Header is empty or missing.
    MissingHeader,
    /// Missing timestamp component (t=...).
    MissingTimestamp,
    /// Missing v1 signature component.
    MissingV1Signature,
    /// Invalid timestamp format.
    InvalidTimestamp,
    /// Invalid signature format (not valid hex).
    InvalidSignatureFormat,
}

impl std::fmt::Display for SignatureParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "Missing Stripe-Signature header"),
            Self::MissingTimestamp => write!(f, "Missing timestamp (t=) in signature"),
            Self::MissingV1Signature => write!(f, "Missing v1 signature in header"),
            Self::InvalidTimestamp => write!(f, "Invalid timestamp format"),
            Self::InvalidSignatureFormat => write!(f, "Invalid signature format (not valid hex)"),
        }
    }
}

impl std::error::Error for SignatureParseError {}

impl From<SignatureParseError> for WebhookError {
    fn from(err: SignatureParseError) -> Self {
        WebhookError::InvalidHeader(err.to_string())
    }
}

/// Parsed Stripe-Signature header: `t=timestamp,v1=signature[,v1=...]`.
///
/// Stripe sends several `v1` entries while a signing secret is being
/// rolled; a delivery is valid if any of them matches.
#[derive(Debug, Clone)]
pub struct SignatureHeader {
    /// Unix timestamp when Stripe signed the delivery.
    pub timestamp: i64,

    /// v1 signatures (HMAC-SHA256, hex-decoded).
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        if header.trim().is_empty() {
            return Err(SignatureParseError::MissingHeader);
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or(SignatureParseError::MissingTimestamp)?;

            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse()
                            .map_err(|_| SignatureParseError::InvalidTimestamp)?,
                    );
                }
                "v1" => {
                    v1_signatures.push(
                        hex_decode(value.trim())
                            .ok_or(SignatureParseError::InvalidSignatureFormat)?,
                    );
                }
                // v0 and unknown schemes are ignored
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureParseError::MissingTimestamp)?;
        if v1_signatures.is_empty() {
            return Err(SignatureParseError::MissingV1Signature);
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if !hex.is_ascii() || hex.len() % 2 != 0 {
        return None;
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

/// Encode bytes to a lowercase hex string.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe Event Envelope
// ════════════════════════════════════════════════════════════════════════════════

/// Raw Stripe webhook event as received from the API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeWebhookEvent {
    /// Unique event identifier (evt_...).
    pub id: String,

    /// Event type (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp when the event was created.
    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,

    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The object affected by this event.
    pub object: serde_json::Value,

    /// Previous values for updated fields (on update events).
    pub previous_attributes: Option<serde_json::Value>,
}

impl StripeWebhookEvent {
    /// Translate the raw event into the domain union.
    ///
    /// Unknown event types are `Unhandled`. Known types whose object is
    /// missing a required field are `Malformed`.
    pub fn to_billing_event(&self) -> BillingEvent {
        let object = self.data.object.clone();
        let decoded = match self.event_type.as_str() {
            "checkout.session.completed" => serde_json::from_value::<StripeCheckoutSession>(object)
                .map_err(|e| format!("invalid checkout session: {}", e))
                .and_then(|session| session.to_completion())
                .map(BillingEvent::CheckoutCompleted),

            "customer.subscription.created" | "customer.subscription.updated" => {
                let kind = if self.event_type.ends_with("created") {
                    SubscriptionChange::Created
                } else {
                    SubscriptionChange::Updated
                };
                serde_json::from_value::<StripeSubscription>(object)
                    .map_err(|e| format!("invalid subscription: {}", e))
                    .and_then(|sub| sub.to_snapshot())
                    .map(|snapshot| BillingEvent::SubscriptionChanged { kind, snapshot })
            }

            "customer.subscription.deleted" => {
                serde_json::from_value::<StripeSubscriptionRef>(object)
                    .map_err(|e| format!("invalid subscription: {}", e))
                    .and_then(|sub| {
                        Ok(BillingEvent::SubscriptionDeleted {
                            subscription_id: SubscriptionId::new(sub.id)
                                .map_err(|e| e.to_string())?,
                            customer_id: CustomerId::new(sub.customer.id().to_string())
                                .map_err(|e| e.to_string())?,
                        })
                    })
            }

            _ => Ok(BillingEvent::Unhandled),
        };

        decoded.unwrap_or_else(|reason| BillingEvent::Malformed { reason })
    }
}

/// Decode a (verified) payload into a webhook envelope.
///
/// With `require_livemode`, test-mode events are rejected.
pub fn decode_webhook_payload(
    payload: &[u8],
    require_livemode: bool,
) -> Result<WebhookEnvelope, WebhookError> {
    let stripe_event: StripeWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
        tracing::warn!(error = %e, "Failed to parse webhook payload");
        WebhookError::ParseError(format!("Invalid JSON: {}", e))
    })?;

    if require_livemode && !stripe_event.livemode {
        tracing::warn!(
            event_id = %stripe_event.id,
            "Rejected test mode event in production"
        );
        return Err(WebhookError::LivemodeMismatch);
    }

    let event = stripe_event.to_billing_event();

    Ok(WebhookEnvelope {
        event_id: stripe_event.id,
        event_type: stripe_event.event_type,
        created: stripe_event.created,
        event,
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe Object Types
// ════════════════════════════════════════════════════════════════════════════════

/// A Stripe object reference that is either a bare id or, when requested
/// with `expand[]`, the full object.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(Box<T>),
}

/// Stripe objects that carry an `id`.
pub trait StripeObject {
    fn object_id(&self) -> &str;
}

impl<T: StripeObject> Expandable<T> {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object(object) => object.object_id(),
        }
    }

    pub fn as_object(&self) -> Option<&T> {
        match self {
            Expandable::Id(_) => None,
            Expandable::Object(object) => Some(object),
        }
    }
}

/// Stripe Checkout Session object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCheckoutSession {
    /// Unique session identifier (cs_...).
    pub id: String,

    pub customer: Option<Expandable<StripeCustomer>>,

    /// Email passed at creation when no customer was attached.
    pub customer_email: Option<String>,

    /// Details the buyer entered on the payment page.
    pub customer_details: Option<StripeCustomerDetails>,

    pub subscription: Option<Expandable<StripeSubscription>>,

    /// Session status (open, complete, expired).
    pub status: Option<String>,

    pub payment_status: Option<String>,

    pub mode: Option<String>,

    /// Hosted payment page URL, present while the session is open.
    pub url: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCustomerDetails {
    pub email: Option<String>,
}

impl StripeCheckoutSession {
    /// Best email for payer resolution: typed by the buyer, then passed at
    /// creation, then on the expanded customer.
    pub fn email(&self) -> Option<String> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.clone())
            .or_else(|| self.customer_email.clone())
            .or_else(|| {
                self.customer
                    .as_ref()
                    .and_then(|c| c.as_object())
                    .and_then(|c| c.email.clone())
            })
            .and_then(|e| normalize_email(&e))
    }

    pub fn is_complete(&self) -> bool {
        self.status.as_deref() == Some("complete")
    }

    fn customer_id(&self) -> Option<CustomerId> {
        self.customer
            .as_ref()
            .and_then(|c| CustomerId::new(c.id().to_string()).ok())
    }

    fn subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription
            .as_ref()
            .and_then(|s| SubscriptionId::new(s.id().to_string()).ok())
    }

    /// Webhook view: customer and `trainer_id` metadata are required.
    pub fn to_completion(&self) -> Result<CheckoutCompletion, String> {
        let customer_id = self
            .customer_id()
            .ok_or_else(|| "checkout session has no customer".to_string())?;
        let trainer_id = metadata_id(&self.metadata, "trainer_id", TrainerId::new)
            .ok_or_else(|| "checkout session metadata has no trainer_id".to_string())?;

        Ok(CheckoutCompletion {
            session_id: self.id.clone(),
            customer_id,
            subscription_id: self.subscription_id(),
            trainer_id,
            tier_key: metadata_value(&self.metadata, "tier_key"),
            payer_id: metadata_id(&self.metadata, "user_id", PayerId::new),
            customer_email: self.email(),
        })
    }

    /// Finalize view: nothing is required, the caller decides what a
    /// missing field means.
    pub fn to_details(&self) -> Result<CheckoutSessionDetails, String> {
        let subscription = match self.subscription.as_ref().and_then(|s| s.as_object()) {
            Some(sub) => Some(sub.to_snapshot()?),
            None => None,
        };

        Ok(CheckoutSessionDetails {
            id: self.id.clone(),
            complete: self.is_complete(),
            customer_id: self.customer_id(),
            customer_email: self.email(),
            trainer_id: metadata_id(&self.metadata, "trainer_id", TrainerId::new),
            payer_id: metadata_id(&self.metadata, "user_id", PayerId::new),
            tier_key: metadata_value(&self.metadata, "tier_key"),
            subscription,
        })
    }
}

/// Stripe Customer object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCustomer {
    /// Unique customer identifier (cus_...).
    pub id: String,

    pub email: Option<String>,

    pub name: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Deleted customers come back as `{id, object, deleted: true}`.
    #[serde(default)]
    pub deleted: bool,
}

impl StripeObject for StripeCustomer {
    fn object_id(&self) -> &str {
        &self.id
    }
}

/// Stripe Subscription object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscription {
    /// Unique subscription identifier (sub_...).
    pub id: String,

    pub customer: Expandable<StripeCustomer>,

    /// Subscription status.
    pub status: String,

    /// Current period end (Unix timestamp). Newer API versions report it
    /// per item instead.
    pub current_period_end: Option<i64>,

    #[serde(default)]
    pub cancel_at_period_end: bool,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    #[serde(default)]
    pub items: StripeSubscriptionItems,
}

impl StripeObject for StripeSubscription {
    fn object_id(&self) -> &str {
        &self.id
    }
}

impl StripeSubscription {
    /// The single item every trainer subscription carries.
    pub fn first_item(&self) -> Option<&StripeSubscriptionItem> {
        self.items.data.first()
    }

    pub fn to_snapshot(&self) -> Result<SubscriptionSnapshot, String> {
        let subscription_id = SubscriptionId::new(self.id.clone()).map_err(|e| e.to_string())?;
        let customer_id =
            CustomerId::new(self.customer.id().to_string()).map_err(|e| e.to_string())?;
        let status: SubscriptionStatus = self.status.parse().map_err(|e| {
            format!("subscription {}: {}", self.id, e)
        })?;

        let period_end = self
            .current_period_end
            .or_else(|| self.first_item().and_then(|i| i.current_period_end));

        Ok(SubscriptionSnapshot {
            subscription_id,
            customer_id,
            status,
            price_id: self.first_item().map(|i| i.price.id.clone()),
            current_period_end: period_end.and_then(Timestamp::from_unix_secs),
            cancel_at_period_end: self.cancel_at_period_end,
            trainer_id: metadata_id(&self.metadata, "trainer_id", TrainerId::new),
            payer_id: metadata_id(&self.metadata, "user_id", PayerId::new),
            tier_key: metadata_value(&self.metadata, "tier_key"),
        })
    }
}

/// Only the identifying fields, enough for deletion events.
#[derive(Debug, Clone, Deserialize)]
struct StripeSubscriptionRef {
    id: String,
    customer: Expandable<StripeCustomer>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeSubscriptionItems {
    #[serde(default)]
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscriptionItem {
    /// Item ID (si_...), needed to swap the price in place. Event payloads
    /// may omit it.
    #[serde(default)]
    pub id: Option<String>,

    pub price: StripePrice,

    pub current_period_end: Option<i64>,
}

/// Stripe Price object (embedded in subscription items).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePrice {
    pub id: String,
    pub product: Option<String>,
    pub unit_amount: Option<i64>,
    pub currency: Option<String>,
}

/// Error body Stripe returns on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    pub error: StripeErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
}

fn metadata_value(metadata: &HashMap<String, String>, key: &str) -> Option<String> {
    metadata
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn metadata_id<T, E>(
    metadata: &HashMap<String, String>,
    key: &str,
    parse: impl Fn(String) -> Result<T, E>,
) -> Option<T> {
    metadata_value(metadata, key).and_then(|v| parse(v).ok())
}
