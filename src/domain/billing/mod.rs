//! Billing domain: subscription status, mirrored records, platform events
//! and the error taxonomy of the reconciliation core.

mod errors;
mod events;
mod payer_hint;
mod records;
mod status;
mod webhook_errors;

pub use errors::BillingError;
pub use events::{BillingEvent, CheckoutCompletion, SubscriptionChange, WebhookEnvelope};
pub use payer_hint::{normalize_email, PayerHint, PayerSource};
pub use records::{CustomerRecord, SubscriptionRecord, SubscriptionSnapshot, SubscriptionUpsert};
pub use status::{ActiveStatusSet, SubscriptionStatus};
pub use webhook_errors::WebhookError;
