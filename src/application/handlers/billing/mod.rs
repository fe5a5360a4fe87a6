//! Billing handlers.
//!
//! The reconciliation core and the operations built on it.
//!
//! ## Core
//! - `ReconciliationEngine`: mirrors billing platform state into the
//!   customer registry, subscription ledger and membership relation
//! - `UnlinkEngine`: the inverse path on cancellation, expiry or kick
//! - `PayerResolver`: ordered payer resolution
//!
//! ## Commands
//! - Webhook receipt, checkout finalize, checkout creation
//! - Billing portal, tier change, member kick

mod change_tier;
mod create_checkout;
mod finalize_checkout;
mod handle_billing_webhook;
mod kick_member;
mod open_portal;
mod outcome;
mod payer_resolver;
mod reconcile;
mod unlink;

// Core
pub use outcome::{summarize, FailurePolicy, Step, StepFailure};
pub use payer_resolver::{caller_email, PayerResolver};
pub use reconcile::{
    BillingSignal, MembershipChange, ReconcileOutcome, ReconciliationEngine, SnapshotSource,
};
pub use unlink::{UnlinkEngine, UnlinkReport, UnlinkTarget};

// Commands
pub use change_tier::{ChangeTierCommand, ChangeTierHandler, ChangeTierResult};
pub use create_checkout::{CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult};
pub use finalize_checkout::{
    FinalizeCheckoutCommand, FinalizeCheckoutHandler, FinalizeCheckoutResult,
};
pub use handle_billing_webhook::{
    HandleBillingWebhookCommand, HandleBillingWebhookHandler, WebhookAck,
};
pub use kick_member::{KickMemberCommand, KickMemberHandler, KickMemberResult};
pub use open_portal::{OpenPortalCommand, OpenPortalHandler, OpenPortalResult};
