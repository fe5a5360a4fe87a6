//! Application handlers.
//!
//! Command handlers that orchestrate domain operations over the ports.

pub mod billing;

pub use billing::{
    // Core
    BillingSignal, FailurePolicy, PayerResolver, ReconcileOutcome, ReconciliationEngine,
    SnapshotSource, UnlinkEngine,
    // Commands and results
    ChangeTierCommand, ChangeTierHandler, ChangeTierResult,
    CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult,
    FinalizeCheckoutCommand, FinalizeCheckoutHandler, FinalizeCheckoutResult,
    HandleBillingWebhookCommand, HandleBillingWebhookHandler, WebhookAck,
    KickMemberCommand, KickMemberHandler, KickMemberResult,
    OpenPortalCommand, OpenPortalHandler, OpenPortalResult,
};
