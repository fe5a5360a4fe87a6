//! Ports - Interfaces between the application core and the outside world.
//!
//! Storage ports return `DomainError`; the billing provider returns
//! `PaymentError` (and `WebhookError` for verification) so callers can tell
//! configuration, network and platform failures apart.

mod billing_provider;
mod customer_registry;
mod membership_linker;
mod payer_directory;
mod session_validator;
mod subscription_ledger;
mod tier_catalog;
mod webhook_event_repository;

pub use billing_provider::{
    BillingProvider, CheckoutSession, CheckoutSessionDetails, CreateCheckoutRequest,
    CreateCustomerRequest, PaymentError, PaymentErrorCode, PortalSession, ProviderCustomer,
    UpdateSubscriptionRequest,
};
pub use customer_registry::CustomerRegistry;
pub use membership_linker::{MembershipLinker, UnlinkOutcome};
pub use payer_directory::PayerDirectory;
pub use session_validator::SessionValidator;
pub use subscription_ledger::SubscriptionLedger;
pub use tier_catalog::TierCatalog;
pub use webhook_event_repository::{
    SaveResult, WebhookEventRecord, WebhookEventRepository, WebhookEventResult,
};
