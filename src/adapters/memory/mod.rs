//! In-memory adapters.
//!
//! Used by tests and by local runs without a database. Each store keeps its
//! state behind a `tokio::sync::RwLock`.

mod customer_registry;
mod membership_linker;
mod payer_directory;
mod subscription_ledger;
mod tier_catalog;
mod webhook_event_repository;

pub use customer_registry::InMemoryCustomerRegistry;
pub use membership_linker::InMemoryMembershipLinker;
pub use payer_directory::InMemoryPayerDirectory;
pub use subscription_ledger::InMemorySubscriptionLedger;
pub use tier_catalog::InMemoryTierCatalog;
pub use webhook_event_repository::InMemoryWebhookEventRepository;
