//! PostgreSQL adapters - Database implementations for the storage ports.
//!
//! - `PostgresCustomerRegistry` - (payer, trainer) → billing customer
//! - `PostgresSubscriptionLedger` - latest subscription state per id
//! - `PostgresMembershipLinker` - trainer members join table + back-reference
//! - `PostgresPayerDirectory` - payer email lookups
//! - `PostgresTierCatalog` - trainer tier prices
//! - `PostgresWebhookEventRepository` - webhook idempotency and dead letters

mod customer_registry;
mod membership_linker;
mod payer_directory;
mod subscription_ledger;
mod tier_catalog;
mod webhook_event_repository;

pub use customer_registry::PostgresCustomerRegistry;
pub use membership_linker::PostgresMembershipLinker;
pub use payer_directory::PostgresPayerDirectory;
pub use subscription_ledger::PostgresSubscriptionLedger;
pub use tier_catalog::PostgresTierCatalog;
pub use webhook_event_repository::PostgresWebhookEventRepository;

use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};

/// Maps a sqlx failure to a `DatabaseError` naming the attempted action.
fn db_error(action: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| {
        tracing::error!(action, error = %e, "Database operation failed");
        DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, e))
    }
}

/// A stored value that no longer passes domain validation.
fn corrupt_row(e: ValidationError) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Invalid stored value: {}", e))
}
