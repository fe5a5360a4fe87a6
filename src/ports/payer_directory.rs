//! Payer directory port: email lookups against the user profile store.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, PayerId};

#[async_trait]
pub trait PayerDirectory: Send + Sync {
    /// Payer whose email matches, compared case-insensitively.
    async fn find_by_email(&self, email: &str) -> Result<Option<PayerId>, DomainError>;

    /// The payer's email on file.
    async fn email_for(&self, payer_id: &PayerId) -> Result<Option<String>, DomainError>;
}
