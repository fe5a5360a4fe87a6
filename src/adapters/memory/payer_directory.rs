//! In-memory payer directory.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::normalize_email;
use crate::domain::foundation::{DomainError, PayerId};
use crate::ports::PayerDirectory;

/// Payer emails keyed by payer id. Emails are stored normalized.
#[derive(Default)]
pub struct InMemoryPayerDirectory {
    emails: RwLock<HashMap<PayerId, String>>,
}

impl InMemoryPayerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payer(mut self, payer_id: PayerId, email: &str) -> Self {
        if let Some(email) = normalize_email(email) {
            self.emails.get_mut().insert(payer_id, email);
        }
        self
    }

    pub async fn insert(&self, payer_id: PayerId, email: &str) {
        if let Some(email) = normalize_email(email) {
            self.emails.write().await.insert(payer_id, email);
        }
    }
}

#[async_trait]
impl PayerDirectory for InMemoryPayerDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<PayerId>, DomainError> {
        let Some(wanted) = normalize_email(email) else {
            return Ok(None);
        };
        let emails = self.emails.read().await;
        // lowest id wins when two profiles share an address
        Ok(emails
            .iter()
            .filter(|(_, stored)| **stored == wanted)
            .map(|(id, _)| id.clone())
            .min())
    }

    async fn email_for(&self, payer_id: &PayerId) -> Result<Option<String>, DomainError> {
        Ok(self.emails.read().await.get(payer_id).cloned())
    }
}
