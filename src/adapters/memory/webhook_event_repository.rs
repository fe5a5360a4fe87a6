//! In-memory webhook event store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::DomainError;
use crate::ports::{SaveResult, WebhookEventRecord, WebhookEventRepository, WebhookEventResult};

#[derive(Default)]
pub struct InMemoryWebhookEventRepository {
    events: RwLock<HashMap<String, WebhookEventRecord>>,
}

impl InMemoryWebhookEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryWebhookEventRepository {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        Ok(self.events.read().await.get(event_id).cloned())
    }

    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError> {
        let mut events = self.events.write().await;
        if let Some(existing) = events.get(&record.event_id) {
            if existing.result.is_final() {
                return Ok(SaveResult::AlreadyExists);
            }
        }
        events.insert(record.event_id.clone(), record);
        Ok(SaveResult::Inserted)
    }

    async fn list_failed(&self, limit: u32) -> Result<Vec<WebhookEventRecord>, DomainError> {
        let events = self.events.read().await;
        let mut failed: Vec<_> = events
            .values()
            .filter(|r| r.result == WebhookEventResult::Failed)
            .cloned()
            .collect();
        failed.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        failed.truncate(limit as usize);
        Ok(failed)
    }
}
