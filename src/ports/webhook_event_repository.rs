//! WebhookEventRepository port - processed webhook deliveries.
//!
//! Serves two purposes: idempotency (an event recorded as `success` or
//! `ignored` is not processed again) and a dead-letter trail (`failed`
//! rows keep the payload and error for replay or inspection).
//!
//! ## Why Webhook Idempotency Matters
//!
//! The platform may deliver the same webhook multiple times due to:
//! - Network timeouts
//! - Our endpoint returning success but the platform not receiving it
//! - Manual redelivery from the dashboard
//!
//! Reconciliation is idempotent on its own; the record mostly saves work
//! and gives operators a view of what failed.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::foundation::DomainError;

/// How processing of an event ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventResult {
    Success,
    Ignored,
    Failed,
}

impl WebhookEventResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventResult::Success => "success",
            WebhookEventResult::Ignored => "ignored",
            WebhookEventResult::Failed => "failed",
        }
    }

    /// Parse the stored column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(WebhookEventResult::Success),
            "ignored" => Some(WebhookEventResult::Ignored),
            "failed" => Some(WebhookEventResult::Failed),
            _ => None,
        }
    }

    /// Finished events are skipped on redelivery; failed ones are retried.
    pub fn is_final(&self) -> bool {
        !matches!(self, WebhookEventResult::Failed)
    }
}

impl fmt::Display for WebhookEventResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of a processed webhook event.
#[derive(Debug, Clone)]
pub struct WebhookEventRecord {
    /// Platform event ID (evt_xxx format).
    pub event_id: String,

    /// Type of platform event (e.g., "checkout.session.completed").
    pub event_type: String,

    /// When the event was processed.
    pub processed_at: DateTime<Utc>,

    pub result: WebhookEventResult,

    /// Reason for `ignored`, joined step errors for `failed`.
    pub error_message: Option<String>,

    /// Original event payload for debugging and replay.
    pub payload: serde_json::Value,
}

impl WebhookEventRecord {
    fn with_result(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        result: WebhookEventResult,
        error_message: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            processed_at: Utc::now(),
            result,
            error_message,
            payload,
        }
    }

    /// Creates a new success record.
    pub fn success(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::with_result(event_id, event_type, WebhookEventResult::Success, None, payload)
    }

    /// Creates a new ignored record.
    pub fn ignored(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        reason: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::with_result(
            event_id,
            event_type,
            WebhookEventResult::Ignored,
            Some(reason.into()),
            payload,
        )
    }

    /// Creates a new failure record.
    pub fn failed(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        error: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::with_result(
            event_id,
            event_type,
            WebhookEventResult::Failed,
            Some(error.into()),
            payload,
        )
    }
}

/// Result of attempting to save a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// Record was inserted, or replaced an earlier `failed` record.
    Inserted,
    /// A final (`success`/`ignored`) record already exists.
    AlreadyExists,
}

/// Port for storing and retrieving processed webhook events.
///
/// Implementations should use database constraints (PRIMARY KEY on event_id)
/// to prevent race conditions during concurrent webhook processing.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Find a previously processed event by its platform event ID.
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Save a webhook event record.
    ///
    /// A new event id is inserted. An existing `failed` record is replaced,
    /// so a successful replay clears the dead letter. A final record is
    /// left untouched and `SaveResult::AlreadyExists` is returned.
    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError>;

    /// Most recent `failed` records, newest first.
    async fn list_failed(&self, limit: u32) -> Result<Vec<WebhookEventRecord>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_event_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn WebhookEventRepository) {}
    }

    #[test]
    fn success_record_has_correct_fields() {
        let record = WebhookEventRecord::success(
            "evt_123",
            "checkout.session.completed",
            serde_json::json!({"id": "test"}),
        );

        assert_eq!(record.event_id, "evt_123");
        assert_eq!(record.event_type, "checkout.session.completed");
        assert_eq!(record.result, WebhookEventResult::Success);
        assert!(record.error_message.is_none());
    }

    #[test]
    fn ignored_record_includes_reason() {
        let record = WebhookEventRecord::ignored(
            "evt_456",
            "invoice.paid",
            "Unhandled event type",
            serde_json::json!({}),
        );

        assert_eq!(record.result, WebhookEventResult::Ignored);
        assert_eq!(record.error_message.as_deref(), Some("Unhandled event type"));
    }

    #[test]
    fn failed_record_includes_error() {
        let record = WebhookEventRecord::failed(
            "evt_789",
            "customer.subscription.updated",
            "ledger: connection reset",
            serde_json::json!({}),
        );

        assert_eq!(record.result, WebhookEventResult::Failed);
        assert!(!record.result.is_final());
    }

    #[test]
    fn result_parses_stored_values() {
        for result in [
            WebhookEventResult::Success,
            WebhookEventResult::Ignored,
            WebhookEventResult::Failed,
        ] {
            assert_eq!(WebhookEventResult::parse(result.as_str()), Some(result));
        }
        assert_eq!(WebhookEventResult::parse("pending"), None);
    }
}
