//! HandleBillingWebhookHandler - verifies, deduplicates and reconciles
//! billing platform webhooks.

use std::sync::Arc;

use crate::domain::billing::{
    BillingError, BillingEvent, CheckoutCompletion, PayerHint, SubscriptionSnapshot,
    WebhookEnvelope, WebhookError,
};
use crate::domain::foundation::{CustomerId, SubscriptionId};
use crate::ports::{BillingProvider, CustomerRegistry, WebhookEventRecord, WebhookEventRepository};

use super::outcome::{summarize, FailurePolicy};
use super::reconcile::{BillingSignal, ReconciliationEngine, SnapshotSource};

/// Command to handle a billing webhook.
#[derive(Debug, Clone)]
pub struct HandleBillingWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    /// `Stripe-Signature` header value.
    pub signature: String,
}

/// How a verified delivery was disposed of. Every variant is acknowledged
/// with a 2xx so the platform stops retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAck {
    Processed { event_id: String },
    /// A final record already exists for this event id.
    AlreadyProcessed { event_id: String },
    Ignored { event_id: String },
    /// Recorded as failed for operator replay.
    Failed { event_id: String, error: String },
    /// No signing secret is configured; nothing was verified or processed.
    Skipped,
}

/// Handler for billing webhooks.
///
/// Signature problems are the only errors returned to the caller. Once an
/// event is verified, processing failures are recorded on the event store
/// instead so that a retry storm cannot amplify a local outage.
pub struct HandleBillingWebhookHandler {
    provider: Arc<dyn BillingProvider>,
    registry: Arc<dyn CustomerRegistry>,
    events: Arc<dyn WebhookEventRepository>,
    reconciler: ReconciliationEngine,
}

impl HandleBillingWebhookHandler {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        registry: Arc<dyn CustomerRegistry>,
        events: Arc<dyn WebhookEventRepository>,
        reconciler: ReconciliationEngine,
    ) -> Self {
        Self {
            provider,
            registry,
            events,
            reconciler,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandleBillingWebhookCommand,
    ) -> Result<WebhookAck, WebhookError> {
        // 1. Verify signature and decode
        let envelope = match self.provider.verify_webhook(&cmd.payload, &cmd.signature).await {
            Ok(envelope) => envelope,
            Err(WebhookError::MissingSecret) => {
                tracing::warn!("Webhook signing secret not configured, skipping delivery");
                return Ok(WebhookAck::Skipped);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rejected webhook delivery");
                return Err(e);
            }
        };

        let event_id = envelope.event_id.clone();
        let event_type = envelope.event_type.clone();

        // 2. Deduplicate on event id
        match self.events.find_by_event_id(&event_id).await {
            Ok(Some(existing)) if existing.result.is_final() => {
                tracing::info!(
                    event_id = %event_id,
                    event_type = %event_type,
                    "Duplicate webhook event, already processed"
                );
                return Ok(WebhookAck::AlreadyProcessed { event_id });
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    event_id = %event_id,
                    error = %e,
                    "Webhook dedupe lookup failed, processing anyway"
                );
            }
        }

        tracing::info!(event_id = %event_id, event_type = %event_type, "Processing webhook event");

        // 3. Dispatch and record
        let payload = serde_json::from_slice(&cmd.payload).unwrap_or(serde_json::Value::Null);
        let (ack, record) = match self.dispatch(&envelope).await {
            Ok(Disposition::Done) => (
                WebhookAck::Processed {
                    event_id: event_id.clone(),
                },
                WebhookEventRecord::success(&event_id, &event_type, payload),
            ),
            Ok(Disposition::Ignored(reason)) => (
                WebhookAck::Ignored {
                    event_id: event_id.clone(),
                },
                WebhookEventRecord::ignored(&event_id, &event_type, reason, payload),
            ),
            Err(error) => {
                tracing::error!(
                    event_id = %event_id,
                    event_type = %event_type,
                    error = %error,
                    "Webhook event processing failed"
                );
                (
                    WebhookAck::Failed {
                        event_id: event_id.clone(),
                        error: error.clone(),
                    },
                    WebhookEventRecord::failed(&event_id, &event_type, error, payload),
                )
            }
        };

        if let Err(e) = self.events.save(record).await {
            tracing::error!(event_id = %event_id, error = %e, "Failed to record webhook event");
        }

        Ok(ack)
    }

    /// Returns `Err` with the message to store on a failed record.
    async fn dispatch(&self, envelope: &WebhookEnvelope) -> Result<Disposition, String> {
        match &envelope.event {
            BillingEvent::CheckoutCompleted(completion) => {
                self.checkout_completed(completion).await
            }
            BillingEvent::SubscriptionChanged { snapshot, .. } => {
                self.subscription_changed(snapshot).await
            }
            BillingEvent::SubscriptionDeleted {
                subscription_id,
                customer_id,
            } => self.subscription_deleted(subscription_id, customer_id).await,
            BillingEvent::Malformed { reason } => Err(reason.clone()),
            BillingEvent::Unhandled => Ok(Disposition::Ignored(format!(
                "event type {} is not handled",
                envelope.event_type
            ))),
        }
    }

    async fn checkout_completed(
        &self,
        completion: &CheckoutCompletion,
    ) -> Result<Disposition, String> {
        let signal = BillingSignal {
            customer_id: completion.customer_id.clone(),
            subscription_id: completion.subscription_id.clone(),
            trainer_id: completion.trainer_id.clone(),
            payer: PayerHint::new()
                .with_explicit(completion.payer_id.clone())
                .with_email(completion.customer_email.clone())
                .with_customer(completion.customer_id.clone()),
            tier_key: completion.tier_key.clone(),
            snapshot: SnapshotSource::Live,
        };
        self.reconcile(signal).await
    }

    /// Trainer and payer come from subscription metadata, falling back to the
    /// customer registry for subscriptions created without it.
    async fn subscription_changed(
        &self,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<Disposition, String> {
        let known = match self.registry.find_by_customer_id(&snapshot.customer_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    customer_id = %snapshot.customer_id,
                    error = %e,
                    "Customer registry lookup failed"
                );
                None
            }
        };

        let trainer_id = snapshot
            .trainer_id
            .clone()
            .or_else(|| known.as_ref().map(|r| r.trainer_id.clone()))
            .ok_or_else(|| {
                format!(
                    "no trainer known for customer {}",
                    snapshot.customer_id
                )
            })?;
        let explicit = snapshot
            .payer_id
            .clone()
            .or_else(|| known.map(|r| r.payer_id));

        let signal = BillingSignal {
            customer_id: snapshot.customer_id.clone(),
            subscription_id: Some(snapshot.subscription_id.clone()),
            trainer_id,
            payer: PayerHint::new()
                .with_explicit(explicit)
                .with_customer(snapshot.customer_id.clone()),
            tier_key: snapshot.tier_key.clone(),
            snapshot: SnapshotSource::Live,
        };
        self.reconcile(signal).await
    }

    async fn subscription_deleted(
        &self,
        subscription_id: &SubscriptionId,
        customer_id: &CustomerId,
    ) -> Result<Disposition, String> {
        let report = self
            .reconciler
            .unlink_engine()
            .unlink_by_customer(
                customer_id,
                Some(subscription_id.clone()),
                FailurePolicy::Isolated,
            )
            .await
            .map_err(|e| e.to_string())?;

        if report.is_clean() {
            Ok(Disposition::Done)
        } else {
            Err(summarize(&report.failures))
        }
    }

    async fn reconcile(&self, signal: BillingSignal) -> Result<Disposition, String> {
        let outcome = self
            .reconciler
            .reconcile(signal, FailurePolicy::Isolated)
            .await
            .map_err(|e: BillingError| e.to_string())?;

        if outcome.is_clean() {
            Ok(Disposition::Done)
        } else {
            Err(summarize(&outcome.failures))
        }
    }
}

enum Disposition {
    Done,
    Ignored(String),
}
