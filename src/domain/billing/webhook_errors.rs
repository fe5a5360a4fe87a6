//! Webhook receiver errors.
//!
//! Only failures that happen before an event is trusted live here.
//! Once the signature checks out, reconciliation failures are recorded
//! against the event and the delivery is acknowledged.

use http::StatusCode;
use thiserror::Error;

/// Errors that occur while authenticating and decoding a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// No signing secret is configured, so deliveries cannot be verified.
    #[error("Webhook signing secret is not configured")]
    MissingSecret,

    /// Signature header absent or malformed.
    #[error("Invalid signature header: {0}")]
    InvalidHeader(String),

    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook timestamp is outside the acceptable window.
    #[error("Timestamp out of range: {0}")]
    TimestampOutOfRange(String),

    /// Test-mode event delivered to a live deployment.
    #[error("Test mode events not allowed")]
    LivemodeMismatch,

    /// Signed payload is not a valid event envelope.
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl WebhookError {
    /// Whether the platform should redeliver after this error.
    ///
    /// Nothing here heals on retry: a bad signature stays bad and a
    /// missing secret is a deployment problem.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Maps the error to the HTTP status returned to the platform.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // Acknowledge so the platform stops retrying an unverifiable endpoint.
            WebhookError::MissingSecret => StatusCode::OK,
            WebhookError::InvalidHeader(_)
            | WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange(_)
            | WebhookError::LivemodeMismatch
            | WebhookError::ParseError(_) => StatusCode::BAD_REQUEST,
        }
    }
}
