//! Billing error taxonomy.

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, TrainerId, ValidationError};

/// Errors raised by the reconciliation core and the billing handlers.
#[derive(Debug, Clone, Error)]
pub enum BillingError {
    /// Required credentials or endpoints are absent.
    #[error("Billing is not configured: {0}")]
    MissingConfiguration(String),

    /// No payer identity could be determined.
    #[error("Could not determine the payer for this billing operation")]
    UnresolvedPayer,

    /// Finalize was called for a trainer other than the one on the session.
    #[error("Checkout session does not belong to this trainer")]
    TrainerMismatch,

    /// Finalize was called by someone other than the payer on the session.
    #[error("Checkout session does not belong to the caller")]
    PayerMismatch,

    /// The checkout session has not completed yet.
    #[error("Checkout session {0} is not complete")]
    CheckoutIncomplete(String),

    /// The caller already holds an active subscription with this trainer.
    #[error("Already subscribed to trainer {0}")]
    AlreadySubscribed(TrainerId),

    /// The caller may not act on this trainer's members.
    #[error("Only the trainer can perform this action")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// The billing platform failed or returned malformed data.
    #[error("Billing platform error: {0}")]
    UpstreamBilling(String),

    /// A data store write or read failed.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl BillingError {
    pub fn not_found(what: impl Into<String>) -> Self {
        BillingError::NotFound(what.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        BillingError::UpstreamBilling(message.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::MissingConfiguration(_) => "MISSING_CONFIGURATION",
            BillingError::UnresolvedPayer => "UNRESOLVED_PAYER",
            BillingError::TrainerMismatch => "TRAINER_MISMATCH",
            BillingError::PayerMismatch => "PAYER_MISMATCH",
            BillingError::CheckoutIncomplete(_) => "CHECKOUT_INCOMPLETE",
            BillingError::AlreadySubscribed(_) => "ALREADY_SUBSCRIBED",
            BillingError::Forbidden => "FORBIDDEN",
            BillingError::NotFound(_) => "NOT_FOUND",
            BillingError::Validation(_) => "VALIDATION_FAILED",
            BillingError::UpstreamBilling(_) => "UPSTREAM_BILLING_ERROR",
            BillingError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    /// Whether the failure is on our side or upstream rather than the caller's.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            BillingError::MissingConfiguration(_)
                | BillingError::UpstreamBilling(_)
                | BillingError::Persistence(_)
        )
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => BillingError::Validation(err.message),
            ErrorCode::PaymentProviderError => BillingError::UpstreamBilling(err.message),
            ErrorCode::CustomerNotFound
            | ErrorCode::SubscriptionNotFound
            | ErrorCode::PayerNotFound => BillingError::NotFound(err.message),
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                BillingError::Persistence(err.message)
            }
        }
    }
}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        BillingError::Validation(err.to_string())
    }
}
