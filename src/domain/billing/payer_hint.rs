//! Inputs for resolving which payer a billing event belongs to.

use crate::domain::foundation::{CustomerId, PayerId};

/// Where a resolved payer id came from, in resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayerSource {
    /// Written into checkout or subscription metadata.
    Explicit,
    /// Matched by the billing customer's email against the payer directory.
    CustomerEmail,
    /// The authenticated caller of a synchronous request.
    AuthenticatedCaller,
}

/// Everything known about the payer before resolution.
///
/// The customer email may be carried inline (checkout `customer_details`)
/// or fetched lazily from the platform using `customer_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayerHint {
    pub explicit: Option<PayerId>,
    pub email: Option<String>,
    pub customer_id: Option<CustomerId>,
    pub caller: Option<PayerId>,
}

impl PayerHint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_explicit(mut self, payer: Option<PayerId>) -> Self {
        self.explicit = payer;
        self
    }

    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email.and_then(|e| normalize_email(&e));
        self
    }

    pub fn with_customer(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_caller(mut self, caller: PayerId) -> Self {
        self.caller = Some(caller);
        self
    }

    /// The strategies worth trying for this hint, first success wins.
    pub fn strategies(&self) -> Vec<PayerSource> {
        let mut order = Vec::with_capacity(3);
        if self.explicit.is_some() {
            order.push(PayerSource::Explicit);
        }
        if self.email.is_some() || self.customer_id.is_some() {
            order.push(PayerSource::CustomerEmail);
        }
        if self.caller.is_some() {
            order.push(PayerSource::AuthenticatedCaller);
        }
        order
    }
}

/// Lowercases and trims an email; blank input yields `None`.
pub fn normalize_email(email: &str) -> Option<String> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}
