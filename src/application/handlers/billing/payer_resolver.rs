//! Determines which payer a billing event or request belongs to.

use std::sync::Arc;

use crate::domain::billing::{normalize_email, BillingError, PayerHint, PayerSource};
use crate::domain::foundation::{AuthenticatedUser, PayerId};
use crate::ports::{BillingProvider, PayerDirectory};

/// Resolves a [`PayerHint`] to a payer id.
///
/// Strategies are tried in a fixed order and the first success wins:
/// explicit metadata, then the billing customer's email matched against the
/// payer directory, then the authenticated caller.
#[derive(Clone)]
pub struct PayerResolver {
    directory: Arc<dyn PayerDirectory>,
    provider: Arc<dyn BillingProvider>,
}

impl PayerResolver {
    pub fn new(directory: Arc<dyn PayerDirectory>, provider: Arc<dyn BillingProvider>) -> Self {
        Self {
            directory,
            provider,
        }
    }

    pub async fn resolve(&self, hint: &PayerHint) -> Result<(PayerId, PayerSource), BillingError> {
        for source in hint.strategies() {
            let found = match source {
                PayerSource::Explicit => hint.explicit.clone(),
                PayerSource::CustomerEmail => self.by_customer_email(hint).await?,
                PayerSource::AuthenticatedCaller => hint.caller.clone(),
            };

            if let Some(payer_id) = found {
                tracing::debug!(payer_id = %payer_id, source = ?source, "Payer resolved");
                return Ok((payer_id, source));
            }
        }

        Err(BillingError::UnresolvedPayer)
    }

    /// Inline email first, otherwise the email on the billing customer.
    ///
    /// A failed customer lookup only disqualifies this strategy; directory
    /// failures are storage errors and propagate.
    async fn by_customer_email(&self, hint: &PayerHint) -> Result<Option<PayerId>, BillingError> {
        let email = match (&hint.email, &hint.customer_id) {
            (Some(email), _) => Some(email.clone()),
            (None, Some(customer_id)) => match self.provider.get_customer(customer_id).await {
                Ok(customer) => customer
                    .and_then(|c| c.email)
                    .and_then(|e| normalize_email(&e)),
                Err(e) => {
                    tracing::warn!(
                        customer_id = %customer_id,
                        error = %e,
                        "Customer lookup failed during payer resolution"
                    );
                    None
                }
            },
            (None, None) => None,
        };

        match email {
            Some(email) => Ok(self.directory.find_by_email(&email).await?),
            None => Ok(None),
        }
    }
}

/// Email to put on a checkout or billing customer for the caller: the token
/// claim when present, otherwise the payer directory.
pub async fn caller_email(
    directory: &dyn PayerDirectory,
    caller: &AuthenticatedUser,
) -> Result<Option<String>, BillingError> {
    if let Some(email) = caller.email.as_deref().and_then(normalize_email) {
        return Ok(Some(email));
    }
    Ok(directory.email_for(&caller.as_payer()).await?)
}
