//! OpenPortalHandler - opens the billing platform's self-service portal.

use std::sync::Arc;

use crate::domain::billing::{normalize_email, BillingError, CustomerRecord};
use crate::domain::foundation::{AuthenticatedUser, CustomerId, PayerId, TrainerId};
use crate::ports::{BillingProvider, CreateCustomerRequest, CustomerRegistry, PayerDirectory};

use super::payer_resolver::caller_email;

#[derive(Debug, Clone)]
pub struct OpenPortalCommand {
    pub caller: AuthenticatedUser,
    pub trainer_id: TrainerId,
    pub return_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPortalResult {
    pub portal_url: String,
    pub customer_id: CustomerId,
}

/// Handler for billing portal sessions.
///
/// Customer lookup order:
/// 1. the caller's own customer for this trainer
/// 2. a legacy customer of this trainer whose upstream email matches the
///    caller's, so one payer can never open another's portal
/// 3. a freshly created customer, recorded in the registry
pub struct OpenPortalHandler {
    registry: Arc<dyn CustomerRegistry>,
    directory: Arc<dyn PayerDirectory>,
    provider: Arc<dyn BillingProvider>,
}

impl OpenPortalHandler {
    pub fn new(
        registry: Arc<dyn CustomerRegistry>,
        directory: Arc<dyn PayerDirectory>,
        provider: Arc<dyn BillingProvider>,
    ) -> Self {
        Self {
            registry,
            directory,
            provider,
        }
    }

    pub async fn handle(&self, cmd: OpenPortalCommand) -> Result<OpenPortalResult, BillingError> {
        if cmd.return_url.trim().is_empty() {
            return Err(BillingError::Validation("return_url is required".to_string()));
        }

        let payer_id = cmd.caller.as_payer();
        let customer_id = match self.registry.find_customer(&payer_id, &cmd.trainer_id).await? {
            Some(customer_id) => customer_id,
            None => {
                let email = caller_email(self.directory.as_ref(), &cmd.caller).await?;
                match self.legacy_customer(&cmd.trainer_id, email.as_deref()).await? {
                    Some(customer_id) => customer_id,
                    None => self.provision(&cmd.trainer_id, &payer_id, email).await?,
                }
            }
        };

        let session = self
            .provider
            .create_portal_session(&customer_id, &cmd.return_url)
            .await?;

        tracing::info!(
            customer_id = %customer_id,
            trainer_id = %cmd.trainer_id,
            "Billing portal session created"
        );

        Ok(OpenPortalResult {
            portal_url: session.url,
            customer_id,
        })
    }

    async fn legacy_customer(
        &self,
        trainer_id: &TrainerId,
        email: Option<&str>,
    ) -> Result<Option<CustomerId>, BillingError> {
        let Some(email) = email else {
            return Ok(None);
        };
        let Some(candidate) = self.registry.find_any_customer_for_trainer(trainer_id).await? else {
            return Ok(None);
        };

        let upstream = self.provider.get_customer(&candidate).await?;
        let matches = upstream
            .and_then(|c| c.email)
            .and_then(|e| normalize_email(&e))
            .is_some_and(|e| e == email);

        if matches {
            Ok(Some(candidate))
        } else {
            tracing::debug!(
                customer_id = %candidate,
                trainer_id = %trainer_id,
                "Legacy customer email does not match caller"
            );
            Ok(None)
        }
    }

    async fn provision(
        &self,
        trainer_id: &TrainerId,
        payer_id: &PayerId,
        email: Option<String>,
    ) -> Result<CustomerId, BillingError> {
        let email = email.ok_or_else(|| {
            BillingError::Validation("an email address is required to open billing".to_string())
        })?;

        let customer = self
            .provider
            .create_customer(CreateCustomerRequest {
                email,
                trainer_id: trainer_id.clone(),
                payer_id: payer_id.clone(),
            })
            .await?;

        self.registry
            .upsert_customer(&CustomerRecord::new(
                customer.id.clone(),
                trainer_id.clone(),
                payer_id.clone(),
            ))
            .await?;

        tracing::info!(
            customer_id = %customer.id,
            trainer_id = %trainer_id,
            payer_id = %payer_id,
            "Billing customer provisioned for portal"
        );
        Ok(customer.id)
    }
}
