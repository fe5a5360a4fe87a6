//! Payment configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Stripe configuration.
///
/// Both keys are optional. Without an API key the billing handlers fail
/// with a configuration error; without a webhook secret deliveries are
/// acknowledged and skipped.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub stripe_api_key: Option<SecretString>,

    pub stripe_webhook_secret: Option<SecretString>,

    #[serde(default = "default_api_base_url")]
    pub stripe_api_base_url: String,

    /// Reject webhook events whose `livemode` is false.
    #[serde(default)]
    pub require_livemode: bool,
}

impl PaymentConfig {
    pub fn is_test_mode(&self) -> bool {
        self.api_key_has_prefix("sk_test_")
    }

    pub fn is_live_mode(&self) -> bool {
        self.api_key_has_prefix("sk_live_")
    }

    pub fn is_configured(&self) -> bool {
        self.stripe_api_key.is_some()
    }

    fn api_key_has_prefix(&self, prefix: &str) -> bool {
        self.stripe_api_key
            .as_ref()
            .is_some_and(|k| k.expose_secret().starts_with(prefix))
    }

    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if let Some(key) = &self.stripe_api_key {
            let key = key.expose_secret();
            if !key.starts_with("sk_") && !key.starts_with("rk_") {
                return Err(ValidationError::InvalidStripeKey);
            }
        }
        if let Some(secret) = &self.stripe_webhook_secret {
            if !secret.expose_secret().starts_with("whsec_") {
                return Err(ValidationError::InvalidStripeWebhookSecret);
            }
        }
        if *environment == Environment::Production
            && !self.stripe_api_base_url.starts_with("https://")
        {
            return Err(ValidationError::StripeBaseUrlMustBeHttps);
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            stripe_api_key: None,
            stripe_webhook_secret: None,
            stripe_api_base_url: default_api_base_url(),
            require_livemode: false,
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.stripe.com".to_string()
}
