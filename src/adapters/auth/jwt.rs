//! HS256 JWT adapter for the `SessionValidator` port.
//!
//! Tokens are issued by the main application's auth service and signed with
//! a shared secret. Validation checks:
//!
//! - **Signature**: HMAC-SHA256 with the configured secret
//! - **Expiry (exp)**: must be in the future
//! - **Audience (aud)** and **Issuer (iss)**: only when configured
//!
//! The `sub` claim becomes the caller's user id, which is also their payer
//! id and, for trainers, their trainer id.

use async_trait::async_trait;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AuthError, AuthenticatedUser, UserId};
use crate::ports::SessionValidator;

/// Configuration for the JWT validator.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: SecretString,
    pub audience: Option<String>,
    pub issuer: Option<String>,
}

impl JwtConfig {
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            audience: None,
            issuer: None,
        }
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn from_auth_config(config: &crate::config::AuthConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            audience: config.jwt_audience.clone(),
            issuer: config.jwt_issuer.clone(),
        }
    }
}

/// Claims read from access tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

pub struct JwtSessionValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtSessionValidator {
    pub fn new(config: JwtConfig) -> Self {
        let key = DecodingKey::from_secret(config.secret.expose_secret().as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.leeway = 30;
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Self { key, validation }
    }
}

#[async_trait]
impl SessionValidator for JwtSessionValidator {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let data = decode::<AccessClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => {
                    tracing::debug!(error = %e, "Rejected access token");
                    AuthError::InvalidToken
                }
            }
        })?;

        let id = UserId::new(data.claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthenticatedUser::new(id, data.claims.email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-with-enough-entropy";

    fn token(claims: &AccessClaims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims(exp_offset: i64) -> AccessClaims {
        AccessClaims {
            sub: "U1".to_string(),
            exp: chrono::Utc::now().timestamp() + exp_offset,
            email: Some("u1@example.com".to_string()),
            aud: Some("trainer-billing".to_string()),
            iss: None,
        }
    }

    fn validator() -> JwtSessionValidator {
        JwtSessionValidator::new(
            JwtConfig::new(SecretString::new(SECRET.to_string())).with_audience("trainer-billing"),
        )
    }

    #[tokio::test]
    async fn valid_token_yields_caller() {
        let user = validator().validate(&token(&claims(3600), SECRET)).await.unwrap();

        assert_eq!(user.id.as_str(), "U1");
        assert_eq!(user.email.as_deref(), Some("u1@example.com"));
    }

    #[tokio::test]
    async fn expired_token_is_reported_as_expired() {
        let err = validator()
            .validate(&token(&claims(-3600), SECRET))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn wrong_secret_is_invalid() {
        let err = validator()
            .validate(&token(&claims(3600), "some-other-secret"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn wrong_audience_is_invalid() {
        let mut c = claims(3600);
        c.aud = Some("another-service".to_string());

        let err = validator().validate(&token(&c, SECRET)).await.unwrap_err();

        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn garbage_is_invalid() {
        let err = validator().validate("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }
}
