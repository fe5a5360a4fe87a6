//! Session validation port for bearer token validation.
//!
//! Provider-agnostic: the JWT adapter validates tokens issued by the hosted
//! auth provider, the mock adapter serves tests.
//!
//! All implementations MUST validate the token signature and expiry, and
//! the audience when one is configured.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, AuthenticatedUser};

/// Validates access tokens and extracts user identity.
///
/// # Contract
///
/// - `AuthError::InvalidToken` for malformed or badly signed tokens
/// - `AuthError::TokenExpired` for expired tokens
/// - `AuthError::ServiceUnavailable` for transient errors
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Validate a raw token (without the "Bearer " prefix).
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}
