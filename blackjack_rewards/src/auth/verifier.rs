//! Credential verification with bounded retry.

use std::sync::Arc;
use std::time::Duration;

use super::errors::{AuthError, AuthResult};
use super::identity::{IdentityProvider, ProviderError};
use super::models::VerifiedIdentity;
use super::tokens::SessionTokenIssuer;

/// Retry policy for identity provider calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Deadline of a single attempt
    pub attempt_timeout: Duration,
    /// Pause before attempt `n + 1` is `backoff * n`
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            backoff: Duration::from_millis(200),
        }
    }
}

/// Verifies bearer credentials, provider-issued or self-issued
#[derive(Clone)]
pub struct CredentialVerifier {
    provider: Arc<dyn IdentityProvider>,
    tokens: SessionTokenIssuer,
    policy: RetryPolicy,
}

impl CredentialVerifier {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        tokens: SessionTokenIssuer,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            tokens,
            policy,
        }
    }

    /// Whether a real identity provider is installed
    pub fn provider_configured(&self) -> bool {
        self.provider.is_configured()
    }

    /// Verify a provider-issued credential
    ///
    /// Timeouts and transient failures are retried up to the policy's attempt
    /// count; rejections are final.
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidCredential` - Provider rejected the credential
    /// * `AuthError::VerificationTimeout` - Last attempt timed out
    /// * `AuthError::ProviderUnavailable` - Last attempt failed transiently
    pub async fn verify_provider(&self, token: &str) -> AuthResult<VerifiedIdentity> {
        if !self.provider.is_configured() {
            return Err(AuthError::ProviderUnavailable(
                "identity provider not configured".to_string(),
            ));
        }

        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = AuthError::VerificationTimeout;

        for attempt in 1..=attempts {
            let outcome =
                tokio::time::timeout(self.policy.attempt_timeout, self.provider.verify_id_token(token))
                    .await;

            match outcome {
                Ok(Ok(identity)) => return Ok(identity),
                Ok(Err(ProviderError::Rejected(reason))) => {
                    log::debug!("Provider rejected credential: {}", reason);
                    return Err(AuthError::InvalidCredential);
                }
                Ok(Err(ProviderError::Unavailable(reason))) => {
                    log::warn!(
                        "Identity provider unavailable (attempt {}/{}): {}",
                        attempt,
                        attempts,
                        reason
                    );
                    last_error = AuthError::ProviderUnavailable(reason);
                }
                Err(_) => {
                    log::warn!(
                        "Identity provider timed out after {:?} (attempt {}/{})",
                        self.policy.attempt_timeout,
                        attempt,
                        attempts
                    );
                    last_error = AuthError::VerificationTimeout;
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.policy.backoff * attempt).await;
            }
        }

        Err(last_error)
    }

    /// Verify a credential of either kind
    ///
    /// The provider is asked first; on failure the credential is tried as a
    /// self-issued session token with any `twoFAVerified` value.
    ///
    /// # Errors
    ///
    /// * `AuthError::VerificationTimeout` - Provider timed out and the
    ///   credential is not a valid session token
    /// * `AuthError::InvalidCredential` - Neither path accepted it
    pub async fn verify(&self, token: &str) -> AuthResult<VerifiedIdentity> {
        let provider_error = if self.provider.is_configured() {
            match self.verify_provider(token).await {
                Ok(identity) => return Ok(identity),
                Err(e) => Some(e),
            }
        } else {
            None
        };

        match self.tokens.decode(token) {
            Ok(claims) => Ok(claims.identity()),
            Err(_) => match provider_error {
                Some(AuthError::VerificationTimeout) => Err(AuthError::VerificationTimeout),
                _ => Err(AuthError::InvalidCredential),
            },
        }
    }
}
