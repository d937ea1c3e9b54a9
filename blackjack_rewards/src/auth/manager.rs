//! Login and verification orchestrator.

use std::sync::Arc;

use super::{
    errors::{AuthError, AuthResult},
    identity::IdentityProvider,
    models::{LoginOutcome, SessionClaims, TwoFactorSetup, VerifiedIdentity},
    tokens::SessionTokenIssuer,
    totp::TwoFactorEngine,
    verifier::{CredentialVerifier, RetryPolicy},
};
use crate::db::{Repositories, UserRepository};
use crate::rewards::RewardsManager;

/// Authentication manager
#[derive(Clone)]
pub struct AuthManager {
    users: Arc<dyn UserRepository>,
    verifier: CredentialVerifier,
    tokens: SessionTokenIssuer,
    two_factor: TwoFactorEngine,
    rewards: RewardsManager,
}

fn require<'a>(value: &'a str, field: &'static str) -> AuthResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AuthError::MissingField(field));
    }
    Ok(value)
}

impl AuthManager {
    /// Create a new authentication manager
    ///
    /// # Arguments
    ///
    /// * `repos` - User and code repositories
    /// * `provider` - Identity provider for first-factor credentials
    /// * `tokens` - Session token issuer
    /// * `policy` - Retry policy for provider calls
    /// * `rewards` - Ledger used to issue the welcome bonus
    pub fn new(
        repos: &Repositories,
        provider: Arc<dyn IdentityProvider>,
        tokens: SessionTokenIssuer,
        policy: RetryPolicy,
        rewards: RewardsManager,
    ) -> Self {
        Self {
            users: repos.users.clone(),
            verifier: CredentialVerifier::new(provider, tokens.clone(), policy),
            two_factor: TwoFactorEngine::new(repos.users.clone()),
            tokens,
            rewards,
        }
    }

    /// Whether a real identity provider is installed
    pub fn provider_configured(&self) -> bool {
        self.verifier.provider_configured()
    }

    /// Session token issuer
    pub fn tokens(&self) -> &SessionTokenIssuer {
        &self.tokens
    }

    /// Log in with a provider credential
    ///
    /// A first login creates the user and issues the welcome bonus. A
    /// returning user with 2FA receives only a pre-2FA token.
    ///
    /// # Returns
    ///
    /// * `AuthResult<LoginOutcome>` - New user, 2FA required, or returning user
    ///
    /// # Errors
    ///
    /// * `AuthError::MissingField` - Empty credential
    /// * `AuthError::InvalidCredential` - Provider rejected the credential
    /// * `AuthError::VerificationTimeout` / `AuthError::ProviderUnavailable`
    /// * `AuthError::Registration` - First login could not create the account
    pub async fn login(&self, provider_token: &str) -> AuthResult<LoginOutcome> {
        let provider_token = require(provider_token, "providerToken")?;
        let identity = self.verifier.verify_provider(provider_token).await?;
        let email = identity.email.as_str();

        if let Some(welcome) = self.rewards.register(email).await? {
            let token = self.tokens.issue(email, &identity.subject_id, true)?;
            log::info!("New user registered");
            return Ok(LoginOutcome::NewUser {
                token,
                welcome_code: welcome.code,
                welcome_email_sent: welcome.email_sent,
            });
        }

        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if user.two_factor_enabled {
            let temp_token = self.tokens.issue(email, &identity.subject_id, false)?;
            return Ok(LoginOutcome::TwoFactorRequired { temp_token });
        }

        let token = self.tokens.issue(email, &identity.subject_id, true)?;
        Ok(LoginOutcome::Returning { token })
    }

    /// Check that a provider credential belongs to `email` and the user exists
    ///
    /// # Errors
    ///
    /// * `AuthError::EmailMismatch` - Credential is for a different e-mail
    /// * `AuthError::UserNotFound` - No record for `email`
    pub async fn verify_token(
        &self,
        provider_token: &str,
        email: &str,
    ) -> AuthResult<VerifiedIdentity> {
        let provider_token = require(provider_token, "providerToken")?;
        let email = require(email, "email")?;

        let identity = self.verifier.verify_provider(provider_token).await?;
        if identity.email != email {
            return Err(AuthError::EmailMismatch);
        }

        if self.users.find_by_email(email).await?.is_none() {
            return Err(AuthError::UserNotFound);
        }

        Ok(identity)
    }

    /// Complete a 2FA login now
    pub async fn verify_two_factor(
        &self,
        email: &str,
        code: &str,
        temp_token: &str,
    ) -> AuthResult<String> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.verify_two_factor_at(email, code, temp_token, now).await
    }

    /// Complete a 2FA login against an explicit unix time
    ///
    /// This is the only path that turns a pre-2FA token into a full session.
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidCredential` - Temp token bad or expired
    /// * `AuthError::EmailMismatch` - Temp token issued for another e-mail
    /// * `AuthError::UserNotFound` / `AuthError::TwoFactorNotEnabled`
    /// * `AuthError::InvalidTwoFactorCode` - Wrong code
    pub async fn verify_two_factor_at(
        &self,
        email: &str,
        code: &str,
        temp_token: &str,
        unix_time: u64,
    ) -> AuthResult<String> {
        let email = require(email, "email")?;
        let code = require(code, "code")?;
        let temp_token = require(temp_token, "tempToken")?;

        let claims = self.tokens.decode(temp_token)?;
        if claims.email != email {
            return Err(AuthError::EmailMismatch);
        }

        if !self.two_factor.verify_at(email, code, unix_time).await? {
            return Err(AuthError::InvalidTwoFactorCode);
        }

        self.tokens.issue(email, &claims.uid, true)
    }

    /// Enroll the bearer in 2FA
    ///
    /// Accepts a provider credential or any self-issued token.
    pub async fn setup_two_factor(&self, bearer: &str) -> AuthResult<TwoFactorSetup> {
        let identity = self.authenticate(bearer).await?;
        self.two_factor.enroll(&identity.email).await
    }

    /// Identify the bearer of a provider credential or any self-issued token
    pub async fn authenticate(&self, bearer: &str) -> AuthResult<VerifiedIdentity> {
        let bearer = require(bearer, "token")?;
        self.verifier.verify(bearer).await
    }

    /// Require a full (2FA verified) session token
    pub fn require_full_session(&self, token: &str) -> AuthResult<SessionClaims> {
        self.tokens.require_full_session(token)
    }
}
