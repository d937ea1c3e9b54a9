//! TOTP two-factor enrollment and verification.
//!
//! Codes are RFC 6238 (SHA-1, 6 digits, 30-second step) so any authenticator
//! app can scan the provisioning QR code. Verification accepts the current
//! step or one step either side and compares in constant time.

use chrono::Utc;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, Secret, TOTP};

use super::errors::{AuthError, AuthResult};
use super::models::TwoFactorSetup;
use crate::db::UserRepository;

/// TOTP code length
pub const TOTP_DIGITS: usize = 6;

/// Time step in seconds
pub const TOTP_STEP: u64 = 30;

/// Issuer name shown in authenticator apps
pub const TOTP_ISSUER: &str = "Blackjack Game";

/// Build a TOTP instance for a base32 secret and account name
pub fn build_totp(secret: &str, account: &str) -> AuthResult<TOTP> {
    let secret_bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|e| AuthError::Totp(format!("invalid secret: {e:?}")))?;

    TOTP::new(
        Algorithm::SHA1,
        TOTP_DIGITS,
        1,
        TOTP_STEP,
        secret_bytes,
        Some(TOTP_ISSUER.to_string()),
        account.to_string(),
    )
    .map_err(|e| AuthError::Totp(e.to_string()))
}

/// Check `code` against the steps at `unix_time - 30`, `unix_time` and `unix_time + 30`.
///
/// Anything that is not exactly six ASCII digits is a mismatch.
pub fn check_code(totp: &TOTP, code: &str, unix_time: u64) -> bool {
    if code.len() != TOTP_DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let windows = [
        unix_time.saturating_sub(TOTP_STEP),
        unix_time,
        unix_time.saturating_add(TOTP_STEP),
    ];

    // Evaluate every window so timing does not reveal which one matched
    let mut matched = subtle::Choice::from(0u8);
    for time in windows {
        let expected = totp.generate(time);
        matched |= expected.as_bytes().ct_eq(code.as_bytes());
    }
    matched.into()
}

/// Code an authenticator app would display at `unix_time`
pub fn generate_code(secret: &str, unix_time: u64) -> AuthResult<String> {
    Ok(build_totp(secret, "user")?.generate(unix_time))
}

/// Two-factor enrollment and verification engine
#[derive(Clone)]
pub struct TwoFactorEngine {
    users: Arc<dyn UserRepository>,
}

impl TwoFactorEngine {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Enroll a user in 2FA
    ///
    /// Generates a fresh 20-byte secret, stores it and switches 2FA on in one
    /// conditional write. A user who already has 2FA keeps their secret.
    ///
    /// # Errors
    ///
    /// * `AuthError::UserNotFound` - No record for `email`
    /// * `AuthError::Totp` - Secret or QR code generation failed
    pub async fn enroll(&self, email: &str) -> AuthResult<TwoFactorSetup> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if user.two_factor_enabled {
            return Ok(TwoFactorSetup::AlreadyEnabled);
        }

        let secret = Secret::generate_secret().to_encoded().to_string();
        let totp = build_totp(&secret, email)?;
        let otpauth_url = totp.get_url();
        let qr_png = totp.get_qr_base64().map_err(AuthError::Totp)?;

        if !self.users.enable_two_factor(email, &secret, Utc::now()).await? {
            // A concurrent enrollment won; its secret stays
            log::info!("2FA enrollment race lost, keeping existing secret");
            return Ok(TwoFactorSetup::AlreadyEnabled);
        }

        Ok(TwoFactorSetup::Enrolled {
            secret,
            otpauth_url,
            qr_code: format!("data:image/png;base64,{qr_png}"),
        })
    }

    /// Verify a code against the current time
    pub async fn verify(&self, email: &str, code: &str) -> AuthResult<bool> {
        self.verify_at(email, code, Utc::now().timestamp().max(0) as u64)
            .await
    }

    /// Verify a code against an explicit unix time
    ///
    /// # Errors
    ///
    /// * `AuthError::UserNotFound` - No record for `email`
    /// * `AuthError::TwoFactorNotEnabled` - 2FA off or no secret stored
    pub async fn verify_at(&self, email: &str, code: &str, unix_time: u64) -> AuthResult<bool> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let secret = user
            .active_two_factor_secret()
            .ok_or(AuthError::TwoFactorNotEnabled)?;

        let totp = build_totp(secret, email)?;
        Ok(check_code(&totp, code.trim(), unix_time))
    }
}
