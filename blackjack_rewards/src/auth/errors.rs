//! Authentication error types.

use thiserror::Error;

use crate::db::StoreError;
use crate::rewards::RewardsError;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Credential rejected by the identity provider and not a valid session token
    #[error("Invalid or expired token")]
    InvalidCredential,

    /// Identity provider did not answer within the retry budget
    #[error("Token verification timed out")]
    VerificationTimeout,

    /// Identity provider unreachable or not configured
    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// User not found
    #[error("User not found")]
    UserNotFound,

    /// 2FA not enabled
    #[error("2FA not set up for this user")]
    TwoFactorNotEnabled,

    /// Invalid 2FA code
    #[error("Invalid 2FA code")]
    InvalidTwoFactorCode,

    /// Token is valid but has not passed the second factor
    #[error("Two-factor authentication required")]
    TwoFactorRequired,

    /// E-mail in the request does not match the verified identity
    #[error("Email mismatch")]
    EmailMismatch,

    /// Required request field missing or empty
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// JWT token error
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// TOTP secret or QR generation failed
    #[error("TOTP error: {0}")]
    Totp(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// New account could not be created with its welcome code
    #[error("Registration failed: {0}")]
    Registration(#[from] RewardsError),
}

impl AuthError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Storage, JWT and TOTP errors are sanitized to prevent information
    /// disclosure about the internal system structure.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Store(_) | AuthError::Totp(_) | AuthError::Registration(_) => {
                "Internal server error".to_string()
            }
            AuthError::Jwt(_) => "Authentication failed".to_string(),
            AuthError::ProviderUnavailable(_) => {
                "Authentication service temporarily unavailable".to_string()
            }
            // All other errors are safe to expose
            _ => self.to_string(),
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
