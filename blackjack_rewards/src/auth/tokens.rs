//! Self-issued session tokens.
//!
//! Tokens are HS256 JWTs signed with a single shared secret and validated
//! statelessly with zero leeway. A token whose `twoFAVerified` claim is false
//! only proves the first factor; [`SessionTokenIssuer::require_full_session`]
//! is the gate for everything else.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use super::errors::{AuthError, AuthResult};
use super::models::SessionClaims;

/// Lifetime of a full session token
pub const DEFAULT_SESSION_TTL_SECS: i64 = 3600;

/// Lifetime of a pre-2FA token
pub const DEFAULT_PRE_TWO_FACTOR_TTL_SECS: i64 = 300;

/// Session token issuer
#[derive(Clone)]
pub struct SessionTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    session_ttl: Duration,
    pre_two_factor_ttl: Duration,
}

impl SessionTokenIssuer {
    /// Create a new issuer
    ///
    /// # Arguments
    ///
    /// * `secret` - HMAC signing secret
    /// * `session_ttl` - Lifetime of full (2FA verified) tokens
    /// * `pre_two_factor_ttl` - Lifetime of tokens awaiting the second factor
    pub fn new(secret: &str, session_ttl: Duration, pre_two_factor_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            session_ttl,
            pre_two_factor_ttl,
        }
    }

    /// Issuer with the default lifetimes (1 hour / 5 minutes)
    pub fn with_defaults(secret: &str) -> Self {
        Self::new(
            secret,
            Duration::seconds(DEFAULT_SESSION_TTL_SECS),
            Duration::seconds(DEFAULT_PRE_TWO_FACTOR_TTL_SECS),
        )
    }

    /// Lifetime of full session tokens
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Mint a token
    ///
    /// # Arguments
    ///
    /// * `email` - Verified e-mail
    /// * `uid` - Provider subject id
    /// * `two_fa_verified` - `true` for a full session, `false` for a pre-2FA token
    ///
    /// # Returns
    ///
    /// * `AuthResult<String>` - Signed JWT
    pub fn issue(&self, email: &str, uid: &str, two_fa_verified: bool) -> AuthResult<String> {
        let now = Utc::now();
        let ttl = if two_fa_verified {
            self.session_ttl
        } else {
            self.pre_two_factor_ttl
        };

        let claims = SessionClaims {
            email: email.to_string(),
            uid: uid.to_string(),
            two_fa_verified,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Verify signature and expiry of a token.
    ///
    /// Any failure (bad signature, expired, malformed) is reported as
    /// [`AuthError::InvalidCredential`].
    pub fn decode(&self, token: &str) -> AuthResult<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                log::debug!("Session token rejected: {}", e);
                AuthError::InvalidCredential
            })
    }

    /// Decode a token and require that it passed the second factor
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidCredential` - Bad signature or expired
    /// * `AuthError::TwoFactorRequired` - Valid pre-2FA token
    pub fn require_full_session(&self, token: &str) -> AuthResult<SessionClaims> {
        let claims = self.decode(token)?;
        if !claims.two_fa_verified {
            return Err(AuthError::TwoFactorRequired);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_that_is_at_least_32_characters_long";

    #[test]
    fn test_issue_and_decode_full_session() {
        let issuer = SessionTokenIssuer::with_defaults(SECRET);
        let token = issuer.issue("a@example.com", "uid-1", true).unwrap();

        let claims = issuer.require_full_session(&token).unwrap();
        assert_eq!(claims.email, "a@example.com");
        assert_eq!(claims.uid, "uid-1");
        assert_eq!(claims.exp - claims.iat, DEFAULT_SESSION_TTL_SECS);
    }

    #[test]
    fn test_pre_two_factor_token_is_short_and_gated() {
        let issuer = SessionTokenIssuer::with_defaults(SECRET);
        let token = issuer.issue("a@example.com", "uid-1", false).unwrap();

        let claims = issuer.decode(&token).unwrap();
        assert!(!claims.two_fa_verified);
        assert_eq!(claims.exp - claims.iat, DEFAULT_PRE_TWO_FACTOR_TTL_SECS);

        assert!(matches!(
            issuer.require_full_session(&token),
            Err(AuthError::TwoFactorRequired)
        ));
    }

    #[test]
    fn test_claim_uses_two_fa_verified_name() {
        let issuer = SessionTokenIssuer::with_defaults(SECRET);
        let token = issuer.issue("a@example.com", "uid-1", true).unwrap();

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::HS256);

        let json = serde_json::to_value(issuer.decode(&token).unwrap()).unwrap();
        assert_eq!(json["twoFAVerified"], true);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = SessionTokenIssuer::with_defaults(SECRET);
        let other = SessionTokenIssuer::with_defaults("another_secret_that_is_32_characters_long!");
        let token = other.issue("a@example.com", "uid-1", true).unwrap();

        assert!(matches!(issuer.decode(&token), Err(AuthError::InvalidCredential)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = SessionTokenIssuer::new(SECRET, Duration::seconds(-10), Duration::seconds(-10));
        let token = issuer.issue("a@example.com", "uid-1", true).unwrap();

        assert!(matches!(issuer.decode(&token), Err(AuthError::InvalidCredential)));
    }

    #[test]
    fn test_garbage_rejected() {
        let issuer = SessionTokenIssuer::with_defaults(SECRET);
        assert!(matches!(issuer.decode("not.a.jwt"), Err(AuthError::InvalidCredential)));
        assert!(matches!(issuer.decode(""), Err(AuthError::InvalidCredential)));
    }
}
