//! Authentication data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity recovered from a verified credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub email: String,
    /// Provider subject id (Firebase `uid`)
    pub subject_id: String,
}

/// User record, keyed by e-mail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub email: String,
    pub balance: i64,
    pub last_bonus_at: Option<DateTime<Utc>>,
    pub two_factor_enabled: bool,
    #[serde(skip_serializing)]
    pub two_factor_secret: Option<String>,
    pub two_factor_setup_at: Option<DateTime<Utc>>,
    pub last_email_sent_at: Option<DateTime<Utc>>,
    pub balance_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Fresh record: zero balance, 2FA disabled, never received a daily bonus
    pub fn new(email: &str, now: DateTime<Utc>) -> Self {
        Self {
            email: email.to_string(),
            balance: 0,
            last_bonus_at: None,
            two_factor_enabled: false,
            two_factor_secret: None,
            two_factor_setup_at: None,
            last_email_sent_at: None,
            balance_updated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Shared secret, only when two-factor authentication is switched on
    pub fn active_two_factor_secret(&self) -> Option<&str> {
        if self.two_factor_enabled {
            self.two_factor_secret.as_deref().filter(|s| !s.is_empty())
        } else {
            None
        }
    }
}

/// JWT claims for self-issued session tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub email: String,
    pub uid: String,
    #[serde(rename = "twoFAVerified")]
    pub two_fa_verified: bool,
    pub exp: i64,              // Expiration timestamp
    pub iat: i64,              // Issued at timestamp
}

impl SessionClaims {
    /// Identity carried by the token
    pub fn identity(&self) -> VerifiedIdentity {
        VerifiedIdentity {
            email: self.email.clone(),
            subject_id: self.uid.clone(),
        }
    }
}

/// Result of a login attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// First login for this e-mail: record created and welcome code issued
    NewUser {
        token: String,
        welcome_code: String,
        welcome_email_sent: bool,
    },
    /// Returning user with 2FA on: only a pre-2FA token is handed out
    TwoFactorRequired { temp_token: String },
    /// Returning user without 2FA
    Returning { token: String },
}

/// Outcome of two-factor enrollment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TwoFactorSetup {
    /// 2FA was already on; the stored secret is left untouched
    AlreadyEnabled,
    /// A fresh secret was generated and 2FA switched on
    Enrolled {
        /// Base32 shared secret for manual entry
        secret: String,
        /// `otpauth://totp/...` provisioning URI
        otpauth_url: String,
        /// PNG QR code of the provisioning URI as a `data:` URL
        qr_code: String,
    },
}
