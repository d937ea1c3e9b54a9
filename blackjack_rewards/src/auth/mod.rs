//! Authentication module: credential verification, session tokens and 2FA.
//!
//! This module implements:
//! - Firebase ID token verification against Google's JWKS, retried with a
//!   per-attempt timeout
//! - HS256 session tokens with a `twoFAVerified` flag (1-hour full sessions,
//!   5-minute pre-2FA tokens)
//! - TOTP enrollment (otpauth URI + QR code) and verification with ±1 step skew
//! - The login flow that bootstraps new users with a welcome bonus
//!
//! ## Example
//!
//! ```no_run
//! use blackjack_rewards::auth::{
//!     AuthManager, FirebaseIdentityProvider, LoginOutcome, RetryPolicy, SessionTokenIssuer,
//! };
//! use blackjack_rewards::db::{MemoryStore, Repositories};
//! use blackjack_rewards::mail::DisabledMailer;
//! use blackjack_rewards::rewards::{RewardsConfig, RewardsManager};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repos = Repositories::memory(MemoryStore::new());
//!     let rewards = RewardsManager::new(&repos, Arc::new(DisabledMailer), RewardsConfig::default());
//!     let auth = AuthManager::new(
//!         &repos,
//!         Arc::new(FirebaseIdentityProvider::new("my-project", None)),
//!         SessionTokenIssuer::with_defaults("a_signing_secret_of_at_least_32_chars"),
//!         RetryPolicy::default(),
//!         rewards,
//!     );
//!
//!     match auth.login("<firebase id token>").await? {
//!         LoginOutcome::TwoFactorRequired { temp_token } => println!("2FA needed: {temp_token}"),
//!         LoginOutcome::NewUser { token, .. } | LoginOutcome::Returning { token } => {
//!             println!("Session: {token}")
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod identity;
pub mod manager;
pub mod models;
pub mod tokens;
pub mod totp;
pub mod verifier;

pub use errors::{AuthError, AuthResult};
pub use identity::{
    FirebaseIdentityProvider, IdentityProvider, ProviderError, UnavailableIdentityProvider,
};
pub use manager::AuthManager;
pub use models::{LoginOutcome, SessionClaims, TwoFactorSetup, UserRecord, VerifiedIdentity};
pub use tokens::SessionTokenIssuer;
pub use totp::TwoFactorEngine;
pub use verifier::{CredentialVerifier, RetryPolicy};
