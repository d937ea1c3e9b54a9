//! # Blackjack Rewards
//!
//! Authentication, two-factor and bonus-code ledger for a casual Blackjack game.
//!
//! Players sign in with a Firebase ID token, may turn on TOTP two-factor
//! authentication, and collect single-use bonus codes that credit coins to
//! their balance.
//!
//! ## Architecture
//!
//! - **Credential verification**: provider ID tokens first, self-issued session
//!   tokens as a fallback
//! - **Session tokens**: HS256 JWTs carrying a `twoFAVerified` flag; pre-2FA
//!   tokens are short-lived and rejected by every gated operation
//! - **TOTP**: 20-byte secrets, 30-second steps, ±1 step skew
//! - **Ledger**: welcome and daily codes, FIFO claims guarded by conditional
//!   writes, additive crediting
//!
//! ## Core Modules
//!
//! - [`auth`]: credential verifier, session tokens, TOTP engine, login orchestrator
//! - [`rewards`]: bonus code ledger and the daily bonus job
//! - [`mail`]: notification dispatch (SMTP, in-memory)
//! - [`db`]: PostgreSQL pool, repositories and the in-memory store
//!
//! ## Example
//!
//! ```
//! use blackjack_rewards::rewards::CodeKind;
//!
//! assert_eq!(CodeKind::Daily.prefix(), "DAILY");
//! ```

/// Credential verification, session tokens, two-factor and login orchestration.
pub mod auth;

/// Storage: configuration, connection pool, repositories.
pub mod db;

/// Outgoing notifications.
pub mod mail;

/// Bonus code ledger and scheduled issuance.
pub mod rewards;

pub use auth::{AuthError, AuthManager, LoginOutcome, SessionClaims, VerifiedIdentity};
pub use rewards::{CodeKind, RewardsError, RewardsManager};
