//! Outbound e-mail notifications.
//!
//! Bonus codes reach players by e-mail. Delivery is behind the [`Mailer`]
//! trait so the ledger can run against SMTP in production and an in-memory
//! outbox in tests.

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod smtp;
pub mod templates;

pub use memory::{DisabledMailer, MemoryMailer};
pub use smtp::{SmtpConfig, SmtpMailer, SmtpTls};

/// Mail delivery errors
#[derive(Debug, Clone, Error)]
pub enum MailError {
    /// No transport configured
    #[error("Mail delivery is not configured")]
    NotConfigured,

    /// Sender or recipient address does not parse
    #[error("Invalid e-mail address: {0}")]
    InvalidAddress(String),

    /// Message could not be assembled
    #[error("Failed to build message: {0}")]
    Build(String),

    /// Transport refused or failed to deliver
    #[error("Delivery failed: {0}")]
    Transport(String),
}

/// Result type for mail operations
pub type MailResult<T> = Result<T, MailError>;

/// Plain-text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Sends notifications
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message
    async fn send(&self, mail: &OutgoingMail) -> MailResult<()>;

    /// Whether a real transport is installed
    fn is_configured(&self) -> bool {
        true
    }
}
