//! Mailers that never touch the network.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{MailError, MailResult, Mailer, OutgoingMail};

#[derive(Default)]
struct Outbox {
    sent: Vec<OutgoingMail>,
    fail_all: bool,
    failing_recipients: HashSet<String>,
}

/// Records messages instead of sending them; can be told to fail.
///
/// Clones share the same outbox.
#[derive(Clone, Default)]
pub struct MemoryMailer {
    outbox: Arc<Mutex<Outbox>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every delivery while `fail` is set
    pub fn set_failing(&self, fail: bool) {
        self.lock().fail_all = fail;
    }

    /// Fail deliveries to one recipient
    pub fn fail_for(&self, recipient: &str) {
        self.lock().failing_recipients.insert(recipient.to_string());
    }

    /// Messages delivered so far
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.lock().sent.clone()
    }

    /// Messages delivered to `recipient`
    pub fn sent_to(&self, recipient: &str) -> Vec<OutgoingMail> {
        self.lock()
            .sent
            .iter()
            .filter(|m| m.to == recipient)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Outbox> {
        self.outbox.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: &OutgoingMail) -> MailResult<()> {
        let mut outbox = self.lock();
        if outbox.fail_all || outbox.failing_recipients.contains(&mail.to) {
            return Err(MailError::Transport("simulated delivery failure".to_string()));
        }
        outbox.sent.push(mail.clone());
        Ok(())
    }
}

/// Installed when SMTP is not configured: every send fails
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _mail: &OutgoingMail) -> MailResult<()> {
        Err(MailError::NotConfigured)
    }

    fn is_configured(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(to: &str) -> OutgoingMail {
        OutgoingMail {
            to: to.to_string(),
            subject: "Subject".to_string(),
            body: "Body".to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_mailer_records() {
        let mailer = MemoryMailer::new();
        mailer.send(&mail("a@example.com")).await.unwrap();

        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(mailer.sent_to("a@example.com").len(), 1);
        assert!(mailer.sent_to("b@example.com").is_empty());
    }

    #[tokio::test]
    async fn test_memory_mailer_failures() {
        let mailer = MemoryMailer::new();
        mailer.fail_for("b@example.com");

        assert!(mailer.send(&mail("a@example.com")).await.is_ok());
        assert!(mailer.send(&mail("b@example.com")).await.is_err());

        mailer.set_failing(true);
        assert!(mailer.send(&mail("a@example.com")).await.is_err());
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_mailer() {
        let mailer = DisabledMailer;
        assert!(!mailer.is_configured());
        assert!(matches!(
            mailer.send(&mail("a@example.com")).await,
            Err(MailError::NotConfigured)
        ));
    }
}
