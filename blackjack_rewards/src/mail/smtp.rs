//! SMTP delivery through `lettre`.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{MailError, MailResult, Mailer, OutgoingMail};

/// Connection security
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpTls {
    /// Implicit TLS (port 465)
    Tls,
    /// Plain connection upgraded with STARTTLS (port 587)
    StartTls,
    /// Unencrypted, for local relays only
    None,
}

impl SmtpTls {
    /// Parse `tls`, `starttls` or `none`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tls" | "ssl" => Some(SmtpTls::Tls),
            "starttls" => Some(SmtpTls::StartTls),
            "none" | "plain" => Some(SmtpTls::None),
            _ => None,
        }
    }
}

/// SMTP settings
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Sender mailbox; defaults to `Blackjack Rewards <username>`
    pub from: Option<String>,
    pub tls: SmtpTls,
}

impl SmtpConfig {
    /// Gmail relay with implicit TLS
    pub fn gmail(username: &str, password: &str) -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 465,
            username: username.to_string(),
            password: password.to_string(),
            from: None,
            tls: SmtpTls::Tls,
        }
    }

    /// Sender mailbox text
    pub fn sender(&self) -> String {
        self.from
            .clone()
            .unwrap_or_else(|| format!("Blackjack Rewards <{}>", self.username))
    }
}

/// Mailer sending through an SMTP relay
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: Mailbox,
}

impl SmtpMailer {
    /// Build the transport. No connection is opened until the first send.
    ///
    /// # Errors
    ///
    /// * `MailError::InvalidAddress` - Sender does not parse
    /// * `MailError::Transport` - TLS parameters for `host` could not be set up
    pub fn new(config: &SmtpConfig) -> MailResult<Self> {
        let sender = config.sender();
        let from_address: Mailbox = sender
            .parse()
            .map_err(|_| MailError::InvalidAddress(sender.clone()))?;

        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let transport = match config.tls {
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| MailError::Transport(e.to_string()))?
                .port(config.port)
                .credentials(creds)
                .build(),
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| MailError::Transport(e.to_string()))?
                .port(config.port)
                .credentials(creds)
                .build(),
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .credentials(creds)
                .build(),
        };

        Ok(Self {
            transport,
            from_address,
        })
    }

    /// Checks the relay with a NOOP
    pub async fn test_connection(&self) -> MailResult<bool> {
        self.transport
            .test_connection()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> MailResult<()> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|_| MailError::InvalidAddress(mail.to.clone()))?;

        let message = Message::builder()
            .from(self.from_address.clone())
            .to(to)
            .subject(mail.subject.clone())
            .body(mail.body.clone())
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        log::debug!("Delivered '{}'", mail.subject);
        Ok(())
    }
}
