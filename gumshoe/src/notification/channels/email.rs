//! Email delivery over SMTP.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::notification::{MailDispatcher, MailError, OutgoingMail};
use crate::utils::http_client::install_rustls_provider;

/// Port that expects TLS from the first byte. Other ports upgrade with
/// STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// SMTP configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// SMTP server host.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// SMTP username, also used as the sender address.
    pub username: String,
    /// SMTP password.
    pub password: String,
    /// Display name of the sender.
    pub from_name: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from_name", &self.from_name)
            .finish()
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: IMPLICIT_TLS_PORT,
            username: String::new(),
            password: String::new(),
            from_name: "TV Gumshoe".to_string(),
        }
    }
}

/// Sends [`OutgoingMail`] through a pooled SMTP connection.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        install_rustls_provider();

        let from = Mailbox::new(
            Some(config.from_name.clone()),
            config
                .username
                .parse()
                .map_err(|e: lettre::address::AddressError| MailError::Address {
                    address: config.username.clone(),
                    reason: e.to_string(),
                })?,
        );

        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| MailError::Transport(e.to_string()))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self { transport, from })
    }

    fn build_message(&self, mail: &OutgoingMail) -> Result<Message, MailError> {
        let to: Mailbox = mail.to.parse().map_err(|e: lettre::address::AddressError| {
            MailError::Address {
                address: mail.to.clone(),
                reason: e.to_string(),
            }
        })?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(mail.html_body.clone())
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl MailDispatcher for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let message = self.build_message(mail)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        debug!(to = %mail.to, subject = %mail.subject, "Mail sent");
        Ok(())
    }
}
