//! Outgoing mail and the nightly notification run.
//!
//! - [`NotificationPipeline`] finds every subscriber with a show airing today
//!   and mails them the list.
//! - [`MagicLinkService`] mails verification links on request.
//! - [`MailDispatcher`] is the delivery seam; [`channels::SmtpMailer`] is the
//!   SMTP implementation.

pub mod channels;
pub mod magic_link;
pub mod pipeline;
pub mod templates;

pub use channels::{SmtpConfig, SmtpMailer};
pub use magic_link::MagicLinkService;
pub use pipeline::{NotificationPipeline, PipelineConfig, RunReport};
pub use templates::MailTemplates;

use async_trait::async_trait;

/// Mail delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),

    #[error("Failed to sign links: {0}")]
    Signing(#[from] crate::auth::AuthError),
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Delivers rendered mail.
#[async_trait]
pub trait MailDispatcher: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}
