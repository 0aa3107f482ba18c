//! Mail delivery channels.

mod email;

pub use email::{SmtpConfig, SmtpMailer};
