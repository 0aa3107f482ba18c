//! Stateless signed-link authentication.
//!
//! Access to subscription management is granted by links carrying
//! `email`, `expires` and `signature` query parameters instead of sessions.
//! Nothing about a token is persisted; the blacklist is the only state.

mod service;
mod signer;
mod token;

pub use service::{DEFAULT_TOKEN_TTL_SECS, MAX_TOKEN_TTL_SECS, SignatureAuthenticator};
pub use signer::{Argon2Signer, HmacSigner, SignatureScheme};
pub use token::{SignaturePayload, SignedToken};

/// Authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Authentication failed")]
    Blacklisted,

    #[error("This email is already blacklisted")]
    AlreadyBlacklisted,

    #[error("Link has expired")]
    Expired,

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Repository error: {0}")]
    Repository(String),
}

impl From<crate::Error> for AuthError {
    fn from(err: crate::Error) -> Self {
        match err {
            crate::Error::Auth(inner) => inner,
            other => Self::Repository(other.to_string()),
        }
    }
}
