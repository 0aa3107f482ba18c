//! Signed-link authentication.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};

use super::AuthError;
use super::signer::SignatureScheme;
use super::token::{SignaturePayload, SignedToken};
use crate::clock::Clock;
use crate::database::models::normalize_email;
use crate::database::repositories::BlacklistRepository;

/// Default link lifetime in seconds.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Longest accepted link lifetime: one year.
pub const MAX_TOKEN_TTL_SECS: i64 = 365 * 24 * 60 * 60;

/// Issues and checks stateless signed tokens and manages the blacklist.
///
/// Signature validity and expiry are separate outcomes: `validate_*` never
/// looks at the expiry, [`check_expiry`](Self::check_expiry) never looks at
/// the signature.
pub struct SignatureAuthenticator {
    scheme: Arc<dyn SignatureScheme>,
    blacklist: Arc<dyn BlacklistRepository>,
    clock: Arc<dyn Clock>,
    token_ttl: Duration,
}

impl SignatureAuthenticator {
    pub fn new(
        scheme: Arc<dyn SignatureScheme>,
        blacklist: Arc<dyn BlacklistRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scheme,
            blacklist,
            clock,
            token_ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECS),
        }
    }

    pub fn with_token_ttl(mut self, token_ttl: Duration) -> Self {
        self.token_ttl = token_ttl;
        self
    }

    /// Mint a token for `email` expiring `token_ttl` from now.
    pub async fn create_token(&self, email: &str) -> Result<SignedToken, AuthError> {
        let email = normalize_email(email);
        let expires = self
            .clock
            .now()
            .checked_add_signed(self.token_ttl)
            .ok_or_else(|| AuthError::Signing("token expiry out of range".to_string()))?
            .timestamp_millis();
        let signature = self
            .scheme
            .sign(&SignaturePayload {
                email: &email,
                expires,
            })
            .await?;

        debug!(email = %email, expires, "Created signed token");
        Ok(SignedToken {
            email,
            expires,
            signature,
        })
    }

    async fn verify_signature(&self, token: &SignedToken) -> Result<(), AuthError> {
        if self.scheme.verify(&token.payload(), &token.signature).await? {
            Ok(())
        } else {
            debug!(email = %token.email, "Rejected token with invalid signature");
            Err(AuthError::InvalidSignature)
        }
    }

    async fn is_blacklisted(&self, email: &str) -> Result<bool, AuthError> {
        Ok(self.blacklist.find_by_email(email).await?.is_some())
    }

    /// Check the signature, then reject blacklisted addresses. Expiry is not
    /// checked.
    pub async fn validate_token(&self, token: &SignedToken) -> Result<(), AuthError> {
        self.verify_signature(token).await?;

        if self.is_blacklisted(&token.email).await? {
            return Err(AuthError::Blacklisted);
        }
        Ok(())
    }

    /// Check the signature only, so a blacklisted address can still confirm
    /// its own opt-out link. Expiry is not checked.
    pub async fn validate_token_for_blacklist_action(
        &self,
        token: &SignedToken,
    ) -> Result<(), AuthError> {
        self.verify_signature(token).await
    }

    /// `Expired` once the current time is past the token's expiry.
    pub fn check_expiry(&self, token: &SignedToken) -> Result<(), AuthError> {
        if self.clock.now_ms() > token.expires {
            return Err(AuthError::Expired);
        }
        Ok(())
    }

    /// Add `email` to the blacklist.
    pub async fn blacklist(&self, email: &str) -> Result<(), AuthError> {
        if self.is_blacklisted(email).await? {
            return Err(AuthError::AlreadyBlacklisted);
        }

        // Lost a concurrent insert race
        if !self.blacklist.insert(email).await? {
            warn!(email = %normalize_email(email), "Concurrent blacklist insert");
            return Err(AuthError::AlreadyBlacklisted);
        }

        info!(email = %normalize_email(email), "Email blacklisted");
        Ok(())
    }

    /// Verification-link flow: valid signature, not blacklisted, not expired.
    pub async fn authorize(&self, token: &SignedToken) -> Result<(), AuthError> {
        self.validate_token(token).await?;
        self.check_expiry(token)
    }

    /// Opt-out link flow: valid signature, not expired, then blacklist.
    pub async fn confirm_blacklist(&self, token: &SignedToken) -> Result<(), AuthError> {
        self.validate_token_for_blacklist_action(token).await?;
        self.check_expiry(token)?;
        self.blacklist(&token.email).await
    }
}
