//! Verification link mail.

use std::sync::Arc;

use tracing::{debug, info};

use super::{MailDispatcher, MailTemplates};
use crate::Result;
use crate::auth::SignatureAuthenticator;
use crate::database::repositories::BlacklistRepository;

/// Mails magic links granting access to subscription management.
pub struct MagicLinkService {
    authenticator: Arc<SignatureAuthenticator>,
    blacklist: Arc<dyn BlacklistRepository>,
    mailer: Arc<dyn MailDispatcher>,
    templates: MailTemplates,
}

impl MagicLinkService {
    pub fn new(
        authenticator: Arc<SignatureAuthenticator>,
        blacklist: Arc<dyn BlacklistRepository>,
        mailer: Arc<dyn MailDispatcher>,
        templates: MailTemplates,
    ) -> Self {
        Self {
            authenticator,
            blacklist,
            mailer,
            templates,
        }
    }

    /// Mail a fresh verification link to `email`.
    ///
    /// Blacklisted addresses get nothing and the call still succeeds, so the
    /// response does not reveal which addresses opted out.
    pub async fn send_verification_link(&self, email: &str) -> Result<()> {
        if self.blacklist.find_by_email(email).await?.is_some() {
            debug!("Skipping verification link for blacklisted address");
            return Ok(());
        }

        let token = self.authenticator.create_token(email).await?;
        let mail = self.templates.verification_link(&token);
        self.mailer.send(&mail).await?;

        info!(email = %token.email, "Verification link sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;

    use crate::auth::{HmacSigner, SignedToken};
    use crate::clock::ManualClock;
    use crate::database::models::{BlacklistDbModel, normalize_email};
    use crate::notification::{MailError, OutgoingMail};

    struct FixedBlacklist(Vec<String>);

    #[async_trait]
    impl BlacklistRepository for FixedBlacklist {
        async fn find_by_email(&self, email: &str) -> crate::Result<Option<BlacklistDbModel>> {
            let email = normalize_email(email);
            Ok(self.0.contains(&email).then(|| BlacklistDbModel {
                email,
                created_at: 0,
            }))
        }

        async fn find_all(&self) -> crate::Result<Vec<BlacklistDbModel>> {
            Ok(Vec::new())
        }

        async fn insert(&self, _email: &str) -> crate::Result<bool> {
            Ok(true)
        }
    }

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<OutgoingMail>>,
    }

    #[async_trait]
    impl MailDispatcher for RecordingMailer {
        async fn send(&self, mail: &OutgoingMail) -> std::result::Result<(), MailError> {
            self.sent.lock().push(mail.clone());
            Ok(())
        }
    }

    fn service(blacklisted: &[&str]) -> (Arc<SignatureAuthenticator>, Arc<RecordingMailer>, MagicLinkService) {
        let blacklist = Arc::new(FixedBlacklist(
            blacklisted.iter().map(|e| e.to_string()).collect(),
        ));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap(),
        ));
        let authenticator = Arc::new(SignatureAuthenticator::new(
            Arc::new(HmacSigner::new("secret").unwrap()),
            blacklist.clone(),
            clock,
        ));
        let mailer = Arc::new(RecordingMailer::default());
        let service = MagicLinkService::new(
            authenticator.clone(),
            blacklist,
            mailer.clone(),
            MailTemplates::new("https://api.gumshoe.tv").unwrap(),
        );
        (authenticator, mailer, service)
    }

    #[tokio::test]
    async fn test_link_in_mail_authorizes() {
        let (authenticator, mailer, service) = service(&[]);

        service.send_verification_link("Viewer@Example.com").await.unwrap();

        let sent = mailer.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "viewer@example.com");

        let start = sent[0].html_body.find("/auth/redirect?").unwrap() + "/auth/redirect?".len();
        let end = start + sent[0].html_body[start..].find('"').unwrap();
        let query = sent[0].html_body[start..end].replace("&amp;", "&");
        let token = SignedToken::from_query(&query).unwrap();

        authenticator.authorize(&token).await.unwrap();
    }

    #[tokio::test]
    async fn test_blacklisted_address_skipped_silently() {
        let (_, mailer, service) = service(&["viewer@example.com"]);

        service.send_verification_link("VIEWER@example.com").await.unwrap();

        assert!(mailer.sent.lock().is_empty());
    }
}
