//! Subscription management on behalf of an authenticated email.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::{CatalogClient, MediaContent};
use crate::database::repositories::SubscriptionRepository;
use crate::{Error, Result};

/// Lists and edits the shows an email follows.
pub struct SubscriptionService {
    repository: Arc<dyn SubscriptionRepository>,
    catalog: Arc<CatalogClient>,
}

impl SubscriptionService {
    pub fn new(repository: Arc<dyn SubscriptionRepository>, catalog: Arc<CatalogClient>) -> Self {
        Self {
            repository,
            catalog,
        }
    }

    fn validate_media_id(media_id: &str) -> Result<&str> {
        let media_id = media_id.trim();
        if media_id.is_empty() {
            return Err(Error::validation("media id must not be empty"));
        }
        Ok(media_id)
    }

    /// Catalog details of every followed show, one lookup at a time.
    ///
    /// Shows that fail to load are left out and logged; an unknown email
    /// yields an empty list.
    pub async fn list_content(&self, email: &str) -> Result<Vec<MediaContent>> {
        let Some(subscriber) = self.repository.find_by_email(email).await? else {
            return Ok(Vec::new());
        };

        let mut content = Vec::with_capacity(subscriber.media_ids.len());
        let mut failed = Vec::new();
        for id in &subscriber.media_ids {
            match self.catalog.get_show(id).await {
                Ok(show) => content.push(show),
                Err(e) => {
                    debug!(media_id = %id, error = %e, "Show lookup failed");
                    failed.push(id.as_str());
                }
            }
        }

        if !failed.is_empty() {
            warn!(
                email = %subscriber.email,
                failed = ?failed,
                "Could not retrieve some subscribed media"
            );
        }

        Ok(content)
    }

    /// Followed media ids; empty for an unknown email.
    pub async fn list_ids(&self, email: &str) -> Result<Vec<String>> {
        Ok(self
            .repository
            .find_by_email(email)
            .await?
            .map(|s| s.media_ids.into_iter().collect())
            .unwrap_or_default())
    }

    /// Follow a show, creating the subscriber on first use.
    pub async fn add(&self, email: &str, media_id: &str) -> Result<()> {
        let media_id = Self::validate_media_id(media_id)?;
        let subscriber = self.repository.add_media(email, media_id).await?;
        info!(
            email = %subscriber.email,
            media_id = %media_id,
            total = subscriber.media_ids.len(),
            "Subscription added"
        );
        Ok(())
    }

    /// Stop following a show. Unknown emails and ids are a no-op.
    pub async fn remove(&self, email: &str, media_id: &str) -> Result<()> {
        let media_id = Self::validate_media_id(media_id)?;
        if let Some(subscriber) = self.repository.remove_media(email, media_id).await? {
            info!(
                email = %subscriber.email,
                media_id = %media_id,
                total = subscriber.media_ids.len(),
                "Subscription removed"
            );
        }
        Ok(())
    }
}
