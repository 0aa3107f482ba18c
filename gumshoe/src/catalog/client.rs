//! Cache-backed catalog client.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, trace};

use super::api::CatalogApi;
use super::models::{ENGLISH, MediaContent};
use super::CatalogError;
use crate::cache::TtlCache;
use crate::clock::Clock;

/// Cache key of the catalog auth token.
const TOKEN_CACHE_KEY: &str = "tvdb_token";

/// Catalog credentials and cache lifetimes.
#[derive(Debug, Clone)]
pub struct CatalogClientConfig {
    pub api_key: String,
    pub pin: String,
    /// Token lifetime (default: 7 days).
    pub token_ttl: Duration,
    /// Show record lifetime (default: 1 day).
    pub show_ttl: Duration,
}

impl CatalogClientConfig {
    pub fn new(api_key: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            pin: pin.into(),
            token_ttl: Duration::days(7),
            show_ttl: Duration::days(1),
        }
    }
}

/// Show search and lookup with token and show caching.
pub struct CatalogClient {
    api: Arc<dyn CatalogApi>,
    config: CatalogClientConfig,
    token_cache: TtlCache<String>,
    show_cache: TtlCache<MediaContent>,
}

impl CatalogClient {
    /// Create a client with fresh caches driven by `clock`.
    pub fn new(api: Arc<dyn CatalogApi>, config: CatalogClientConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_caches(
            api,
            config,
            TtlCache::new(clock.clone()),
            TtlCache::new(clock),
        )
    }

    /// Create a client over caller-provided caches.
    pub fn with_caches(
        api: Arc<dyn CatalogApi>,
        config: CatalogClientConfig,
        token_cache: TtlCache<String>,
        show_cache: TtlCache<MediaContent>,
    ) -> Self {
        Self {
            api,
            config,
            token_cache,
            show_cache,
        }
    }

    fn show_key(id: &str) -> String {
        format!("series_{id}")
    }

    /// Return the cached auth token, logging in when it is missing or stale.
    pub async fn get_auth_token(&self) -> Result<String, CatalogError> {
        if let Some(token) = self.token_cache.get(TOKEN_CACHE_KEY) {
            return Ok(token);
        }

        let token = self
            .api
            .login(&self.config.api_key, &self.config.pin)
            .await?;
        self.token_cache
            .set(TOKEN_CACHE_KEY, token.clone(), self.config.token_ttl);
        info!("Obtained new catalog auth token");

        Ok(token)
    }

    /// Look up one show by id.
    pub async fn get_show(&self, id: &str) -> Result<MediaContent, CatalogError> {
        let key = Self::show_key(id);
        if let Some(show) = self.show_cache.get(&key) {
            trace!(media_id = %id, "show cache hit");
            return Ok(show);
        }

        let token = self.get_auth_token().await?;
        let (record, translation) = tokio::try_join!(
            self.api.series_extended(&token, id),
            self.api.series_translation(&token, id, ENGLISH),
        )?;

        let show = MediaContent::from_series(record, translation);
        self.show_cache.set(key, show.clone(), self.config.show_ttl);
        debug!(media_id = %id, name = %show.name, "Fetched show from catalog");

        Ok(show)
    }

    /// Search for series by free text. Results keep the catalog's order and
    /// omit shows without a thumbnail or an overview.
    pub async fn search_shows(&self, query: &str) -> Result<Vec<MediaContent>, CatalogError> {
        let token = self.get_auth_token().await?;
        let items = self.api.search_series(&token, query).await?;
        let total = items.len();

        let shows: Vec<MediaContent> = items
            .into_iter()
            .map(MediaContent::from_search_item)
            .filter(MediaContent::is_presentable)
            .collect();

        debug!(query = %query, total, kept = shows.len(), "Catalog search completed");
        Ok(shows)
    }
}
