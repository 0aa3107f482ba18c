//! External TV catalog integration.
//!
//! [`CatalogClient`] wraps a [`CatalogApi`] with the caching and English
//! localization policy used by both the nightly notification run and the
//! subscription views:
//!
//! - the auth token is cached for 7 days under a single key;
//! - `get_show` results are cached for 1 day under `series_{id}`;
//! - `search_shows` is never cached.
//!
//! Nothing here retries. A failed token fetch fails every call that needs it.

mod api;
mod client;
mod models;

pub use api::{CatalogApi, HttpCatalogApi};
pub use client::{CatalogClient, CatalogClientConfig};
pub use models::{
    ENGLISH, Envelope, LoginData, MediaContent, MediaStatus, SearchItem, SeriesRecord,
    SeriesStatus, Translation, parse_air_date,
};

/// Errors from the external catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog returned HTTP {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("invalid catalog base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("catalog error: {0}")]
    Upstream(String),
}
