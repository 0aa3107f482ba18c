//! HTTP surface of the external TV catalog.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, trace};
use url::Url;

use super::CatalogError;
use super::models::{Envelope, LoginData, SearchItem, SeriesRecord, Translation};
use crate::utils::http_client;

/// Raw catalog endpoints. Caching and localization live in
/// [`CatalogClient`](super::CatalogClient).
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// `POST /login`, returning a bearer token.
    async fn login(&self, api_key: &str, pin: &str) -> Result<String, CatalogError>;

    /// `GET /search?query&type=series&language=eng`.
    async fn search_series(&self, token: &str, query: &str)
    -> Result<Vec<SearchItem>, CatalogError>;

    /// `GET /series/{id}/extended`.
    async fn series_extended(&self, token: &str, id: &str) -> Result<SeriesRecord, CatalogError>;

    /// `GET /series/{id}/translations/{language}`.
    ///
    /// Returns `None` when the catalog has no translation for that language.
    async fn series_translation(
        &self,
        token: &str,
        id: &str,
        language: &str,
    ) -> Result<Option<Translation>, CatalogError>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    apikey: &'a str,
    pin: &'a str,
}

/// reqwest-backed [`CatalogApi`].
#[derive(Clone)]
pub struct HttpCatalogApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpCatalogApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CatalogError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CatalogError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(CatalogError::InvalidBaseUrl(base_url.to_string()));
        }

        Ok(Self {
            client: http_client::build_client(timeout),
            base_url,
        })
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, CatalogError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T>(
        &self,
        url: Url,
        token: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, CatalogError>
    where
        T: serde::de::DeserializeOwned,
    {
        trace!(url = %url, "catalog GET");
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(CatalogError::Status {
                endpoint: url.path().to_string(),
                status: status.as_u16(),
            });
        }

        let body: Envelope<T> = response.json().await?;
        Ok(Some(body.data))
    }
}

#[async_trait]
impl CatalogApi for HttpCatalogApi {
    async fn login(&self, api_key: &str, pin: &str) -> Result<String, CatalogError> {
        let url = self.endpoint(&["login"])?;
        debug!("Requesting catalog auth token");

        let response = self
            .client
            .post(url.clone())
            .json(&LoginRequest {
                apikey: api_key,
                pin,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                endpoint: url.path().to_string(),
                status: status.as_u16(),
            });
        }

        let body: Envelope<LoginData> = response.json().await?;
        Ok(body.data.token)
    }

    async fn search_series(
        &self,
        token: &str,
        query: &str,
    ) -> Result<Vec<SearchItem>, CatalogError> {
        let url = self.endpoint(&["search"])?;
        let items = self
            .get_json::<Option<Vec<SearchItem>>>(
                url,
                token,
                &[("query", query), ("type", "series"), ("language", "eng")],
            )
            .await?;
        Ok(items.flatten().unwrap_or_default())
    }

    async fn series_extended(&self, token: &str, id: &str) -> Result<SeriesRecord, CatalogError> {
        let url = self.endpoint(&["series", id, "extended"])?;
        let path = url.path().to_string();
        self.get_json(url, token, &[])
            .await?
            .ok_or(CatalogError::Status {
                endpoint: path,
                status: StatusCode::NOT_FOUND.as_u16(),
            })
    }

    async fn series_translation(
        &self,
        token: &str,
        id: &str,
        language: &str,
    ) -> Result<Option<Translation>, CatalogError> {
        let url = self.endpoint(&["series", id, "translations", language])?;
        self.get_json(url, token, &[]).await
    }
}
