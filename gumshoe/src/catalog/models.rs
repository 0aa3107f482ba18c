//! Catalog data types.
//!
//! Upstream records are deserialized leniently (most fields may be null or
//! missing, ids may be strings or numbers) and converted into the immutable
//! [`MediaContent`] value handed to callers.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Language code the catalog uses for English.
pub const ENGLISH: &str = "eng";

/// Airing status of a show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaStatus {
    Continuing,
    Ended,
}

impl MediaStatus {
    /// Map an upstream status name. Anything not marked ended (including
    /// "Upcoming") is still continuing.
    pub fn from_upstream(status: Option<&str>) -> Self {
        match status {
            Some(s) if s.trim().eq_ignore_ascii_case("ended") => Self::Ended,
            _ => Self::Continuing,
        }
    }
}

impl std::fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continuing => write!(f, "Continuing"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}

/// A show as presented to subscribers, English-localized where possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaContent {
    pub id: String,
    pub name: String,
    pub first_aired_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_aired_date: Option<String>,
    pub overview: String,
    pub status: MediaStatus,
    pub thumbnail: String,
    pub year: String,
}

impl MediaContent {
    /// Build from an extended series record and its optional English translation.
    pub fn from_series(record: SeriesRecord, translation: Option<Translation>) -> Self {
        let localize = record.language().is_none_or(|lang| lang != ENGLISH);

        let mut content = Self {
            id: record.id,
            name: record.name.unwrap_or_default(),
            first_aired_date: record.first_aired.unwrap_or_default(),
            next_aired_date: record.next_aired.filter(|d| !d.trim().is_empty()),
            overview: record.overview.unwrap_or_default(),
            status: MediaStatus::from_upstream(
                record.status.as_ref().and_then(|s| s.name.as_deref()),
            ),
            thumbnail: record.image.unwrap_or_default(),
            year: record.year.unwrap_or_default(),
        };

        if let Some(translation) = translation.filter(|_| localize) {
            if let Some(name) = translation.name.filter(|n| !n.is_empty()) {
                content.name = name;
            }
            if let Some(overview) = translation.overview.filter(|o| !o.is_empty()) {
                content.overview = overview;
            }
        }

        content
    }

    /// Build from a search hit, applying its inline English translations.
    pub fn from_search_item(mut item: SearchItem) -> Self {
        let localize = item
            .primary_language
            .as_deref()
            .is_none_or(|lang| lang != ENGLISH);

        let mut name = item.name.unwrap_or_default();
        let mut overview = item.overview.unwrap_or_default();

        if localize {
            if let Some(translated) = item.translations.remove(ENGLISH).filter(|n| !n.is_empty()) {
                name = translated;
            }
            if let Some(translated) = item.overviews.remove(ENGLISH).filter(|o| !o.is_empty()) {
                overview = translated;
            }
        }

        Self {
            id: item.tvdb_id.unwrap_or_default(),
            name,
            first_aired_date: item.first_air_time.unwrap_or_default(),
            next_aired_date: None,
            overview,
            status: MediaStatus::from_upstream(item.status.as_deref()),
            thumbnail: item.thumbnail.unwrap_or_default(),
            year: item.year.unwrap_or_default(),
        }
    }

    /// A show needs both artwork and a description to be listed.
    pub fn is_presentable(&self) -> bool {
        !self.thumbnail.trim().is_empty() && !self.overview.trim().is_empty()
    }

    /// Whether the next episode airs on the given UTC calendar date.
    pub fn airs_on(&self, date: NaiveDate) -> bool {
        self.next_aired_date
            .as_deref()
            .and_then(parse_air_date)
            .is_some_and(|aired| aired == date)
    }
}

/// Parse an upstream air date into a UTC calendar date.
///
/// Accepts RFC 3339 timestamps (converted to UTC) and bare `YYYY-MM-DD` dates.
pub fn parse_air_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// `{ "data": ... }` wrapper used by every catalog response.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeriesStatus {
    #[serde(default)]
    pub name: Option<String>,
}

/// Extended series record (`GET /series/{id}/extended`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_aired: Option<String>,
    #[serde(default)]
    pub next_aired: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub status: Option<SeriesStatus>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub year: Option<String>,
    #[serde(default)]
    pub original_language: Option<String>,
    /// Older payloads name the language this way; some carry both.
    #[serde(default)]
    pub primary_language: Option<String>,
}

impl SeriesRecord {
    /// Original language, preferring `originalLanguage`.
    pub fn language(&self) -> Option<&str> {
        self.original_language
            .as_deref()
            .or(self.primary_language.as_deref())
    }
}

/// English translation (`GET /series/{id}/translations/eng`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Translation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
}

/// One search hit (`GET /search`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchItem {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub tvdb_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_air_time: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub year: Option<String>,
    #[serde(default)]
    pub primary_language: Option<String>,
    /// Translated names keyed by language code.
    #[serde(default, deserialize_with = "null_as_default")]
    pub translations: HashMap<String, String>,
    /// Translated overviews keyed by language code.
    #[serde(default, deserialize_with = "null_as_default")]
    pub overviews: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    StringOrNumber::deserialize(deserializer).map(String::from)
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(String::from))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
