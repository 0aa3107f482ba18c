//! Subscriber models.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row of the `subscribers` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubscriberDbModel {
    pub email: String,
    /// Unix epoch milliseconds (UTC) when the subscriber was created.
    pub created_at: i64,
    /// Unix epoch milliseconds (UTC) of the last subscription change.
    pub updated_at: i64,
}

/// A subscriber together with the set of media ids they follow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub email: String,
    pub media_ids: BTreeSet<String>,
}

impl Subscriber {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            media_ids: BTreeSet::new(),
        }
    }

    pub fn with_media<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.media_ids.extend(ids.into_iter().map(Into::into));
        self
    }
}
