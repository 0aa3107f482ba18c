//! Blacklist model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::ms_to_datetime;

/// Row of the `blacklist` table. Entries are never updated.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BlacklistDbModel {
    pub email: String,
    /// Unix epoch milliseconds (UTC) when the address opted out.
    pub created_at: i64,
}

impl BlacklistDbModel {
    pub fn created_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.created_at)
    }
}
