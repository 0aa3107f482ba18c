//! Blacklist repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{BlacklistDbModel, normalize_email};
use crate::database::time::now_ms;

/// Blacklist repository trait.
#[async_trait]
pub trait BlacklistRepository: Send + Sync {
    /// Find an entry by email (case-insensitive).
    async fn find_by_email(&self, email: &str) -> Result<Option<BlacklistDbModel>>;

    /// Every blacklisted address.
    async fn find_all(&self) -> Result<Vec<BlacklistDbModel>>;

    /// Insert an entry. Returns `false` when the email was already present,
    /// including when a concurrent insert won the race.
    async fn insert(&self, email: &str) -> Result<bool>;
}

/// SQLx implementation of BlacklistRepository.
pub struct SqlxBlacklistRepository {
    pool: SqlitePool,
}

impl SqlxBlacklistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlacklistRepository for SqlxBlacklistRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<BlacklistDbModel>> {
        let entry =
            sqlx::query_as::<_, BlacklistDbModel>("SELECT * FROM blacklist WHERE email = ?")
                .bind(normalize_email(email))
                .fetch_optional(&self.pool)
                .await?;
        Ok(entry)
    }

    async fn find_all(&self) -> Result<Vec<BlacklistDbModel>> {
        let entries = sqlx::query_as::<_, BlacklistDbModel>("SELECT * FROM blacklist ORDER BY email")
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    async fn insert(&self, email: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO blacklist (email, created_at)
            VALUES (?, ?)
            ON CONFLICT(email) DO NOTHING
            "#,
        )
        .bind(normalize_email(email))
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
