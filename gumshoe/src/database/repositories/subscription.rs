//! Subscription repository.
//!
//! A subscriber row is created on the first add and never deleted here.
//! Removing the last media id leaves an empty subscriber behind.

use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};

use crate::Result;
use crate::database::models::{Subscriber, SubscriberDbModel, normalize_email};
use crate::database::time::now_ms;

/// Subscription repository trait.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Find a subscriber by email (case-insensitive).
    async fn find_by_email(&self, email: &str) -> Result<Option<Subscriber>>;

    /// Every subscriber with their media ids.
    async fn find_all(&self) -> Result<Vec<Subscriber>>;

    /// Add a media id to the subscriber's set, creating the subscriber if
    /// needed. Adding an id that is already present is a no-op.
    async fn add_media(&self, email: &str, media_id: &str) -> Result<Subscriber>;

    /// Remove a media id from the subscriber's set. Returns `None` for an
    /// unknown subscriber.
    async fn remove_media(&self, email: &str, media_id: &str) -> Result<Option<Subscriber>>;
}

/// SQLx implementation of SubscriptionRepository.
pub struct SqlxSubscriptionRepository {
    pool: SqlitePool,
}

impl SqlxSubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load(conn: &mut SqliteConnection, email: &str) -> Result<Option<Subscriber>> {
        let row = sqlx::query_as::<_, SubscriberDbModel>("SELECT * FROM subscribers WHERE email = ?")
            .bind(email)
            .fetch_optional(&mut *conn)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT media_id FROM subscriber_media WHERE email = ? ORDER BY media_id",
        )
        .bind(email)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(
            Subscriber::new(row.email).with_media(ids.into_iter().map(|(id,)| id)),
        ))
    }
}

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Subscriber>> {
        let mut conn = self.pool.acquire().await?;
        Self::load(&mut *conn, &normalize_email(email)).await
    }

    async fn find_all(&self) -> Result<Vec<Subscriber>> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT s.email, m.media_id
            FROM subscribers s
            LEFT JOIN subscriber_media m ON m.email = s.email
            ORDER BY s.email, m.media_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut subscribers: Vec<Subscriber> = Vec::new();
        for (email, media_id) in rows {
            if subscribers.last().is_none_or(|s| s.email != email) {
                subscribers.push(Subscriber::new(email));
            }
            if let (Some(current), Some(id)) = (subscribers.last_mut(), media_id) {
                current.media_ids.insert(id);
            }
        }

        Ok(subscribers)
    }

    async fn add_media(&self, email: &str, media_id: &str) -> Result<Subscriber> {
        let email = normalize_email(email);
        let now = now_ms();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO subscribers (email, created_at, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET updated_at = excluded.updated_at
            "#,
        )
        .bind(&email)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO subscriber_media (email, media_id, added_at)
            VALUES (?, ?, ?)
            ON CONFLICT(email, media_id) DO NOTHING
            "#,
        )
        .bind(&email)
        .bind(media_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let subscriber = Self::load(&mut *tx, &email)
            .await?
            .unwrap_or_else(|| Subscriber::new(email.as_str()).with_media([media_id]));
        tx.commit().await?;

        Ok(subscriber)
    }

    async fn remove_media(&self, email: &str, media_id: &str) -> Result<Option<Subscriber>> {
        let email = normalize_email(email);
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM subscriber_media WHERE email = ? AND media_id = ?")
            .bind(&email)
            .bind(media_id)
            .execute(&mut *tx)
            .await?;

        if removed.rows_affected() > 0 {
            sqlx::query("UPDATE subscribers SET updated_at = ? WHERE email = ?")
                .bind(now_ms())
                .bind(&email)
                .execute(&mut *tx)
                .await?;
        }

        let subscriber = Self::load(&mut *tx, &email).await?;
        tx.commit().await?;

        Ok(subscriber)
    }
}
