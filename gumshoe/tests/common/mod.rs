//! Shared fixtures for gumshoe integration tests.
//!
//! Tests run against an in-memory SQLite database with migrations applied,
//! a scripted catalog, a recording mailer and a manual clock.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use gumshoe::auth::{HmacSigner, SignatureAuthenticator, SignedToken};
use gumshoe::catalog::{
    CatalogApi, CatalogClient, CatalogClientConfig, CatalogError, SearchItem, SeriesRecord,
    Translation,
};
use gumshoe::clock::ManualClock;
use gumshoe::database::repositories::{SqlxBlacklistRepository, SqlxSubscriptionRepository};
use gumshoe::database::{DbPool, init_pool_with_size, run_migrations};
use gumshoe::notification::pipeline::PipelineServices;
use gumshoe::notification::{
    MailDispatcher, MailError, MailTemplates, NotificationPipeline, OutgoingMail, PipelineConfig,
};

pub const API_URL: &str = "https://api.gumshoe.tv";

/// 2024-03-05T00:00:00Z, the default "today" of the fixtures.
pub fn run_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()
}

/// Fresh in-memory database with the schema applied.
pub async fn setup_test_db() -> DbPool {
    let pool = init_pool_with_size("sqlite::memory:", 1)
        .await
        .expect("Failed to create test pool");

    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Tracks how many calls are in flight at once.
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

/// Catalog that serves a fixed set of shows. Unknown ids fail with a 500.
#[derive(Default)]
pub struct ScriptedCatalog {
    shows: Mutex<HashMap<String, SeriesRecord>>,
    latency: Option<Duration>,
    pub lookups: InFlight,
}

impl ScriptedCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Register a show whose next episode airs at `next_aired`.
    pub fn show(self, id: &str, name: &str, next_aired: Option<&str>) -> Self {
        self.shows.lock().insert(
            id.to_string(),
            SeriesRecord {
                id: id.to_string(),
                name: Some(name.to_string()),
                next_aired: next_aired.map(str::to_string),
                original_language: Some("eng".to_string()),
                ..Default::default()
            },
        );
        self
    }
}

#[async_trait]
impl CatalogApi for ScriptedCatalog {
    async fn login(&self, _api_key: &str, _pin: &str) -> Result<String, CatalogError> {
        Ok("test-token".to_string())
    }

    async fn search_series(&self, _: &str, _: &str) -> Result<Vec<SearchItem>, CatalogError> {
        Ok(Vec::new())
    }

    async fn series_extended(&self, _: &str, id: &str) -> Result<SeriesRecord, CatalogError> {
        self.lookups.enter();
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let found = self.shows.lock().get(id).cloned();
        self.lookups.exit();

        found.ok_or_else(|| CatalogError::Status {
            endpoint: format!("/series/{id}/extended"),
            status: 500,
        })
    }

    async fn series_translation(
        &self,
        _: &str,
        _: &str,
        _: &str,
    ) -> Result<Option<Translation>, CatalogError> {
        Ok(None)
    }
}

/// Mailer that records every message and fails for chosen recipients.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    failing: HashSet<String>,
    latency: Option<Duration>,
    pub sends: InFlight,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(recipients: &[&str]) -> Self {
        Self {
            failing: recipients.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, email: &str) -> Vec<OutgoingMail> {
        self.sent().into_iter().filter(|m| m.to == email).collect()
    }
}

#[async_trait]
impl MailDispatcher for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        self.sends.enter();
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.sends.exit();

        if self.failing.contains(&mail.to) {
            return Err(MailError::Transport(format!("mailbox unavailable: {}", mail.to)));
        }
        self.sent.lock().push(mail.clone());
        Ok(())
    }
}

/// A wired-up pipeline over real repositories.
pub struct Harness {
    pub pool: DbPool,
    pub clock: Arc<ManualClock>,
    pub catalog: Arc<ScriptedCatalog>,
    pub mailer: Arc<RecordingMailer>,
    pub subscriptions: Arc<SqlxSubscriptionRepository>,
    pub blacklist: Arc<SqlxBlacklistRepository>,
    pub authenticator: Arc<SignatureAuthenticator>,
    pub pipeline: NotificationPipeline,
}

impl Harness {
    pub async fn new(catalog: ScriptedCatalog, mailer: RecordingMailer) -> Self {
        Self::with_config(catalog, mailer, PipelineConfig::default()).await
    }

    pub async fn with_config(
        catalog: ScriptedCatalog,
        mailer: RecordingMailer,
        config: PipelineConfig,
    ) -> Self {
        let pool = setup_test_db().await;
        let clock = Arc::new(ManualClock::new(run_date()));
        let catalog = Arc::new(catalog);
        let mailer = Arc::new(mailer);
        let subscriptions = Arc::new(SqlxSubscriptionRepository::new(pool.clone()));
        let blacklist = Arc::new(SqlxBlacklistRepository::new(pool.clone()));

        let authenticator = Arc::new(SignatureAuthenticator::new(
            Arc::new(HmacSigner::new("integration-secret").unwrap()),
            blacklist.clone(),
            clock.clone(),
        ));

        let services = PipelineServices {
            subscriptions: subscriptions.clone(),
            blacklist: blacklist.clone(),
            catalog: Arc::new(CatalogClient::new(
                catalog.clone(),
                CatalogClientConfig::new("key", "pin"),
                clock.clone(),
            )),
            authenticator: authenticator.clone(),
            mailer: mailer.clone(),
            templates: Arc::new(MailTemplates::new(API_URL).unwrap()),
            clock: clock.clone(),
        };

        Self {
            pool,
            clock,
            catalog,
            mailer,
            subscriptions,
            blacklist,
            authenticator,
            pipeline: NotificationPipeline::new(services, config),
        }
    }
}

/// Extract the signed token behind the first `/auth/{action}?` link in an
/// HTML body.
pub fn token_from_link(html: &str, action: &str) -> SignedToken {
    let marker = format!("{API_URL}/auth/{action}?");
    let start = html.find(&marker).expect("link present") + marker.len();
    let end = start + html[start..].find('"').expect("closing quote");
    let query = html[start..end].replace("&amp;", "&");
    SignedToken::from_query(&query).expect("well-formed token")
}
