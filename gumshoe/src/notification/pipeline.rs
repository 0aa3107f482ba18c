//! The nightly new-episode notification run.
//!
//! One run walks `LOAD -> FILTER -> FETCH -> AGGREGATE -> NOTIFY`:
//!
//! - LOAD reads the whole blacklist and every subscriber. A failure here
//!   aborts the run with [`Error::RunFatal`].
//! - FILTER drops blacklisted subscribers.
//! - FETCH looks up each (subscriber, media id) pair through the catalog
//!   limiter. A failed lookup only costs that subscriber that show.
//! - AGGREGATE keeps the names of shows whose next episode airs today (UTC).
//! - NOTIFY mails each subscriber with a non-empty list through the email
//!   limiter. A failed send is logged and counted, never retried.
//!
//! The run resolves after every send task has settled, and its
//! [`RunReport`] counts what happened.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::{MailDispatcher, MailError, MailTemplates};
use crate::auth::SignatureAuthenticator;
use crate::catalog::CatalogClient;
use crate::clock::Clock;
use crate::database::models::{Subscriber, normalize_email};
use crate::database::repositories::{BlacklistRepository, SubscriptionRepository};
use crate::limiter::ConcurrencyLimiter;
use crate::{Error, Result};

/// Limiter capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Concurrent catalog lookups (default: 10).
    pub catalog_concurrency: usize,
    /// Concurrent mail sends (default: 3).
    pub email_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            catalog_concurrency: 10,
            email_concurrency: 3,
        }
    }
}

/// Collaborators of the pipeline.
#[derive(Clone)]
pub struct PipelineServices {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub blacklist: Arc<dyn BlacklistRepository>,
    pub catalog: Arc<CatalogClient>,
    pub authenticator: Arc<SignatureAuthenticator>,
    pub mailer: Arc<dyn MailDispatcher>,
    pub templates: Arc<MailTemplates>,
    pub clock: Arc<dyn Clock>,
}

/// Counts from one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// UTC calendar date the run matched air dates against.
    pub date: NaiveDate,
    pub subscribers_loaded: usize,
    pub subscribers_blacklisted: usize,
    pub lookups: usize,
    pub lookup_failures: usize,
    /// Subscribers with at least one show airing today.
    pub notifications_queued: usize,
    pub mails_sent: usize,
    pub mail_failures: usize,
}

/// What happened for one subscriber.
#[derive(Debug, Default)]
struct SubscriberOutcome {
    lookups: usize,
    lookup_failures: usize,
    /// `None` when nothing airs today.
    delivered: Option<bool>,
}

pub struct NotificationPipeline {
    services: PipelineServices,
    catalog_limiter: ConcurrencyLimiter,
    email_limiter: ConcurrencyLimiter,
}

impl NotificationPipeline {
    pub fn new(services: PipelineServices, config: PipelineConfig) -> Self {
        Self {
            services,
            catalog_limiter: ConcurrencyLimiter::new("catalog", config.catalog_concurrency),
            email_limiter: ConcurrencyLimiter::new("email", config.email_concurrency),
        }
    }

    pub fn catalog_limiter(&self) -> &ConcurrencyLimiter {
        &self.catalog_limiter
    }

    pub fn email_limiter(&self) -> &ConcurrencyLimiter {
        &self.email_limiter
    }

    /// Run the pipeline once for the current UTC date.
    pub async fn run_once(&self) -> Result<RunReport> {
        self.run_for(self.services.clock.now().date_naive()).await
    }

    /// Run the pipeline once, matching air dates against `today`.
    pub async fn run_for(&self, today: NaiveDate) -> Result<RunReport> {
        let started = Instant::now();
        info!(date = %today, "Starting notification run");

        // LOAD
        let (blacklist, subscribers) = tokio::try_join!(
            async {
                self.services
                    .blacklist
                    .find_all()
                    .await
                    .map_err(|e| Error::run_fatal("blacklist", e))
            },
            async {
                self.services
                    .subscriptions
                    .find_all()
                    .await
                    .map_err(|e| Error::run_fatal("subscribers", e))
            },
        )?;

        let mut report = RunReport {
            date: today,
            subscribers_loaded: subscribers.len(),
            ..Default::default()
        };

        // FILTER
        let blacklisted: HashSet<String> = blacklist
            .into_iter()
            .map(|entry| normalize_email(&entry.email))
            .collect();
        let eligible: Vec<Subscriber> = subscribers
            .into_iter()
            .filter(|s| !blacklisted.contains(&normalize_email(&s.email)))
            .collect();
        report.subscribers_blacklisted = report.subscribers_loaded - eligible.len();
        debug!(
            eligible = eligible.len(),
            blacklisted = report.subscribers_blacklisted,
            "Filtered subscribers"
        );

        // FETCH, AGGREGATE and NOTIFY, all subscribers concurrently
        let outcomes = join_all(
            eligible
                .into_iter()
                .map(|subscriber| self.process_subscriber(subscriber, today)),
        )
        .await;

        for outcome in outcomes {
            report.lookups += outcome.lookups;
            report.lookup_failures += outcome.lookup_failures;
            match outcome.delivered {
                Some(true) => {
                    report.notifications_queued += 1;
                    report.mails_sent += 1;
                }
                Some(false) => {
                    report.notifications_queued += 1;
                    report.mail_failures += 1;
                }
                None => {}
            }
        }

        info!(
            date = %today,
            subscribers = report.subscribers_loaded,
            blacklisted = report.subscribers_blacklisted,
            lookups = report.lookups,
            lookup_failures = report.lookup_failures,
            mails_sent = report.mails_sent,
            mail_failures = report.mail_failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Notification run completed"
        );

        Ok(report)
    }

    async fn process_subscriber(
        &self,
        subscriber: Subscriber,
        today: NaiveDate,
    ) -> SubscriberOutcome {
        let mut outcome = SubscriberOutcome {
            lookups: subscriber.media_ids.len(),
            ..Default::default()
        };

        // FETCH
        let handles: Vec<_> = subscriber
            .media_ids
            .iter()
            .map(|id| {
                let catalog = self.services.catalog.clone();
                let id = id.clone();
                self.catalog_limiter
                    .submit(async move { catalog.get_show(&id).await })
            })
            .collect();

        // AGGREGATE
        let mut airing: Vec<String> = Vec::new();
        for (id, result) in subscriber.media_ids.iter().zip(join_all(handles).await) {
            match result {
                Ok(Ok(show)) => {
                    if show.airs_on(today) {
                        airing.push(show.name);
                    }
                }
                Ok(Err(e)) => {
                    outcome.lookup_failures += 1;
                    warn!(
                        email = %subscriber.email,
                        media_id = %id,
                        error = %e,
                        "Catalog lookup failed"
                    );
                }
                Err(e) => {
                    outcome.lookup_failures += 1;
                    warn!(
                        email = %subscriber.email,
                        media_id = %id,
                        error = %e,
                        "Catalog lookup aborted"
                    );
                }
            }
        }

        if airing.is_empty() {
            return outcome;
        }

        // NOTIFY
        let handle = self.email_limiter.submit(send_daily_notification(
            self.services.clone(),
            subscriber.email.clone(),
            airing,
            today,
        ));

        outcome.delivered = Some(match handle.await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(email = %subscriber.email, error = %e, "Failed to send daily notification");
                false
            }
            Err(e) => {
                error!(email = %subscriber.email, error = %e, "Daily notification task aborted");
                false
            }
        });

        outcome
    }
}

async fn send_daily_notification(
    services: PipelineServices,
    email: String,
    shows: Vec<String>,
    today: NaiveDate,
) -> std::result::Result<(), MailError> {
    let token = services.authenticator.create_token(&email).await?;
    let mail = services.templates.daily_notification(&token, &shows, today);
    services.mailer.send(&mail).await?;

    info!(email = %token.email, shows = shows.len(), "Daily notification sent");
    Ok(())
}
