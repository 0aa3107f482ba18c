//! Cron-driven trigger for the daily notification run.
//!
//! The scheduler sleeps until the next cron slot (UTC), runs the job for that
//! slot, and repeats until its cancellation token fires. A failed run is
//! logged and the loop waits for the next slot; runs never overlap.
//!
//! The job is handed the slot it was scheduled for rather than reading the
//! clock, so a timer that wakes a little early still runs for the right day.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::notification::NotificationPipeline;
use crate::{Error, Result};

/// Default schedule: every day at midnight UTC.
pub const DEFAULT_NOTIFY_CRON: &str = "0 0 0 * * *";

/// A job the scheduler can trigger.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;

    /// Run for the cron slot `slot`.
    async fn run(&self, slot: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
impl ScheduledJob for NotificationPipeline {
    fn name(&self) -> &str {
        "daily-notification"
    }

    async fn run(&self, slot: DateTime<Utc>) -> Result<()> {
        self.run_for(slot.date_naive()).await.map(|_| ())
    }
}

/// Runs a [`ScheduledJob`] on a cron schedule.
pub struct DailyScheduler {
    schedule: cron::Schedule,
    job: Arc<dyn ScheduledJob>,
    clock: Arc<dyn Clock>,
    cancellation_token: CancellationToken,
}

impl DailyScheduler {
    /// Create a scheduler from a 6-field cron expression
    /// (`sec min hour day month weekday`).
    pub fn new(
        expression: &str,
        job: Arc<dyn ScheduledJob>,
        clock: Arc<dyn Clock>,
        cancellation_token: CancellationToken,
    ) -> Result<Self> {
        let schedule = cron::Schedule::from_str(expression)
            .map_err(|e| Error::config(format!("invalid cron expression '{expression}': {e}")))?;

        Ok(Self {
            schedule,
            job,
            clock,
            cancellation_token,
        })
    }

    /// Get the cancellation token for this scheduler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// First slot strictly after `after`.
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Run until cancelled.
    pub async fn run(self) {
        info!(job = %self.job.name(), schedule = %self.schedule, "Scheduler started");
        let mut last_fire: Option<DateTime<Utc>> = None;

        loop {
            let now = self.clock.now();
            // Never fire the same slot twice
            let from = last_fire.map_or(now, |last| last.max(now));
            let Some(next) = self.next_fire(from) else {
                warn!(job = %self.job.name(), "Schedule has no upcoming slots; stopping");
                break;
            };

            let wait = (next - now).to_std().unwrap_or_default();
            debug!(job = %self.job.name(), next = %next, wait_secs = wait.as_secs(), "Waiting for next slot");

            tokio::select! {
                _ = self.cancellation_token.cancelled() => {
                    info!(job = %self.job.name(), "Scheduler received cancellation signal");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            last_fire = Some(next);
            info!(job = %self.job.name(), slot = %next, "Triggering scheduled run");
            if let Err(e) = self.job.run(next).await {
                error!(job = %self.job.name(), error = %e, "Scheduled run failed");
            }
        }

        info!(job = %self.job.name(), "Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio::sync::mpsc;

    use crate::clock::ManualClock;

    struct CountingJob {
        tx: mpsc::UnboundedSender<DateTime<Utc>>,
        fail: bool,
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run(&self, slot: DateTime<Utc>) -> Result<()> {
            let _ = self.tx.send(slot);
            if self.fail {
                return Err(Error::Other("run failed".to_string()));
            }
            Ok(())
        }
    }

    fn clock_at(h: u32, m: u32, s: u32) -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 5, h, m, s).unwrap(),
        ))
    }

    #[test]
    fn test_invalid_expression_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = DailyScheduler::new(
            "every day at noon",
            Arc::new(CountingJob { tx, fail: false }),
            clock_at(0, 0, 0),
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_next_fire_is_next_utc_midnight() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = DailyScheduler::new(
            DEFAULT_NOTIFY_CRON,
            Arc::new(CountingJob { tx, fail: false }),
            clock_at(12, 0, 0),
            CancellationToken::new(),
        )
        .unwrap();

        let next = scheduler
            .next_fire(Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap())
            .unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap());

        let after_midnight = scheduler.next_fire(next).unwrap();
        assert_eq!(after_midnight, Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_at_slot_and_survives_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let scheduler = DailyScheduler::new(
            DEFAULT_NOTIFY_CRON,
            Arc::new(CountingJob { tx, fail: true }),
            clock_at(23, 59, 59),
            token.clone(),
        )
        .unwrap();

        let handle = tokio::spawn(scheduler.run());

        let slot = rx.recv().await.unwrap();
        assert_eq!(slot, Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap());
        // Still scheduled for the next day despite the failure
        assert!(!handle.is_finished());

        token.cancel();
        handle.await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lagging_clock_still_runs_for_slot_date() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        // The wall clock never reaches midnight while the timer fires
        let clock = clock_at(23, 59, 58);
        let scheduler = DailyScheduler::new(
            DEFAULT_NOTIFY_CRON,
            Arc::new(CountingJob { tx, fail: false }),
            clock.clone(),
            token.clone(),
        )
        .unwrap();

        let handle = tokio::spawn(scheduler.run());

        let slot = rx.recv().await.unwrap();
        assert!(clock.now() < slot);
        assert_eq!(
            slot.date_naive(),
            chrono::NaiveDate::from_ymd_opt(2024, 3, 6).unwrap()
        );

        token.cancel();
        handle.await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancel_before_first_slot() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let scheduler = DailyScheduler::new(
            DEFAULT_NOTIFY_CRON,
            Arc::new(CountingJob { tx, fail: false }),
            clock_at(0, 0, 1),
            token.clone(),
        )
        .unwrap();

        token.cancel();
        scheduler.run().await;

        assert!(rx.try_recv().is_err());
    }
}
