//! Injectable time source.
//!
//! Token expiry, cache staleness and the pipeline's notion of "today" all read
//! the current time through [`Clock`], so tests can pin or advance it.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// A source of the current UTC time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current time as Unix epoch milliseconds (UTC).
    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_advance() {
        let start = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        clock.advance(Duration::hours(25));

        assert_eq!(clock.now(), Utc.with_ymd_and_hms(2024, 3, 6, 1, 0, 0).unwrap());
        assert_eq!(clock.now_ms(), clock.now().timestamp_millis());
    }
}
