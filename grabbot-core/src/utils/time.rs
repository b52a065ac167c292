use chrono::{DateTime, Duration, DurationRound, TimeZone, Utc};
use parking_lot::Mutex;

/// Source of wall-clock time for everything that cares about hour windows.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// Starts at `epoch` seconds.
    pub fn at_epoch(epoch: i64) -> Self {
        Self::new(from_epoch(epoch))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Truncates to the start of the hour, `12:34:56` => `12:00:00`.
pub fn hour_start(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.duration_trunc(Duration::hours(1)).unwrap_or(dt)
}

/// Convert epoch seconds (i64) to `DateTime<Utc>`, falling back to 1970-01-01.
pub fn from_epoch(epoch: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(epoch, 0).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_start_truncates() {
        // 2024-01-01T12:34:56Z
        let dt = from_epoch(1_704_112_496);
        let start = hour_start(dt);
        assert_eq!(start.timestamp(), 1_704_110_400);
        assert_eq!(hour_start(start), start);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::at_epoch(1_704_110_400);
        clock.advance(Duration::minutes(61));
        assert_eq!(clock.now().timestamp(), 1_704_110_400 + 61 * 60);
    }
}
