// File: src/cache/rate_window.rs

use chrono::{DateTime, Utc};
use crate::utils::time::hour_start;

/// Result of asking the window to take one more code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Accepted, and it used the last slot of this hour.
    AcceptedFinal,
    RejectedDuplicate,
    RejectedRateLimited,
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted | Admission::AcceptedFinal)
    }
}

/// Codes processed during the current wall-clock hour, in arrival order.
///
/// With `ceiling > 0` the window never holds more than `ceiling` entries.
/// A ceiling of 0 disables the limit; duplicates are still rejected.
#[derive(Debug, Clone)]
pub struct RateWindow {
    ceiling: usize,
    window_start: Option<DateTime<Utc>>,
    codes: Vec<String>,
}

impl RateWindow {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            window_start: None,
            codes: Vec::new(),
        }
    }

    /// Clears the window if `now` belongs to a later hour than the current
    /// window. Returns true when a reset happened.
    pub fn roll_over(&mut self, now: DateTime<Utc>) -> bool {
        let hour = hour_start(now);
        match self.window_start {
            Some(start) if start >= hour => false,
            previous => {
                self.window_start = Some(hour);
                self.codes.clear();
                // The very first call only opens a window.
                previous.is_some()
            }
        }
    }

    /// Call [`RateWindow::roll_over`] first; `admit` only looks at the
    /// current contents.
    pub fn admit(&mut self, code: &str) -> Admission {
        if self.codes.iter().any(|c| c == code) {
            return Admission::RejectedDuplicate;
        }
        if self.ceiling > 0 && self.codes.len() >= self.ceiling {
            return Admission::RejectedRateLimited;
        }
        self.codes.push(code.to_string());
        if self.ceiling > 0 && self.codes.len() == self.ceiling {
            Admission::AcceptedFinal
        } else {
            Admission::Accepted
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.iter().any(|c| c == code)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// 0 = unlimited.
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn window_start(&self) -> Option<DateTime<Utc>> {
        self.window_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::utils::time::from_epoch;

    // 2024-01-01T12:00:00Z
    const NOON: i64 = 1_704_110_400;

    #[test]
    fn duplicate_within_the_hour_is_rejected() {
        let mut w = RateWindow::new(0);
        w.roll_over(from_epoch(NOON));
        assert_eq!(w.admit("AB3D9F8K"), Admission::Accepted);
        assert_eq!(w.admit("AB3D9F8K"), Admission::RejectedDuplicate);
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn ceiling_is_never_exceeded() {
        let mut w = RateWindow::new(2);
        w.roll_over(from_epoch(NOON));
        assert_eq!(w.admit("AAAA1111"), Admission::Accepted);
        assert_eq!(w.admit("BBBB2222"), Admission::AcceptedFinal);
        assert_eq!(w.admit("CCCC3333"), Admission::RejectedRateLimited);
        assert_eq!(w.len(), 2);
        assert!(!w.contains("CCCC3333"));
    }

    #[test]
    fn zero_ceiling_is_unlimited() {
        let mut w = RateWindow::new(0);
        w.roll_over(from_epoch(NOON));
        for i in 0..500 {
            assert_eq!(w.admit(&format!("CODE{i:04}")), Admission::Accepted);
        }
        assert_eq!(w.len(), 500);
    }

    #[test]
    fn new_hour_clears_the_window() {
        let mut w = RateWindow::new(1);
        assert!(!w.roll_over(from_epoch(NOON)));
        assert_eq!(w.admit("AAAA1111"), Admission::AcceptedFinal);

        // same hour, later minute
        assert!(!w.roll_over(from_epoch(NOON) + Duration::minutes(59)));
        assert_eq!(w.admit("BBBB2222"), Admission::RejectedRateLimited);

        assert!(w.roll_over(from_epoch(NOON) + Duration::minutes(60)));
        assert!(w.is_empty());
        assert_eq!(w.admit("AAAA1111"), Admission::AcceptedFinal);
    }

    #[test]
    fn clock_going_backwards_does_not_reset() {
        let mut w = RateWindow::new(0);
        w.roll_over(from_epoch(NOON));
        w.admit("AAAA1111");
        assert!(!w.roll_over(from_epoch(NOON) - Duration::hours(2)));
        assert!(w.contains("AAAA1111"));
    }
}
