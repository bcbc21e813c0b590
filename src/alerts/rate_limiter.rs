use chrono::Duration;
use std::collections::VecDeque;

use crate::events::Timestamp;

/// Sliding-window limiter for outgoing alerts
///
/// Tracks when recent alerts were delivered and refuses new ones once the
/// window holds `max_per_window` deliveries. Every query takes the current time
/// explicitly so the window can be driven deterministically.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum number of deliveries allowed inside one window
    max_per_window: usize,
    /// Length of the sliding window
    window: Duration,
    /// Delivery times still inside the window
    recent_deliveries: VecDeque<Timestamp>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::per_minute(30)
    }
}

impl RateLimiter {
    /// Create a limiter allowing `max_per_minute` deliveries per rolling minute
    pub fn per_minute(max_per_minute: usize) -> Self {
        Self::new(max_per_minute, Duration::minutes(1))
    }

    /// Create a limiter with an arbitrary window length
    pub fn new(max_per_window: usize, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            recent_deliveries: VecDeque::new(),
        }
    }

    /// Check whether another delivery fits in the window ending at `now`
    pub fn can_send_at(&mut self, now: Timestamp) -> bool {
        self.expire(now);
        self.recent_deliveries.len() < self.max_per_window
    }

    /// Record a delivery made at `now`
    pub fn record_at(&mut self, now: Timestamp) {
        self.recent_deliveries.push_back(now);
        self.expire(now);
    }

    /// Give back a slot recorded at `time`, e.g. after a failed delivery
    pub fn release_at(&mut self, time: Timestamp) {
        if let Some(index) = self.recent_deliveries.iter().rposition(|&t| t == time) {
            self.recent_deliveries.remove(index);
        }
    }

    /// Number of deliveries inside the window ending at `now`
    pub fn count_at(&mut self, now: Timestamp) -> usize {
        self.expire(now);
        self.recent_deliveries.len()
    }

    /// Drop deliveries that fell out of the window ending at `now`
    ///
    /// Entries are not assumed to be in chronological order.
    fn expire(&mut self, now: Timestamp) {
        let cutoff = now - self.window;
        self.recent_deliveries.retain(|&time| time > cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_allows_within_limit() {
        let mut limiter = RateLimiter::per_minute(3);
        let now = Utc::now();

        for _ in 0..3 {
            assert!(limiter.can_send_at(now));
            limiter.record_at(now);
        }

        assert!(!limiter.can_send_at(now));
    }

    #[test]
    fn test_window_slides() {
        let mut limiter = RateLimiter::per_minute(2);
        let now = Utc::now();

        limiter.record_at(now - Duration::seconds(50));
        limiter.record_at(now - Duration::seconds(10));
        assert!(!limiter.can_send_at(now));

        // First delivery leaves the window 11 seconds later
        assert!(limiter.can_send_at(now + Duration::seconds(11)));
        assert_eq!(limiter.count_at(now + Duration::seconds(11)), 1);
    }

    #[test]
    fn test_old_records_expire_immediately() {
        let mut limiter = RateLimiter::per_minute(5);
        let now = Utc::now();

        limiter.record_at(now - Duration::seconds(30));
        limiter.record_at(now - Duration::minutes(5));

        assert_eq!(limiter.count_at(now), 1);
    }

    #[test]
    fn test_release_returns_one_slot() {
        let mut limiter = RateLimiter::per_minute(2);
        let now = Utc::now();

        limiter.record_at(now);
        limiter.record_at(now);
        limiter.release_at(now);
        assert_eq!(limiter.count_at(now), 1);

        // Releasing a time that was never recorded changes nothing
        limiter.release_at(now - Duration::seconds(3));
        assert_eq!(limiter.count_at(now), 1);
    }

    #[test]
    fn test_custom_window() {
        let mut limiter = RateLimiter::new(1, Duration::seconds(5));
        let now = Utc::now();

        limiter.record_at(now);
        assert!(!limiter.can_send_at(now + Duration::seconds(4)));
        assert!(limiter.can_send_at(now + Duration::seconds(5)));
    }
}
