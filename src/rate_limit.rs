//! Rate limit tracker.
//!
//! A heuristic gate driven by the last response the remote service sent.
//! It allows bursts up to `remaining` and opens again once the reset time
//! passes, without waiting for a confirming response.

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::RateLimitHeaders;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiter {
    remaining: i64,
    reset_at: i64,
}

impl RateLimiter {
    /// One call allowed until the first response says otherwise.
    pub fn new(now: i64) -> Self {
        Self {
            remaining: 1,
            reset_at: now,
        }
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    /// Epoch seconds at which the window is believed to reset.
    pub fn reset_at(&self) -> i64 {
        self.reset_at
    }

    pub fn is_allowed(&self, now: i64) -> bool {
        self.remaining > 0 || now >= self.reset_at
    }

    /// Last observation wins. Unparseable headers leave the state untouched.
    pub fn observe(&mut self, remaining: &str, reset: &str) -> Result<()> {
        let remaining: i64 = remaining
            .trim()
            .parse()
            .map_err(|e| Error::Parse(format!("ratelimit-remaining {remaining:?}: {e}")))?;
        let reset_at: i64 = reset
            .trim()
            .parse()
            .map_err(|e| Error::Parse(format!("ratelimit-reset {reset:?}: {e}")))?;

        self.remaining = remaining;
        self.reset_at = reset_at;
        debug!(remaining, reset_at, "rate limit observed");
        Ok(())
    }

    pub fn observe_headers(&mut self, headers: &RateLimitHeaders) -> Result<()> {
        self.observe(&headers.remaining, &headers.reset)
    }

    /// Stop further attempts until the reset time passes.
    pub fn exhaust(&mut self, now: i64) {
        self.remaining = 0;
        let minutes = (self.reset_at - now) as f64 / 60.0;
        info!(reset_at = self.reset_at, minutes, "rate limited, pausing submissions");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_limiter_allows_one_call() {
        let limiter = RateLimiter::new(100);
        assert!(limiter.is_allowed(0));
        assert!(limiter.is_allowed(100));
    }

    #[test]
    fn gate_closes_until_reset() {
        let mut limiter = RateLimiter::new(0);
        limiter.observe("0", "1000").unwrap();
        assert!(!limiter.is_allowed(999));
        assert!(limiter.is_allowed(1000));
        assert!(limiter.is_allowed(1001));
    }

    #[test]
    fn bad_headers_leave_state_unchanged() {
        let mut limiter = RateLimiter::new(0);
        limiter.observe("5", "200").unwrap();
        assert!(limiter.observe("abc", "300").is_err());
        assert!(limiter.observe("3", "").is_err());
        assert_eq!(limiter.remaining(), 5);
        assert_eq!(limiter.reset_at(), 200);
    }

    #[test]
    fn observation_can_move_reset_backward() {
        let mut limiter = RateLimiter::new(0);
        limiter.observe("0", "500").unwrap();
        limiter.observe("0", "400").unwrap();
        assert_eq!(limiter.reset_at(), 400);
    }

    #[test]
    fn exhaust_zeroes_remaining() {
        let mut limiter = RateLimiter::new(0);
        limiter.observe("10", "60").unwrap();
        limiter.exhaust(0);
        assert_eq!(limiter.remaining(), 0);
        assert!(!limiter.is_allowed(59));
        assert!(limiter.is_allowed(60));
    }
}
