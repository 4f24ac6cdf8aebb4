//! Per-user rate limiting for the user-facing API.
//!
//! Sliding-window counters keyed by user id, protected by a mutex. Three
//! windows exist: a general per-user limit for all authenticated endpoints,
//! and stricter windows for node creation and trial activation.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::errors::{Error, Result};

/// Container for all per-user rate limiters.
#[derive(Debug)]
pub struct Limiters {
    /// All authenticated user endpoints: 30 requests / minute.
    pub general: SlidingWindowLimiter,
    /// Node creation: 5 requests / hour.
    pub node_create: SlidingWindowLimiter,
    /// Trial activation: 10 requests / hour.
    pub trial_activate: SlidingWindowLimiter,
}

impl Default for Limiters {
    fn default() -> Self {
        Self {
            general: SlidingWindowLimiter::new(30, Duration::from_secs(60)),
            node_create: SlidingWindowLimiter::new(5, Duration::from_secs(3600)),
            trial_activate: SlidingWindowLimiter::new(10, Duration::from_secs(3600)),
        }
    }
}

/// A fixed-size sliding window per key.
///
/// Timestamps older than the window are evicted on each check, so memory per
/// key is bounded by `max_requests`. Keys whose windows drain empty are
/// removed to keep the map from growing with one entry per user ever seen.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    entries: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request for `key`, rejecting it if the window is full.
    pub fn check(&self, key: &str) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("rate limiter mutex poisoned");

        // Opportunistically drop drained windows for other keys.
        entries.retain(|k, window| {
            if k == key {
                return true;
            }
            while let Some(front) = window.front() {
                if now.duration_since(*front) >= self.window {
                    window.pop_front();
                } else {
                    break;
                }
            }
            !window.is_empty()
        });

        let window = entries.entry(key.to_string()).or_default();
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.max_requests {
            return Err(Error::TooManyRequests {
                message: "Rate limit exceeded. Please retry later.".to_string(),
            });
        }

        window.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allows_up_to_limit() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check("u1").is_ok());
        assert!(limiter.check("u1").is_ok());
        assert!(limiter.check("u1").is_ok());
        assert!(limiter.check("u1").is_err());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("u1").is_ok());
        assert!(limiter.check("u2").is_ok());
        assert!(limiter.check("u1").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("u1").is_ok());
        assert!(limiter.check("u1").is_ok());
        assert!(limiter.check("u1").is_err());

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(limiter.check("u1").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drained_keys_are_evicted() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("u1").is_ok());

        tokio::time::advance(Duration::from_secs(61)).await;

        // touching another key sweeps u1's drained window out of the map
        assert!(limiter.check("u2").is_ok());
        let entries = limiter.entries.lock().unwrap();
        assert!(!entries.contains_key("u1"));
    }

    #[tokio::test]
    async fn test_rejection_is_too_many_requests() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        let _ = limiter.check("u1");
        match limiter.check("u1") {
            Err(Error::TooManyRequests { .. }) => {}
            other => panic!("expected TooManyRequests, got {other:?}"),
        }
    }
}
