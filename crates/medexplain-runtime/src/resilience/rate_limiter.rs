//! Per-caller token bucket.
//!
//! Each key gets `capacity` tokens per window. The whole bucket refills
//! once the window has passed since it was last refilled. Admission takes
//! one token; an empty bucket rejects with the time left in the window.
//!
//! The map shard lock is held only long enough to fetch a bucket handle.
//! The read-modify-write happens under that bucket's own mutex, so callers
//! with different keys never wait on each other.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::RateLimitSettings;

/// Returned when a key has no tokens left in the current window.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("rate limit exceeded, retry after {retry_after:?}")]
pub struct RateLimitExceeded {
    pub retry_after: Duration,
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    window_start: Instant,
    last_seen: Instant,
}

/// Token-bucket limiter keyed by caller id.
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    buckets: DashMap<String, Arc<Mutex<Bucket>>>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            buckets: DashMap::new(),
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::new(settings.capacity, settings.window)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit one request for `key` now.
    pub fn check(&self, key: &str) -> Result<(), RateLimitExceeded> {
        self.check_at(key, Instant::now())
    }

    /// Admit one request for `key` at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<(), RateLimitExceeded> {
        let bucket = self.bucket(key, now);
        let mut bucket = bucket.lock();

        bucket.last_seen = bucket.last_seen.max(now);
        let elapsed = now.saturating_duration_since(bucket.window_start);
        if elapsed >= self.window {
            bucket.tokens = self.capacity;
            bucket.window_start = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            return Ok(());
        }

        let retry_after = self
            .window
            .saturating_sub(now.saturating_duration_since(bucket.window_start));
        Err(RateLimitExceeded { retry_after })
    }

    /// Tokens `key` has left at `now`, without consuming one.
    pub fn remaining_at(&self, key: &str, now: Instant) -> u32 {
        match self.buckets.get(key).map(|entry| Arc::clone(entry.value())) {
            Some(bucket) => {
                let bucket = bucket.lock();
                if now.saturating_duration_since(bucket.window_start) >= self.window {
                    self.capacity
                } else {
                    bucket.tokens
                }
            }
            None => self.capacity,
        }
    }

    /// Drop keys not seen for a full window. Their buckets would have
    /// refilled anyway, so no state is lost.
    pub fn prune_idle(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.lock().last_seen) < self.window);
        let pruned = before.saturating_sub(self.buckets.len());
        if pruned > 0 {
            tracing::debug!(pruned, remaining = self.buckets.len(), "pruned idle rate limit buckets");
        }
        pruned
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    fn bucket(&self, key: &str, now: Instant) -> Arc<Mutex<Bucket>> {
        if let Some(existing) = self.buckets.get(key) {
            return Arc::clone(existing.value());
        }
        let capacity = self.capacity;
        let entry = self.buckets.entry(key.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(Bucket {
                tokens: capacity,
                window_start: now,
                last_seen: now,
            }))
        });
        Arc::clone(entry.value())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_settings(&RateLimitSettings::default())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("capacity", &self.capacity)
            .field("window", &self.window)
            .field("tracked_keys", &self.buckets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_capacity_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("alice", t0).is_ok());
        }
        let err = limiter.check_at("alice", t0 + Duration::from_secs(20)).unwrap_err();
        assert_eq!(err.retry_after, Duration::from_secs(40));
    }

    #[test]
    fn test_refills_after_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let t0 = Instant::now();

        assert!(limiter.check_at("k", t0).is_ok());
        assert!(limiter.check_at("k", t0).is_ok());
        assert!(limiter.check_at("k", t0 + Duration::from_secs(9)).is_err());
        assert!(limiter.check_at("k", t0 + Duration::from_secs(10)).is_ok());
        assert_eq!(limiter.remaining_at("k", t0 + Duration::from_secs(10)), 1);
    }

    #[test]
    fn test_keys_are_isolated() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(limiter.check_at("a", t0).is_ok());
        assert!(limiter.check_at("a", t0).is_err());
        assert!(limiter.check_at("b", t0).is_ok());
        assert_eq!(limiter.remaining_at("c", t0), 1);
    }

    #[test]
    fn test_prune_idle() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let t0 = Instant::now();

        limiter.check_at("old", t0).unwrap();
        limiter.check_at("fresh", t0 + Duration::from_secs(8)).unwrap();
        assert_eq!(limiter.tracked_keys(), 2);

        assert_eq!(limiter.prune_idle(t0 + Duration::from_secs(12)), 1);
        assert_eq!(limiter.tracked_keys(), 1);
        assert!(limiter.check_at("fresh", t0 + Duration::from_secs(12)).is_err());
        assert!(limiter.check_at("old", t0 + Duration::from_secs(12)).is_ok());
    }

    #[test]
    fn test_concurrent_admission_is_exact() {
        let limiter = RateLimiter::new(25, Duration::from_secs(60));
        let t0 = Instant::now();
        let admitted = std::sync::atomic::AtomicU32::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..10 {
                        if limiter.check_at("shared", t0).is_ok() {
                            admitted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(admitted.load(std::sync::atomic::Ordering::SeqCst), 25);
    }
}
