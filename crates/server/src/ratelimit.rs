//! Fixed-window request limiter for the public forms, keyed by client IP.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::RateLimitConfig;

/// Expired windows are dropped once every this many checks.
const PRUNE_EVERY: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: DashMap<String, Window>,
    checks: AtomicUsize,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests.max(1),
            window: Duration::from_secs(config.window_secs.max(1)),
            windows: DashMap::new(),
            checks: AtomicUsize::new(0),
        }
    }

    /// Counts one request for `key`. False once the key has used up its
    /// window.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune_at(now);
        }
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }
        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    /// Drops windows that have expired.
    fn prune_at(&self, now: Instant) {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
        tracing::debug!(
            dropped = before.saturating_sub(self.windows.len()),
            "Pruned rate limit windows"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            max_requests,
            window_secs: 60,
        })
    }

    #[test]
    fn test_blocks_after_threshold() {
        let limiter = limiter(3);
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.2"));
    }

    #[test]
    fn test_window_resets() {
        let limiter = limiter(1);
        let start = Instant::now();
        assert!(limiter.check_at("ip", start));
        assert!(!limiter.check_at("ip", start + Duration::from_secs(30)));
        assert!(limiter.check_at("ip", start + Duration::from_secs(61)));
    }

    #[test]
    fn test_prune_keeps_live_windows() {
        let limiter = limiter(5);
        let start = Instant::now();
        limiter.check_at("a", start);
        limiter.prune_at(start + Duration::from_secs(10));
        assert_eq!(limiter.windows.len(), 1);
    }

    #[test]
    fn test_expired_windows_are_dropped_while_checking() {
        let limiter = limiter(5);
        let start = Instant::now();
        for i in 0..PRUNE_EVERY - 1 {
            assert!(limiter.check_at(&format!("10.0.{}.{}", i / 256, i % 256), start));
        }
        assert_eq!(limiter.windows.len(), PRUNE_EVERY - 1);

        assert!(limiter.check_at("10.9.9.9", start + Duration::from_secs(61)));
        assert_eq!(limiter.windows.len(), 1);
        assert!(limiter.windows.contains_key("10.9.9.9"));
    }
}
