use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    window_start: Instant,
}

/// Sliding-window request counter keyed by client identifier.
///
/// The ledger is process-wide and shared by concurrent requests, so every
/// read-increment-write happens under one mutex; a burst can never slip past
/// the limit between a read and a write. The map is bounded: expired buckets
/// are evicted on demand and, at capacity, the oldest bucket is dropped to
/// make room rather than growing without bound.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    window: Duration,
    max_requests: u32,
    max_tracked: usize,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration, max_requests: u32, max_tracked: usize) -> Self {
        Self {
            window,
            max_requests,
            max_tracked: max_tracked.max(1),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.window, config.max_requests, config.max_tracked_clients)
    }

    /// Record one request for `key` and report whether it is allowed.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    /// Same as `check` with an explicit clock, so window rollover is
    /// testable without sleeping.
    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(bucket) = buckets.get_mut(key) {
            if now.duration_since(bucket.window_start) <= self.window {
                if bucket.count >= self.max_requests {
                    return false;
                }
                bucket.count += 1;
                return true;
            }
            // Window elapsed: restart the count for this key.
            bucket.count = 1;
            bucket.window_start = now;
            return true;
        }

        if buckets.len() >= self.max_tracked {
            self.evict(&mut buckets, now);
        }

        buckets.insert(
            key.to_string(),
            Bucket {
                count: 1,
                window_start: now,
            },
        );
        true
    }

    fn evict(&self, buckets: &mut HashMap<String, Bucket>, now: Instant) {
        buckets.retain(|_, bucket| now.duration_since(bucket.window_start) <= self.window);

        // Still full: sacrifice the stalest bucket. Its client gets a fresh
        // window, which errs on the side of letting a request through.
        if buckets.len() >= self.max_tracked {
            if let Some(oldest) = buckets
                .iter()
                .min_by_key(|(_, bucket)| bucket.window_start)
                .map(|(key, _)| key.clone())
            {
                buckets.remove(&oldest);
            }
        }
    }
}
