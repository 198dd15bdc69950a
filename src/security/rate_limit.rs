//! Per-peer login attempt limiting.
//!
//! Each peer IP gets a token bucket. An attempt spends one token; tokens
//! refill at `attempts_per_second` up to `burst_size`. Limits can be swapped
//! at runtime and take effect on the next check.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

/// Buckets idle for this long are dropped during pruning.
const IDLE_BUCKET_TTL: Duration = Duration::from_secs(300);

/// Pruning runs once the map grows past this many peers.
const PRUNE_THRESHOLD: usize = 10_000;

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub struct RateLimiter {
    config: ArcSwap<RateLimitConfig>,
    buckets: Mutex<HashMap<IpAddr, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `ip` may make another login attempt now.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let config = self.config.load();
        if !config.enabled {
            return true;
        }

        let burst = config.burst_size as f64;
        let rate = config.attempts_per_second as f64;

        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        if buckets.len() > PRUNE_THRESHOLD {
            buckets.retain(|_, bucket| now.duration_since(bucket.last_update) < IDLE_BUCKET_TTL);
        }

        buckets
            .entry(ip)
            .or_insert_with(|| TokenBucket::new(burst, now))
            .try_acquire(burst, rate, now)
    }

    /// Replace the limits. Existing buckets keep their tokens, clamped to the new burst.
    pub fn update(&self, config: RateLimitConfig) {
        if !config.enabled {
            self.buckets
                .lock()
                .expect("rate limiter mutex poisoned")
                .clear();
        }
        self.config.store(Arc::new(config));
    }

    pub fn tracked_peers(&self) -> usize {
        self.buckets
            .lock()
            .expect("rate limiter mutex poisoned")
            .len()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &**self.config.load())
            .field("tracked_peers", &self.tracked_peers())
            .finish()
    }
}
