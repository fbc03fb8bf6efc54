//! Token-bucket rate limiting (spec §4.3), keyed per `service:endpoint`.
//!
//! Grounded on the teacher's `recovery.rs::ErrorRecovery` per-key map
//! shape; the bucket algorithm itself has no teacher analogue so it
//! follows the textbook token-bucket formulation, refilling lazily on
//! each `try_acquire` call rather than on a background tick.

use crate::policy::Policy;
use crate::scenario::RateLimitConfig;
use dashmap::DashMap;
use parking_lot::Mutex;

struct Bucket {
    capacity: f64,
    tokens: f64,
    rate_per_second: f64,
    last_refill_ms: crate::SimTime,
}

impl Bucket {
    fn refill(&mut self, sim_t: crate::SimTime) {
        if sim_t <= self.last_refill_ms {
            return;
        }
        let elapsed_s = (sim_t - self.last_refill_ms) as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed_s * self.rate_per_second).min(self.capacity);
        self.last_refill_ms = sim_t;
    }

    fn try_take(&mut self, sim_t: crate::SimTime) -> bool {
        self.refill(sim_t);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// One bucket per `service:endpoint` key, capacity equal to one second's
/// worth of tokens at the configured rate.
pub struct TokenBucketLimiter {
    buckets: DashMap<String, Mutex<Bucket>>,
}

impl TokenBucketLimiter {
    pub fn new() -> Self {
        Self { buckets: DashMap::new() }
    }

    /// Disabled limiters are a no-op: every acquisition succeeds.
    pub fn try_acquire(&self, key: &str, cfg: &RateLimitConfig, sim_t: crate::SimTime) -> bool {
        if !cfg.enabled() {
            return true;
        }
        let bucket = self.bucket(key, cfg, sim_t);
        bucket.lock().try_take(sim_t)
    }

    /// Tokens currently available for `key`, after a lazy refill. `-1.0`
    /// when the policy is disabled (unlimited quota, nothing to report).
    pub fn remaining(&self, key: &str, cfg: &RateLimitConfig, sim_t: crate::SimTime) -> f64 {
        if !cfg.enabled() {
            return -1.0;
        }
        let bucket = self.bucket(key, cfg, sim_t);
        let mut b = bucket.lock();
        b.refill(sim_t);
        b.tokens
    }

    fn bucket(
        &self,
        key: &str,
        cfg: &RateLimitConfig,
        sim_t: crate::SimTime,
    ) -> dashmap::mapref::one::RefMut<'_, String, Mutex<Bucket>> {
        self.buckets.entry(key.to_string()).or_insert_with(|| {
            Mutex::new(Bucket {
                capacity: cfg.rate_per_second.max(1.0),
                tokens: cfg.rate_per_second.max(1.0),
                rate_per_second: cfg.rate_per_second,
                last_refill_ms: sim_t,
            })
        })
    }
}

impl Default for TokenBucketLimiter {
    fn default() -> Self {
        Self::new()
    }
}
