//! Retry backoff scheduling (spec §4.3).
//!
//! Grounded on the teacher's `recovery.rs::RetryPolicy`
//! (`initial_delay`/`backoff_multiplier`/`max_delay`), narrowed to the
//! three named backoff kinds the scenario format exposes.

use crate::policy::Policy;
use crate::scenario::{BackoffKind, RetryConfig};

/// Backoff never waits longer than this, regardless of kind or attempt.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Per-request retry counter, advanced one attempt at a time.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    pub attempts: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self { attempts: 0 }
    }

    /// True if another retry is allowed under `cfg`.
    pub fn can_retry(&self, cfg: &RetryConfig) -> bool {
        cfg.enabled() && self.attempts < cfg.max_retries
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }
}

/// Backoff delay, in ms, for the given attempt number (0-indexed) under
/// `cfg`. Exponential doubles per attempt, linear grows by `base_ms` per
/// attempt, constant never changes. Always capped at `MAX_BACKOFF_MS`.
pub fn next_backoff_ms(cfg: &RetryConfig, attempt: u32) -> u64 {
    let raw = match cfg.backoff {
        BackoffKind::Exponential => cfg.base_ms.saturating_mul(1u64 << attempt.min(32)),
        BackoffKind::Linear => cfg.base_ms.saturating_mul(attempt as u64 + 1),
        BackoffKind::Constant => cfg.base_ms,
    };
    raw.min(MAX_BACKOFF_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(backoff: BackoffKind) -> RetryConfig {
        RetryConfig { enabled: true, max_retries: 3, backoff, base_ms: 100 }
    }

    #[test]
    fn exponential_backoff_doubles() {
        let c = cfg(BackoffKind::Exponential);
        assert_eq!(next_backoff_ms(&c, 0), 100);
        assert_eq!(next_backoff_ms(&c, 1), 200);
        assert_eq!(next_backoff_ms(&c, 2), 400);
    }

    #[test]
    fn linear_backoff_grows_additively() {
        let c = cfg(BackoffKind::Linear);
        assert_eq!(next_backoff_ms(&c, 0), 100);
        assert_eq!(next_backoff_ms(&c, 1), 200);
        assert_eq!(next_backoff_ms(&c, 2), 300);
    }

    #[test]
    fn constant_backoff_never_changes() {
        let c = cfg(BackoffKind::Constant);
        assert_eq!(next_backoff_ms(&c, 0), 100);
        assert_eq!(next_backoff_ms(&c, 5), 100);
    }

    #[test]
    fn retry_exhausts_after_max_retries() {
        let c = cfg(BackoffKind::Constant);
        let mut state = RetryState::new();
        for _ in 0..3 {
            assert!(state.can_retry(&c));
            state.record_attempt();
        }
        assert!(!state.can_retry(&c));
    }

    #[test]
    fn disabled_retry_never_allows_retry() {
        let mut c = cfg(BackoffKind::Constant);
        c.enabled = false;
        assert!(!RetryState::new().can_retry(&c));
    }

    #[test]
    fn exponential_backoff_is_capped_at_max_backoff_ms() {
        let c = cfg(BackoffKind::Exponential);
        assert_eq!(next_backoff_ms(&c, 30), MAX_BACKOFF_MS);
    }
}
