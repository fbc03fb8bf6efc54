//! Circuit breaker state machine (spec §4.3): closed, open, half-open.
//!
//! Grounded on the teacher's `recovery.rs::CircuitBreaker`, with
//! `Instant`/`Duration` replaced by the engine's own `SimTime` so the
//! open-to-half-open transition is driven by simulated time, not wall
//! clock, and stays reproducible under a fixed seed.

use crate::policy::Policy;
use crate::scenario::CircuitBreakerConfig;
use dashmap::DashMap;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerEntry {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: crate::SimTime,
}

/// Per-`service:endpoint` circuit breaker bank.
pub struct CircuitBreaker {
    breakers: DashMap<String, Mutex<BreakerEntry>>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self { breakers: DashMap::new() }
    }

    fn entry(&self, key: &str) -> dashmap::mapref::one::RefMut<'_, String, Mutex<BreakerEntry>> {
        self.breakers.entry(key.to_string()).or_insert_with(|| {
            Mutex::new(BreakerEntry {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: 0,
            })
        })
    }

    /// Lazily moves an open breaker to half-open once `timeout_ms` has
    /// elapsed since it opened. Shared by `allow()` and `state()` so a bare
    /// state check observes the transition without needing `allow()` to
    /// have run first as a side effect.
    fn lazy_transition(e: &mut BreakerEntry, cfg: &CircuitBreakerConfig, sim_t: crate::SimTime) {
        if e.state == CircuitState::Open && sim_t >= e.opened_at + cfg.timeout_ms {
            e.state = CircuitState::HalfOpen;
            e.success_count = 0;
        }
    }

    /// Whether a call to `key` is allowed right now. Open breakers
    /// transition to half-open once `timeout_ms` has elapsed since they
    /// opened, admitting exactly the probing call that triggers it. A
    /// disabled policy is a no-op: every call is allowed.
    pub fn allow(&self, key: &str, cfg: &CircuitBreakerConfig, sim_t: crate::SimTime) -> bool {
        if !cfg.enabled() {
            return true;
        }
        let entry = self.entry(key);
        let mut e = entry.lock();
        Self::lazy_transition(&mut e, cfg, sim_t);
        !matches!(e.state, CircuitState::Open)
    }

    pub fn record_success(&self, key: &str, cfg: &CircuitBreakerConfig) {
        if !cfg.enabled() {
            return;
        }
        let entry = self.entry(key);
        let mut e = entry.lock();
        match e.state {
            CircuitState::Closed => {
                e.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                e.success_count += 1;
                if e.success_count >= cfg.success_threshold {
                    e.state = CircuitState::Closed;
                    e.failure_count = 0;
                    e.success_count = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, key: &str, cfg: &CircuitBreakerConfig, sim_t: crate::SimTime) {
        if !cfg.enabled() {
            return;
        }
        let entry = self.entry(key);
        let mut e = entry.lock();
        match e.state {
            CircuitState::Closed => {
                e.failure_count += 1;
                if e.failure_count >= cfg.failure_threshold {
                    e.state = CircuitState::Open;
                    e.opened_at = sim_t;
                }
            }
            CircuitState::HalfOpen => {
                e.state = CircuitState::Open;
                e.opened_at = sim_t;
                e.success_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Current state of `key`, performing the same lazy open→half-open
    /// transition check `allow()` does. Disabled policies report `Closed`.
    pub fn state(&self, key: &str, cfg: &CircuitBreakerConfig, sim_t: crate::SimTime) -> CircuitState {
        if !cfg.enabled() {
            return CircuitState::Closed;
        }
        let entry = self.entry(key);
        let mut e = entry.lock();
        Self::lazy_transition(&mut e, cfg, sim_t);
        e.state
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CircuitBreakerConfig {
        CircuitBreakerConfig { enabled: true, failure_threshold: 3, success_threshold: 2, timeout_ms: 1000 }
    }

    #[test]
    fn opens_after_failure_threshold() {
        let cb = CircuitBreaker::new();
        let c = cfg();
        for _ in 0..3 {
            cb.record_failure("svc:/x", &c, 0);
        }
        assert_eq!(cb.state("svc:/x", &c, 0), CircuitState::Open);
        assert!(!cb.allow("svc:/x", &c, 500));
    }

    #[test]
    fn a_bare_state_check_performs_the_lazy_transition_itself() {
        let cb = CircuitBreaker::new();
        let c = cfg();
        for _ in 0..3 {
            cb.record_failure("svc:/x", &c, 0);
        }
        // No call to `allow()` here: `state()` must perform its own
        // open-to-half-open transition once the timeout has elapsed.
        assert_eq!(cb.state("svc:/x", &c, 1000), CircuitState::HalfOpen);
    }

    #[test]
    fn transitions_to_half_open_after_timeout_then_closes() {
        let cb = CircuitBreaker::new();
        let c = cfg();
        for _ in 0..3 {
            cb.record_failure("svc:/x", &c, 0);
        }
        assert!(cb.allow("svc:/x", &c, 1000));
        assert_eq!(cb.state("svc:/x", &c, 1000), CircuitState::HalfOpen);

        cb.record_success("svc:/x", &c);
        assert_eq!(cb.state("svc:/x", &c, 1000), CircuitState::HalfOpen);
        cb.record_success("svc:/x", &c);
        assert_eq!(cb.state("svc:/x", &c, 1000), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_circuit() {
        let cb = CircuitBreaker::new();
        let c = cfg();
        for _ in 0..3 {
            cb.record_failure("svc:/x", &c, 0);
        }
        cb.allow("svc:/x", &c, 1000);
        cb.record_failure("svc:/x", &c, 1000);
        assert_eq!(cb.state("svc:/x", &c, 1000), CircuitState::Open);
    }

    #[test]
    fn closed_breaker_resets_failure_count_on_success() {
        let cb = CircuitBreaker::new();
        let c = cfg();
        cb.record_failure("svc:/x", &c, 0);
        cb.record_failure("svc:/x", &c, 0);
        cb.record_success("svc:/x", &c);
        cb.record_failure("svc:/x", &c, 0);
        assert_eq!(cb.state("svc:/x", &c, 0), CircuitState::Closed);
    }

    #[test]
    fn disabled_breaker_always_allows_and_reports_closed() {
        let cb = CircuitBreaker::new();
        let mut c = cfg();
        c.enabled = false;
        for _ in 0..10 {
            cb.record_failure("svc:/x", &c, 0);
        }
        assert!(cb.allow("svc:/x", &c, 0));
        assert_eq!(cb.state("svc:/x", &c, 0), CircuitState::Closed);
    }
}
