//! Hysteresis-based autoscaling (spec §4.3).
//!
//! Grounded on the teacher's `recovery.rs::RecoveryManager` for the
//! per-key map shape, generalized from "recover a failed call" to "adjust a
//! service's replica count in response to observed utilization."

use crate::policy::Policy;
use crate::scenario::AutoscalingConfig;
use dashmap::DashMap;

/// One service's current replica count and the last decision's cooldown.
#[derive(Debug, Clone)]
struct ScalingState {
    replicas: usize,
    cooldown_until: crate::SimTime,
}

/// Tracks replica counts per service and decides when to scale.
///
/// Scaling decisions use hysteresis: scale up once utilization exceeds
/// `target_cpu` by a margin, scale down once it falls well under, and a
/// cooldown window after any change prevents oscillation.
pub struct AutoscalingController {
    cooldown_ms: crate::SimTime,
    state: DashMap<String, ScalingState>,
}

/// Direction an autoscaling decision moved the replica count, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    ScaleUp(usize),
    ScaleDown(usize),
    NoChange,
}

const SCALE_UP_MARGIN: f64 = 0.0;
/// Scale down once utilization falls under 80% of the target.
const SCALE_DOWN_FACTOR: f64 = 0.8;
const DEFAULT_TARGET_CPU: f64 = 0.7;

impl AutoscalingController {
    pub fn new(cooldown_ms: crate::SimTime) -> Self {
        Self {
            cooldown_ms,
            state: DashMap::new(),
        }
    }

    fn entry(&self, service: &str, initial_replicas: usize) -> dashmap::mapref::one::RefMut<'_, String, ScalingState> {
        self.state.entry(service.to_string()).or_insert_with(|| ScalingState {
            replicas: initial_replicas,
            cooldown_until: 0,
        })
    }

    /// Evaluate utilization against `cfg` and return the new replica
    /// count decision, if the cooldown has elapsed.
    pub fn evaluate(
        &self,
        service: &str,
        cfg: &AutoscalingConfig,
        current_replicas: usize,
        utilization: f64,
        sim_t: crate::SimTime,
    ) -> ScalingDecision {
        if !cfg.enabled() {
            return ScalingDecision::NoChange;
        }

        let target_cpu = if cfg.target_cpu <= 0.0 { DEFAULT_TARGET_CPU } else { cfg.target_cpu };

        let mut entry = self.entry(service, current_replicas);
        entry.replicas = current_replicas;

        if sim_t < entry.cooldown_until {
            return ScalingDecision::NoChange;
        }

        if utilization > target_cpu + SCALE_UP_MARGIN && entry.replicas < cfg.max_replicas {
            let new_count = (entry.replicas + cfg.scale_step as usize).min(cfg.max_replicas);
            entry.replicas = new_count;
            entry.cooldown_until = sim_t + self.cooldown_ms;
            return ScalingDecision::ScaleUp(new_count);
        }

        if utilization < target_cpu * SCALE_DOWN_FACTOR && entry.replicas > cfg.min_replicas {
            let new_count = entry.replicas.saturating_sub(cfg.scale_step as usize).max(cfg.min_replicas);
            entry.replicas = new_count;
            entry.cooldown_until = sim_t + self.cooldown_ms;
            return ScalingDecision::ScaleDown(new_count);
        }

        ScalingDecision::NoChange
    }
}
