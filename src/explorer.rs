//! Parameter space exploration (spec §4.9): generates neighboring
//! scenarios for the hill-climbing optimizer to evaluate, one dimension
//! (replica count, CPU, memory, workload rate, autoscaling target,
//! retry backoff) mutated at a time.
//!
//! Grounded on the teacher's `mcts.rs::generate_possible_actions` /
//! `apply_action` pair: enumerate legal moves from a state, then apply
//! each candidate independently off a clone of that state. Each
//! `Scenario` clone here is fully owned (spec.md §9's deep-clone
//! resolution), so mutating a neighbor never touches the scenario it was
//! derived from.

use crate::scenario::Scenario;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorerVariant {
    Conservative,
    Default,
    Aggressive,
}

impl ExplorerVariant {
    fn replica_step(&self) -> usize {
        match self {
            ExplorerVariant::Conservative => 1,
            ExplorerVariant::Default => 1,
            ExplorerVariant::Aggressive => 2,
        }
    }

    /// `(resource_step, policy_step, workload_step)` — §4.9's three named
    /// step fractions for CPU/memory, autoscaling/retry, and workload
    /// rate mutations respectively.
    fn steps(&self) -> (f64, f64, f64) {
        match self {
            ExplorerVariant::Conservative => (0.02, 0.05, 0.05),
            ExplorerVariant::Default => (0.1, 0.1, 0.1),
            ExplorerVariant::Aggressive => (0.1, 0.2, 0.2),
        }
    }
}

/// Generates single-dimension mutations of a `Scenario`.
pub struct ParameterExplorer {
    variant: ExplorerVariant,
}

impl ParameterExplorer {
    pub fn new(variant: ExplorerVariant) -> Self {
        Self { variant }
    }

    /// Every neighbor scenario reachable by mutating exactly one
    /// parameter of exactly one service (or one matching workload) by
    /// one step in one direction.
    pub fn neighbors(&self, scenario: &Scenario) -> Vec<Scenario> {
        let mut out = Vec::new();
        let replica_step = self.variant.replica_step();
        let (resource_step, policy_step, workload_step) = self.variant.steps();

        for idx in 0..scenario.services.len() {
            let svc = &scenario.services[idx];
            let max_replicas = if svc.max_replicas > 0 { svc.max_replicas } else { svc.replicas + replica_step };
            let min_replicas = svc.min_replicas.max(1);

            if svc.replicas + replica_step <= max_replicas {
                out.push(with_service_mut(scenario, idx, |s| s.replicas += replica_step));
            }
            if svc.replicas > min_replicas {
                out.push(with_service_mut(scenario, idx, |s| {
                    s.replicas = s.replicas.saturating_sub(replica_step).max(min_replicas)
                }));
            }

            let cpu_delta = (svc.effective_cpu_cores() * resource_step).max(0.1);
            out.push(with_service_mut(scenario, idx, |s| s.cpu_cores = s.effective_cpu_cores() + cpu_delta));
            out.push(with_service_mut(scenario, idx, |s| {
                s.cpu_cores = (s.effective_cpu_cores() - cpu_delta).max(0.1)
            }));

            let mem_delta = (svc.effective_memory_mb() * resource_step).max(1.0);
            out.push(with_service_mut(scenario, idx, |s| s.memory_mb = s.effective_memory_mb() + mem_delta));
            out.push(with_service_mut(scenario, idx, |s| {
                s.memory_mb = (s.effective_memory_mb() - mem_delta).max(64.0)
            }));

            if let Some(autoscaling) = svc.autoscaling.clone() {
                let step = (autoscaling.target_cpu * policy_step).max(0.01);
                out.push(with_service_mut(scenario, idx, |s| {
                    if let Some(a) = s.autoscaling.as_mut() {
                        a.target_cpu = (a.target_cpu + step).min(0.9);
                    }
                }));
                out.push(with_service_mut(scenario, idx, |s| {
                    if let Some(a) = s.autoscaling.as_mut() {
                        a.target_cpu = (a.target_cpu - step).max(0.1);
                    }
                }));

                let scale_step = 1i64;
                out.push(with_service_mut(scenario, idx, |s| {
                    if let Some(a) = s.autoscaling.as_mut() {
                        a.scale_step = ((a.scale_step as i64 + scale_step).clamp(1, 5)) as u32;
                    }
                }));
                out.push(with_service_mut(scenario, idx, |s| {
                    if let Some(a) = s.autoscaling.as_mut() {
                        a.scale_step = ((a.scale_step as i64 - scale_step).clamp(1, 5)) as u32;
                    }
                }));
            }

            if let Some(retry) = svc.retry.clone() {
                out.push(with_service_mut(scenario, idx, |s| {
                    if let Some(r) = s.retry.as_mut() {
                        r.max_retries = (r.max_retries + 1).min(10);
                    }
                }));
                out.push(with_service_mut(scenario, idx, |s| {
                    if let Some(r) = s.retry.as_mut() {
                        r.max_retries = r.max_retries.saturating_sub(1);
                    }
                }));

                let step = (retry.base_ms as f64 * policy_step).max(1.0) as u64;
                out.push(with_service_mut(scenario, idx, |s| {
                    if let Some(r) = s.retry.as_mut() {
                        r.base_ms = (r.base_ms + step).min(1000);
                    }
                }));
                out.push(with_service_mut(scenario, idx, |s| {
                    if let Some(r) = s.retry.as_mut() {
                        r.base_ms = r.base_ms.saturating_sub(step).max(1);
                    }
                }));
            }
        }

        for idx in 0..scenario.workload.len() {
            let w = &scenario.workload[idx];
            let rate = current_rate(w);
            let delta = (rate * workload_step).max(0.1);
            out.push(with_workload_mut(scenario, idx, |w| set_rate(w, rate + delta)));
            out.push(with_workload_mut(scenario, idx, |w| set_rate(w, (rate - delta).max(0.1))));

            if let crate::scenario::ArrivalPattern::Normal { stddev_rps, .. } = &w.pattern {
                let stddev = *stddev_rps;
                let sd_delta = (stddev * workload_step).max(0.1);
                out.push(with_workload_mut(scenario, idx, |w| {
                    if let crate::scenario::ArrivalPattern::Normal { stddev_rps, .. } = &mut w.pattern {
                        *stddev_rps = stddev + sd_delta;
                    }
                }));
                out.push(with_workload_mut(scenario, idx, |w| {
                    if let crate::scenario::ArrivalPattern::Normal { stddev_rps, .. } = &mut w.pattern {
                        *stddev_rps = (stddev - sd_delta).max(0.1);
                    }
                }));
            }

            if let crate::scenario::ArrivalPattern::Bursty { burst_s, quiet_s, .. } = &w.pattern {
                let (burst_s, quiet_s) = (*burst_s, *quiet_s);
                let burst_delta = (burst_s * workload_step).max(0.1);
                out.push(with_workload_mut(scenario, idx, |w| {
                    if let crate::scenario::ArrivalPattern::Bursty { burst_s, .. } = &mut w.pattern {
                        *burst_s += burst_delta;
                    }
                }));
                let quiet_delta = (quiet_s * workload_step).max(0.1);
                out.push(with_workload_mut(scenario, idx, |w| {
                    if let crate::scenario::ArrivalPattern::Bursty { quiet_s, .. } = &mut w.pattern {
                        *quiet_s = (*quiet_s - quiet_delta).max(0.1);
                    }
                }));
            }
        }

        out
    }
}

fn with_service_mut(scenario: &Scenario, idx: usize, f: impl FnOnce(&mut crate::scenario::ServiceDef)) -> Scenario {
    let mut clone = scenario.clone();
    f(&mut clone.services[idx]);
    clone
}

fn with_workload_mut(scenario: &Scenario, idx: usize, f: impl FnOnce(&mut crate::scenario::WorkloadSpec)) -> Scenario {
    let mut clone = scenario.clone();
    f(&mut clone.workload[idx]);
    clone
}

fn current_rate(w: &crate::scenario::WorkloadSpec) -> f64 {
    use crate::scenario::ArrivalPattern::*;
    match &w.pattern {
        Poisson { rate_rps } | Uniform { rate_rps } | Constant { rate_rps } | Normal { rate_rps, .. } => *rate_rps,
        Bursty { burst_rate_rps, .. } => *burst_rate_rps,
    }
}

fn set_rate(w: &mut crate::scenario::WorkloadSpec, new_rate: f64) {
    use crate::scenario::ArrivalPattern::*;
    match &mut w.pattern {
        Poisson { rate_rps } | Uniform { rate_rps } | Constant { rate_rps } | Normal { rate_rps, .. } => {
            *rate_rps = new_rate
        }
        Bursty { burst_rate_rps, .. } => *burst_rate_rps = new_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{ArrivalPattern, EndpointDef, Host, ServiceDef, ServiceTimeDistribution, WorkloadSpec};

    fn scenario() -> Scenario {
        Scenario {
            hosts: vec![Host { id: "h1".into(), cpu_cores: 8.0, memory_capacity_mb: 8192.0 }],
            services: vec![ServiceDef {
                name: "svc".into(),
                replicas: 2,
                cpu_cores: 1.0,
                memory_mb: 512.0,
                endpoints: vec![EndpointDef {
                    path: "/x".into(),
                    service_time: ServiceTimeDistribution::Constant { ms: 5.0 },
                    downstream: vec![],
                }],
                autoscaling: None,
                retry: None,
                min_replicas: 1,
                max_replicas: 5,
            }],
            workload: vec![WorkloadSpec {
                target: "svc:/x".into(),
                pattern: ArrivalPattern::Constant { rate_rps: 10.0 },
                start_ms: 0,
                end_ms: 1000,
            }],
            policies: None,
        }
    }

    #[test]
    fn neighbors_each_differ_from_original_by_one_dimension() {
        let s = scenario();
        let explorer = ParameterExplorer::new(ExplorerVariant::Default);
        let neighbors = explorer.neighbors(&s);
        assert!(!neighbors.is_empty());
        for n in &neighbors {
            assert_ne!(n, &s);
        }
    }

    #[test]
    fn replica_neighbor_respects_max_replicas() {
        let mut s = scenario();
        s.services[0].replicas = 5;
        s.services[0].max_replicas = 5;
        let explorer = ParameterExplorer::new(ExplorerVariant::Default);
        let neighbors = explorer.neighbors(&s);
        assert!(neighbors.iter().all(|n| n.services[0].replicas <= 5));
    }

    #[test]
    fn aggressive_variant_takes_larger_replica_steps_than_conservative() {
        let s = scenario();
        let conservative = ParameterExplorer::new(ExplorerVariant::Conservative).neighbors(&s);
        let aggressive = ParameterExplorer::new(ExplorerVariant::Aggressive).neighbors(&s);

        let max_replica_delta = |neighbors: &[Scenario]| {
            neighbors
                .iter()
                .map(|n| (n.services[0].replicas as i64 - s.services[0].replicas as i64).unsigned_abs())
                .max()
                .unwrap_or(0)
        };

        assert!(max_replica_delta(&aggressive) >= max_replica_delta(&conservative));
    }

    #[test]
    fn workload_rate_neighbors_mutate_only_the_rate() {
        let s = scenario();
        let explorer = ParameterExplorer::new(ExplorerVariant::Default);
        let neighbors = explorer.neighbors(&s);
        let rate_changed: Vec<&Scenario> = neighbors
            .iter()
            .filter(|n| n.services == s.services && n.workload != s.workload)
            .collect();
        assert!(!rate_changed.is_empty());
    }
}
