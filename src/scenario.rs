//! Scenario data model (spec §3): hosts, services, workload, policies.
//!
//! Every field here is plain owned data (`String`, `Vec`, `f64`, no
//! `Arc`/`Rc`), so `#[derive(Clone)]` already gives the "explicit clone
//! operation that walks hosts/services/endpoints/downstream/policies/
//! workload" spec.md §9 calls for — there is nothing shared across
//! iterations to accidentally alias. Grounded on the teacher's
//! `mcts.rs::AgentState`/`ResourceState` (flat, serializable state
//! structs) and `workflow.rs::WorkflowGraph` (nested named collections).

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A full scenario: the topology, its workload, and optional policies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub hosts: Vec<Host>,
    pub services: Vec<ServiceDef>,
    pub workload: Vec<WorkloadSpec>,
    #[serde(default)]
    pub policies: Option<PolicyConfig>,
}

impl Scenario {
    /// Structural checks the core itself relies on (distinct from the
    /// full external YAML validation named out-of-scope in spec.md §1):
    /// every service references real hosts implicitly by being placed at
    /// init (§4.2), every workload target resolves to a real
    /// `service:/endpoint`, and every downstream target does too.
    pub fn validate(&self) -> Result<(), crate::SimError> {
        if self.hosts.is_empty() {
            return Err(crate::SimError::InvalidInput("scenario has no hosts".into()));
        }
        if self.services.is_empty() {
            return Err(crate::SimError::InvalidInput("scenario has no services".into()));
        }

        let known_targets: std::collections::HashSet<String> = self
            .services
            .iter()
            .flat_map(|s| s.endpoints.iter().map(move |e| format!("{}:{}", s.name, e.path)))
            .collect();

        for w in &self.workload {
            if !known_targets.contains(&w.target) {
                return Err(crate::SimError::InvalidInput(format!(
                    "workload target does not exist: {}",
                    w.target
                )));
            }
        }

        for s in &self.services {
            for e in &s.endpoints {
                for d in &e.downstream {
                    if !known_targets.contains(d) {
                        return Err(crate::SimError::InvalidInput(format!(
                            "downstream target does not resolve: {d}"
                        )));
                    }
                }
            }
        }

        if self.has_downstream_cycle() {
            return Err(crate::SimError::InvalidInput(
                "downstream call graph contains a cycle".into(),
            ));
        }

        Ok(())
    }

    /// Builds the `service:endpoint` call graph from every endpoint's
    /// `downstream` list and checks it for cycles. A cyclic graph would
    /// make the engine's downstream fan-out (§4.9, fired unconditionally
    /// at the parent's own `fire_time`) recurse forever within a single
    /// instant of simulated time.
    fn has_downstream_cycle(&self) -> bool {
        let mut graph = DiGraph::<(), ()>::new();
        let mut nodes = HashMap::new();

        for s in &self.services {
            for e in &s.endpoints {
                let target = format!("{}:{}", s.name, e.path);
                nodes.entry(target).or_insert_with(|| graph.add_node(()));
            }
        }

        for s in &self.services {
            for e in &s.endpoints {
                let from = nodes[&format!("{}:{}", s.name, e.path)];
                for d in &e.downstream {
                    if let Some(&to) = nodes.get(d) {
                        graph.add_edge(from, to, ());
                    }
                }
            }
        }

        is_cyclic_directed(&graph)
    }

    pub fn find_service(&self, name: &str) -> Option<&ServiceDef> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn find_service_mut(&mut self, name: &str) -> Option<&mut ServiceDef> {
        self.services.iter_mut().find(|s| s.name == name)
    }
}

/// A host that service instances are placed on (spec §3 Data Model).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Host {
    pub id: String,
    pub cpu_cores: f64,
    /// Memory capacity in MB. 0 means unlimited (§4.2).
    pub memory_capacity_mb: f64,
}

/// A service deployed across some number of replicas, each with its own
/// resource allocation and endpoint set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceDef {
    pub name: String,
    pub replicas: usize,
    pub cpu_cores: f64,
    pub memory_mb: f64,
    pub endpoints: Vec<EndpointDef>,
    #[serde(default)]
    pub autoscaling: Option<AutoscalingConfig>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub min_replicas: usize,
    #[serde(default)]
    pub max_replicas: usize,
}

impl ServiceDef {
    /// Resolved CPU/memory allocation per §4.2: cpu_cores=0 or
    /// memory_mb=0 fall back to the defaults (1.0 cores / 512 MB).
    pub fn effective_cpu_cores(&self) -> f64 {
        if self.cpu_cores <= 0.0 {
            1.0
        } else {
            self.cpu_cores
        }
    }

    pub fn effective_memory_mb(&self) -> f64 {
        if self.memory_mb <= 0.0 {
            512.0
        } else {
            self.memory_mb
        }
    }
}

/// One endpoint on a service: how long it takes to serve, and what it
/// calls downstream (SPEC_FULL.md §3: downstream fan-out).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointDef {
    pub path: String,
    pub service_time: ServiceTimeDistribution,
    #[serde(default)]
    pub downstream: Vec<String>,
}

/// Per-request service time distribution, sampled in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ServiceTimeDistribution {
    Constant { ms: f64 },
    Normal { mean_ms: f64, std_dev_ms: f64 },
    Exponential { mean_ms: f64 },
}

/// Autoscaling policy parameters (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoscalingConfig {
    pub enabled: bool,
    pub target_cpu: f64,
    pub scale_step: u32,
    pub min_replicas: usize,
    pub max_replicas: usize,
}

/// Retry policy parameters (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_retries: u32,
    pub backoff: BackoffKind,
    pub base_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackoffKind {
    Exponential,
    Linear,
    Constant,
}

impl Default for BackoffKind {
    fn default() -> Self {
        BackoffKind::Exponential
    }
}

/// One workload generator invocation: an arrival process targeting one
/// `service:endpoint`, over `[start_ms, end_ms)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadSpec {
    /// `"service:/path"` — the service and endpoint this workload targets.
    pub target: String,
    pub pattern: ArrivalPattern,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Arrival process shapes (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ArrivalPattern {
    Poisson { rate_rps: f64 },
    Uniform { rate_rps: f64 },
    Normal { rate_rps: f64, stddev_rps: f64 },
    Constant { rate_rps: f64 },
    Bursty {
        burst_rate_rps: f64,
        burst_s: f64,
        quiet_s: f64,
    },
}

/// Scenario-level default policy parameters (rate limiting and circuit
/// breaking are keyed per `service:endpoint` in `src/policy`, but a
/// scenario expresses one set of thresholds that apply to every key).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PolicyConfig {
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    #[serde(default = "default_policy_enabled")]
    pub enabled: bool,
    pub rate_per_second: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_policy_enabled")]
    pub enabled: bool,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_ms: u64,
}

fn default_policy_enabled() -> bool {
    true
}

/// Placement result: one instance per replica, round-robin across hosts in
/// host iteration order (§4.2). Lives alongside `Scenario` since it is a
/// pure function of the scenario's hosts/services, not runtime state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceInstance {
    pub id: String,
    pub service_name: String,
    pub host_id: String,
    pub allocated_cores: f64,
    pub allocated_memory_mb: f64,
}

pub fn plan_placement(scenario: &Scenario) -> Vec<ServiceInstance> {
    let mut instances = Vec::new();
    if scenario.hosts.is_empty() {
        return instances;
    }

    let mut host_idx = 0usize;
    for service in &scenario.services {
        for replica in 0..service.replicas {
            let host = &scenario.hosts[host_idx % scenario.hosts.len()];
            instances.push(ServiceInstance {
                id: format!("{}-{}", service.name, replica),
                service_name: service.name.clone(),
                host_id: host.id.clone(),
                allocated_cores: service.effective_cpu_cores(),
                allocated_memory_mb: service.effective_memory_mb(),
            });
            host_idx += 1;
        }
    }

    instances
}

/// Marshals a `Scenario` to and from an opaque text blob, so the run
/// store can hold scenarios without depending on any one wire format
/// (spec §6: "marshal a scenario to a text blob ... and parse the blob
/// back"). External YAML authoring is out of scope; this is the core's
/// own round-trip, not an operator-facing format.
pub trait ScenarioCodec: Send + Sync {
    fn encode(&self, scenario: &Scenario) -> Result<String, crate::SimError>;
    fn decode(&self, blob: &str) -> Result<Scenario, crate::SimError>;
}

/// `serde_json`-backed codec. Chosen over a YAML crate since JSON is
/// already an ambient dependency for every other typed payload this
/// crate handles.
pub struct JsonScenarioCodec;

impl ScenarioCodec for JsonScenarioCodec {
    fn encode(&self, scenario: &Scenario) -> Result<String, crate::SimError> {
        serde_json::to_string(scenario).map_err(|e| crate::SimError::InvalidInput(e.to_string()))
    }

    fn decode(&self, blob: &str) -> Result<Scenario, crate::SimError> {
        serde_json::from_str(blob).map_err(|e| crate::SimError::InvalidInput(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_scenario() -> Scenario {
        Scenario {
            hosts: vec![
                Host { id: "h1".into(), cpu_cores: 4.0, memory_capacity_mb: 8192.0 },
                Host { id: "h2".into(), cpu_cores: 4.0, memory_capacity_mb: 8192.0 },
            ],
            services: vec![ServiceDef {
                name: "checkout".into(),
                replicas: 3,
                cpu_cores: 1.0,
                memory_mb: 512.0,
                endpoints: vec![EndpointDef {
                    path: "/pay".into(),
                    service_time: ServiceTimeDistribution::Constant { ms: 10.0 },
                    downstream: vec![],
                }],
                autoscaling: None,
                retry: None,
                min_replicas: 1,
                max_replicas: 5,
            }],
            workload: vec![WorkloadSpec {
                target: "checkout:/pay".into(),
                pattern: ArrivalPattern::Constant { rate_rps: 10.0 },
                start_ms: 0,
                end_ms: 1000,
            }],
            policies: None,
        }
    }

    #[test]
    fn clone_then_mutate_does_not_affect_original() {
        let original = sample_scenario();
        let mut clone = original.clone();
        clone.services[0].replicas = 99;
        clone.hosts.push(Host { id: "h3".into(), cpu_cores: 1.0, memory_capacity_mb: 0.0 });

        assert_eq!(original.services[0].replicas, 3);
        assert_eq!(original.hosts.len(), 2);
    }

    #[test]
    fn validate_accepts_well_formed_scenario() {
        assert!(sample_scenario().validate().is_ok());
    }

    #[test]
    fn validate_rejects_unknown_workload_target() {
        let mut s = sample_scenario();
        s.workload[0].target = "checkout:/missing".into();
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_unresolved_downstream() {
        let mut s = sample_scenario();
        s.services[0].endpoints[0].downstream.push("ghost:/nope".into());
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_a_downstream_cycle() {
        let mut s = sample_scenario();
        s.services[0].endpoints[0].downstream.push("checkout:/pay".into());
        assert!(s.validate().is_err());
    }

    #[test]
    fn placement_round_robins_across_hosts() {
        let s = sample_scenario();
        let instances = plan_placement(&s);
        assert_eq!(instances.len(), 3);
        assert_eq!(instances[0].host_id, "h1");
        assert_eq!(instances[1].host_id, "h2");
        assert_eq!(instances[2].host_id, "h1");
    }

    #[test]
    fn zero_cpu_or_memory_falls_back_to_defaults() {
        let mut s = sample_scenario();
        s.services[0].cpu_cores = 0.0;
        s.services[0].memory_mb = 0.0;
        let instances = plan_placement(&s);
        assert_eq!(instances[0].allocated_cores, 1.0);
        assert_eq!(instances[0].allocated_memory_mb, 512.0);
    }

    #[test]
    fn json_codec_round_trips_a_scenario() {
        let s = sample_scenario();
        let codec = JsonScenarioCodec;
        let blob = codec.encode(&s).unwrap();
        let decoded = codec.decode(&blob).unwrap();
        assert_eq!(s, decoded);
    }

    #[test]
    fn json_codec_rejects_malformed_blobs() {
        assert!(JsonScenarioCodec.decode("not json").is_err());
    }
}
