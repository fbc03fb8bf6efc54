//! Discrete-event engine (spec §4.5): consumes the event queue in
//! `(fire_time, sequence)` order, dispatching default handlers for
//! arrivals, completions, and failures, and driving the resource model,
//! policies, and metrics collector as it goes.
//!
//! Grounded on the teacher's `mcts.rs`, whose simulation loop advances a
//! phase at a time and folds results back into shared state each
//! iteration, and `workflow.rs`'s `WorkflowEvent` enum for the
//! event-payload shape. `EventPayload` must derive `Hash`/`Eq` (the event
//! queue keys on it transitively through `priority_queue`), so every
//! sampled floating-point quantity — service time, in particular — is
//! rounded to whole milliseconds before it is attached to a payload or a
//! `Request`, rather than carried as a raw `f64` inside the enum.

use crate::event_queue::EventQueue;
use crate::policy::{AutoscalingController, CircuitBreaker, RetryState, TokenBucketLimiter};
use crate::resource::ResourceManager;
use crate::rng::SimRng;
use crate::scenario::{EndpointDef, Scenario, ServiceTimeDistribution};
use crate::{MetricsCollector, SimError, SimTime};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    RequestArrival,
    RequestComplete,
    RequestFailure,
    RetryAttempt,
    AutoscaleTick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    CapacityExceeded,
    CircuitOpen,
    RateLimited,
}

/// Scheduled event payload. Hashable/Eq by construction — see the module
/// doc comment for why floats never appear here directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventPayload {
    Empty,
    RequestArrival { request_id: String, service: String, endpoint: String, trace_id: String },
    RequestComplete { request_id: String },
    RequestFailure { request_id: String, reason: FailureReason },
    RetryAttempt { request_id: String },
    AutoscaleTick { service: String },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Empty => EventType::RequestArrival,
            EventPayload::RequestArrival { .. } => EventType::RequestArrival,
            EventPayload::RequestComplete { .. } => EventType::RequestComplete,
            EventPayload::RequestFailure { .. } => EventType::RequestFailure,
            EventPayload::RetryAttempt { .. } => EventType::RetryAttempt,
            EventPayload::AutoscaleTick { .. } => EventType::AutoscaleTick,
        }
    }
}

/// A dispatched event, as handed to tracing/log output — the engine's
/// internal queue entry (`event_queue::QueuedEvent`) also carries the
/// tie-breaking sequence number, which callers outside the engine never
/// need to see.
#[derive(Debug, Clone)]
pub struct Event {
    pub fire_time: SimTime,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    InService,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Request {
    // Cloned out of `self.requests` in handler bodies that need to read a
    // request's fields while also taking `&mut self` elsewhere in the same
    // call (e.g. `handle_failure` scheduling a retry).
    pub id: String,
    pub trace_id: String,
    pub service: String,
    pub endpoint: String,
    pub instance_id: Option<String>,
    pub arrival_time: SimTime,
    pub completion_time: Option<SimTime>,
    pub status: RequestStatus,
    pub attempt: u32,
}

/// One run's discrete-event simulation state. Owns its own resource
/// manager and policy state, so parallel runs (driven by the orchestrator)
/// never share mutable state with each other.
pub struct DiscreteEventEngine {
    scenario: Scenario,
    queue: EventQueue,
    resources: ResourceManager,
    rng: Box<dyn SimRng>,
    metrics: MetricsCollector,
    autoscaling: AutoscalingController,
    circuit_breaker: CircuitBreaker,
    rate_limiter: TokenBucketLimiter,
    retries: HashMap<String, RetryState>,
    requests: HashMap<String, Request>,
    now: SimTime,
    horizon_ms: SimTime,
    next_request_seq: u64,
}

const AUTOSCALE_INTERVAL_MS: SimTime = 1000;
const DOWNSTREAM_FANOUT_DELAY_MS: SimTime = 0;

impl DiscreteEventEngine {
    pub fn new(scenario: Scenario, rng: Box<dyn SimRng>, horizon_ms: SimTime) -> Result<Self, SimError> {
        scenario.validate()?;
        let resources = ResourceManager::new(&scenario);

        Ok(Self {
            scenario,
            queue: EventQueue::new(),
            resources,
            rng,
            metrics: MetricsCollector::new(),
            autoscaling: AutoscalingController::new(AUTOSCALE_INTERVAL_MS),
            circuit_breaker: CircuitBreaker::new(),
            rate_limiter: TokenBucketLimiter::new(),
            retries: HashMap::new(),
            requests: HashMap::new(),
            now: 0,
            horizon_ms,
            next_request_seq: 0,
        })
    }

    fn next_request_id(&mut self) -> String {
        let id = format!("req-{}", self.next_request_seq);
        self.next_request_seq += 1;
        id
    }

    /// Schedules every workload's arrivals up front (spec §4.4) and the
    /// first autoscaling tick for each service with autoscaling enabled.
    pub fn schedule_workloads(&mut self) -> Result<(), SimError> {
        let workloads = self.scenario.workload.clone();
        for w in &workloads {
            let (service, endpoint) = split_target(&w.target)?;
            let arrivals = crate::workload::generate_arrivals(w, self.rng.as_mut())?;
            for fire_time in arrivals {
                let request_id = self.next_request_id();
                self.queue.schedule(
                    fire_time,
                    EventPayload::RequestArrival {
                        request_id,
                        service: service.clone(),
                        endpoint: endpoint.clone(),
                        trace_id: uuid::Uuid::new_v4().to_string(),
                    },
                );
            }
        }

        for svc in &self.scenario.services {
            if svc.autoscaling.as_ref().map(|a| a.enabled).unwrap_or(false) {
                self.queue.schedule(
                    AUTOSCALE_INTERVAL_MS,
                    EventPayload::AutoscaleTick { service: svc.name.clone() },
                );
            }
        }

        Ok(())
    }

    /// Runs the event loop to completion (queue empty) or until
    /// `horizon_ms` is reached, then returns the metrics snapshot.
    pub fn run(&mut self) -> Result<crate::RunMetrics, SimError> {
        while let Some(event) = self.queue.pop() {
            if event.fire_time > self.horizon_ms {
                break;
            }
            self.now = event.fire_time;
            self.dispatch(event.payload)?;
        }
        let mut metrics = self.metrics.snapshot(self.horizon_ms);
        for (service, m) in metrics.per_service.iter_mut() {
            m.cpu_utilization = self.resources.service_cpu_utilization(service, self.now);
            m.memory_utilization = self.resources.service_memory_utilization(service);
            m.replicas = self.resources.replica_count(service);
        }
        Ok(metrics)
    }

    fn dispatch(&mut self, payload: EventPayload) -> Result<(), SimError> {
        trace!(now = self.now, event = ?payload, "dispatching event");
        match payload {
            EventPayload::Empty => Ok(()),
            EventPayload::RequestArrival { request_id, service, endpoint, trace_id } => {
                self.handle_arrival(request_id, service, endpoint, trace_id)
            }
            EventPayload::RequestComplete { request_id } => self.handle_completion(request_id),
            EventPayload::RequestFailure { request_id, reason } => self.handle_failure(request_id, reason),
            EventPayload::RetryAttempt { request_id } => self.handle_retry(request_id),
            EventPayload::AutoscaleTick { service } => self.handle_autoscale_tick(service),
        }
    }

    fn handle_arrival(&mut self, request_id: String, service: String, endpoint: String, trace_id: String) -> Result<(), SimError> {
        let key = format!("{service}:{endpoint}");

        if let Some(policies) = self.scenario.policies.clone() {
            if let Some(rl) = &policies.rate_limit {
                if !self.rate_limiter.try_acquire(&key, rl, self.now) {
                    return self.fail_request(request_id, service, endpoint, trace_id, FailureReason::RateLimited);
                }
            }
            if let Some(cb) = &policies.circuit_breaker {
                if !self.circuit_breaker.allow(&key, cb, self.now) {
                    return self.fail_request(request_id, service, endpoint, trace_id, FailureReason::CircuitOpen);
                }
            }
        }

        let Some(endpoint_def) = self.find_endpoint(&service, &endpoint).cloned() else {
            return Err(SimError::InvalidInput(format!("unknown endpoint {key}")));
        };

        let Some(instance_id) = self.resources.select_instance(&service) else {
            return self.fail_request(request_id, service, endpoint, trace_id, FailureReason::CapacityExceeded);
        };

        let host_id = self.resources.instance_host_id(&instance_id);
        if let Some(host_id) = &host_id {
            if !self.resources.host_has_capacity(host_id, self.now) {
                return self.fail_request(request_id, service, endpoint, trace_id, FailureReason::CapacityExceeded);
            }
        }

        self.requests.insert(
            request_id.clone(),
            Request {
                id: request_id.clone(),
                trace_id,
                service: service.clone(),
                endpoint: endpoint.clone(),
                instance_id: Some(instance_id.clone()),
                arrival_time: self.now,
                completion_time: None,
                status: RequestStatus::InService,
                attempt: 0,
            },
        );

        let service_time_ms = sample_service_time(&endpoint_def, self.rng.as_mut()).round().max(1.0);
        self.resources.allocate_cpu(&instance_id, service_time_ms, self.now)?;

        let completion_time = self.now + service_time_ms as SimTime;
        self.queue.schedule(completion_time, EventPayload::RequestComplete { request_id });

        Ok(())
    }

    fn fail_request(
        &mut self,
        request_id: String,
        service: String,
        endpoint: String,
        trace_id: String,
        reason: FailureReason,
    ) -> Result<(), SimError> {
        self.requests.insert(
            request_id.clone(),
            Request {
                id: request_id.clone(),
                trace_id,
                service,
                endpoint,
                instance_id: None,
                arrival_time: self.now,
                completion_time: None,
                status: RequestStatus::Pending,
                attempt: 0,
            },
        );
        self.queue.schedule(self.now, EventPayload::RequestFailure { request_id, reason });
        Ok(())
    }

    fn handle_completion(&mut self, request_id: String) -> Result<(), SimError> {
        let Some(mut req) = self.requests.remove(&request_id) else {
            warn!(request_id, "completion for unknown request");
            return Ok(());
        };

        if let Some(instance_id) = &req.instance_id {
            self.resources.release_cpu(instance_id)?;
        }

        req.status = RequestStatus::Completed;
        req.completion_time = Some(self.now);
        let latency_ms = (self.now - req.arrival_time) as f64;
        self.metrics.record_completion(&req.service, latency_ms);

        let key = format!("{}:{}", req.service, req.endpoint);
        if let Some(policies) = self.scenario.policies.clone() {
            if let Some(cb) = &policies.circuit_breaker {
                self.circuit_breaker.record_success(&key, cb);
            }
        }

        if let Some(endpoint_def) = self.find_endpoint(&req.service, &req.endpoint).cloned() {
            for downstream in &endpoint_def.downstream {
                let (d_service, d_endpoint) = split_target(downstream)?;
                let child_id = self.next_request_id();
                self.queue.schedule(
                    self.now + DOWNSTREAM_FANOUT_DELAY_MS,
                    EventPayload::RequestArrival {
                        request_id: child_id,
                        service: d_service,
                        endpoint: d_endpoint,
                        trace_id: req.trace_id.clone(),
                    },
                );
            }
        }

        debug!(request_id = %req.id, service = %req.service, latency_ms, "request completed");
        Ok(())
    }

    fn handle_failure(&mut self, request_id: String, reason: FailureReason) -> Result<(), SimError> {
        let Some(req) = self.requests.get(&request_id).cloned() else {
            return Ok(());
        };

        let key = format!("{}:{}", req.service, req.endpoint);
        if let Some(policies) = self.scenario.policies.clone() {
            if let Some(cb) = &policies.circuit_breaker {
                self.circuit_breaker.record_failure(&key, cb, self.now);
            }
        }

        let retry_cfg = self.find_service(&req.service).and_then(|s| s.retry.clone());
        if let Some(cfg) = retry_cfg {
            let state = self.retries.entry(request_id.clone()).or_default();
            if state.can_retry(&cfg) {
                let attempt = state.attempts;
                state.record_attempt();
                let delay = crate::policy::next_backoff_ms(&cfg, attempt);
                self.queue.schedule(self.now + delay as SimTime, EventPayload::RetryAttempt { request_id: request_id.clone() });
                return Ok(());
            }
            self.retries.remove(&request_id);
        }

        self.requests.remove(&request_id);
        self.metrics.record_failure(&req.service);
        debug!(request_id, service = %req.service, ?reason, "request failed");
        Ok(())
    }

    fn handle_retry(&mut self, request_id: String) -> Result<(), SimError> {
        let Some(req) = self.requests.remove(&request_id) else {
            return Ok(());
        };
        self.handle_arrival(request_id, req.service, req.endpoint, req.trace_id)
    }

    fn handle_autoscale_tick(&mut self, service: String) -> Result<(), SimError> {
        if let Some(cfg) = self.find_service(&service).and_then(|s| s.autoscaling.clone()) {
            let current = self.resources.replica_count(&service);
            let host_utils: Vec<f64> = self
                .scenario
                .hosts
                .iter()
                .filter_map(|h| self.resources.host_cpu_utilization(&h.id, self.now))
                .collect();
            let avg_util = if host_utils.is_empty() { 0.0 } else { host_utils.iter().sum::<f64>() / host_utils.len() as f64 };

            let svc = self.find_service(&service).cloned();
            if let Some(svc) = svc {
                match self.autoscaling.evaluate(&service, &cfg, current, avg_util, self.now) {
                    crate::policy::autoscaling::ScalingDecision::ScaleUp(_) => {
                        self.resources.add_instance(&service, svc.effective_cpu_cores(), svc.effective_memory_mb());
                    }
                    crate::policy::autoscaling::ScalingDecision::ScaleDown(_) => {
                        self.resources.remove_instance(&service);
                    }
                    crate::policy::autoscaling::ScalingDecision::NoChange => {}
                }
            }

            if self.now + AUTOSCALE_INTERVAL_MS <= self.horizon_ms {
                self.queue.schedule(self.now + AUTOSCALE_INTERVAL_MS, EventPayload::AutoscaleTick { service });
            }
        }
        Ok(())
    }

    fn find_service(&self, name: &str) -> Option<&crate::scenario::ServiceDef> {
        self.scenario.find_service(name)
    }

    fn find_endpoint(&self, service: &str, endpoint: &str) -> Option<&EndpointDef> {
        self.find_service(service)?.endpoints.iter().find(|e| e.path == endpoint)
    }

}

fn split_target(target: &str) -> Result<(String, String), SimError> {
    target
        .split_once(':')
        .map(|(s, e)| (s.to_string(), e.to_string()))
        .ok_or_else(|| SimError::InvalidInput(format!("malformed target: {target}")))
}

fn sample_service_time(endpoint: &EndpointDef, rng: &mut dyn SimRng) -> f64 {
    match &endpoint.service_time {
        ServiceTimeDistribution::Constant { ms } => *ms,
        ServiceTimeDistribution::Normal { mean_ms, std_dev_ms } => rng.normal(*mean_ms, *std_dev_ms).max(0.0),
        ServiceTimeDistribution::Exponential { mean_ms } => {
            let rate = if *mean_ms > 0.0 { 1.0 / mean_ms } else { 1.0 };
            rng.exponential(rate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::CircuitState;
    use crate::rng::StdSimRng;
    use crate::scenario::{ArrivalPattern, Host, ServiceDef, WorkloadSpec};

    fn scenario() -> Scenario {
        Scenario {
            hosts: vec![Host { id: "h1".into(), cpu_cores: 8.0, memory_capacity_mb: 8192.0 }],
            services: vec![ServiceDef {
                name: "svc".into(),
                replicas: 2,
                cpu_cores: 1.0,
                memory_mb: 256.0,
                endpoints: vec![EndpointDef {
                    path: "/x".into(),
                    service_time: ServiceTimeDistribution::Constant { ms: 5.0 },
                    downstream: vec![],
                }],
                autoscaling: None,
                retry: None,
                min_replicas: 1,
                max_replicas: 4,
            }],
            workload: vec![WorkloadSpec {
                target: "svc:/x".into(),
                pattern: ArrivalPattern::Constant { rate_rps: 20.0 },
                start_ms: 0,
                end_ms: 500,
            }],
            policies: None,
        }
    }

    #[test]
    fn run_completes_arrivals_and_reports_metrics() {
        let mut engine = DiscreteEventEngine::new(scenario(), Box::new(StdSimRng::new(11)), 2000).unwrap();
        engine.schedule_workloads().unwrap();
        let metrics = engine.run().unwrap();
        let svc = metrics.per_service.get("svc").expect("svc metrics present");
        assert!(svc.completed > 0);
        assert_eq!(svc.failed, 0);
    }

    #[test]
    fn downstream_fanout_generates_child_requests() {
        let mut s = scenario();
        s.services[0].endpoints.push(EndpointDef {
            path: "/y".into(),
            service_time: ServiceTimeDistribution::Constant { ms: 5.0 },
            downstream: vec![],
        });
        s.services[0].endpoints[0].downstream.push("svc:/y".into());
        let mut engine = DiscreteEventEngine::new(s, Box::new(StdSimRng::new(5)), 2000).unwrap();
        engine.schedule_workloads().unwrap();
        let metrics = engine.run().unwrap();
        let svc = metrics.per_service.get("svc").expect("svc metrics present");
        assert!(svc.completed > 0);
    }

    #[test]
    fn rate_limited_failures_still_trip_the_circuit_breaker() {
        use crate::scenario::{CircuitBreakerConfig, PolicyConfig, RateLimitConfig};

        let mut s = scenario();
        s.workload[0].pattern = ArrivalPattern::Constant { rate_rps: 200.0 };
        s.policies = Some(PolicyConfig {
            rate_limit: Some(RateLimitConfig { enabled: true, rate_per_second: 1.0 }),
            circuit_breaker: Some(CircuitBreakerConfig {
                enabled: true,
                failure_threshold: 2,
                success_threshold: 1,
                timeout_ms: 1000,
            }),
        });

        let mut engine = DiscreteEventEngine::new(s, Box::new(StdSimRng::new(2)), 500).unwrap();
        engine.schedule_workloads().unwrap();
        engine.run().unwrap();

        let cb_cfg = CircuitBreakerConfig { enabled: true, failure_threshold: 2, success_threshold: 1, timeout_ms: 1000 };
        assert_eq!(engine.circuit_breaker.state("svc:/x", &cb_cfg, engine.now), CircuitState::Open);
    }

    #[test]
    fn zero_capacity_scenario_fails_requests_instead_of_hanging() {
        let mut s = scenario();
        s.services[0].replicas = 0;
        let mut engine = DiscreteEventEngine::new(s, Box::new(StdSimRng::new(1)), 500).unwrap();
        engine.schedule_workloads().unwrap();
        let metrics = engine.run().unwrap();
        let svc = metrics.per_service.get("svc");
        assert!(svc.map(|m| m.failed > 0 || m.completed == 0).unwrap_or(true));
    }
}
