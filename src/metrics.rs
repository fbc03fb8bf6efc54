//! Metrics collection (spec §4.6): per-service latency/throughput/error
//! counters, rolled up into a run-level summary with percentiles.
//!
//! Grounded on the teacher's `monitor.rs::MetricsCollector`, which buffers
//! named `MetricValue`s per key and computes aggregates on read; the same
//! "append during the run, compute percentiles on demand" shape is used
//! here, scoped to one run's latency samples per service.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Per-service counters and raw latency samples for one run.
#[derive(Debug, Default)]
struct ServiceAccumulator {
    latencies_ms: Vec<f64>,
    completed: u64,
    failed: u64,
}

/// Collects per-service samples during a run and rolls them up on
/// `snapshot`. Safe to share across the engine's handlers via `&self`.
pub struct MetricsCollector {
    services: DashMap<String, Mutex<ServiceAccumulator>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self { services: DashMap::new() }
    }

    pub fn record_completion(&self, service: &str, latency_ms: f64) {
        let acc = self.services.entry(service.to_string()).or_insert_with(|| Mutex::new(ServiceAccumulator::default()));
        let mut acc = acc.lock();
        acc.latencies_ms.push(latency_ms);
        acc.completed += 1;
    }

    pub fn record_failure(&self, service: &str) {
        let acc = self.services.entry(service.to_string()).or_insert_with(|| Mutex::new(ServiceAccumulator::default()));
        acc.lock().failed += 1;
    }

    /// Roll up every service's accumulator into a `RunMetrics` snapshot.
    /// `run_duration_ms` is the simulated horizon the run covered, used to
    /// compute pooled throughput.
    pub fn snapshot(&self, run_duration_ms: u64) -> RunMetrics {
        let mut per_service = std::collections::HashMap::new();
        let mut pooled_latencies: Vec<f64> = Vec::new();
        let (mut total_completed, mut total_failed) = (0u64, 0u64);

        for entry in self.services.iter() {
            let acc = entry.value().lock();
            pooled_latencies.extend_from_slice(&acc.latencies_ms);
            total_completed += acc.completed;
            total_failed += acc.failed;
            per_service.insert(entry.key().clone(), ServiceMetrics::from_accumulator(&acc));
        }

        pooled_latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let total = total_completed + total_failed;
        let mean_latency_ms = if pooled_latencies.is_empty() {
            0.0
        } else {
            pooled_latencies.iter().sum::<f64>() / pooled_latencies.len() as f64
        };
        let throughput_rps = if run_duration_ms == 0 {
            0.0
        } else {
            total_completed as f64 / (run_duration_ms as f64 / 1000.0)
        };

        RunMetrics {
            per_service,
            total,
            failed: total_failed,
            successful: total_completed,
            mean_latency_ms,
            p50_latency_ms: percentile(&pooled_latencies, 0.50),
            p95_latency_ms: percentile(&pooled_latencies, 0.95),
            p99_latency_ms: percentile(&pooled_latencies, 0.99),
            throughput_rps,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregated metrics for one service over the run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceMetrics {
    pub completed: u64,
    pub failed: u64,
    pub mean_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub error_rate: f64,
    /// Average CPU/memory utilization and replica count at the moment the
    /// run ended, filled in by the engine from `ResourceManager` after
    /// `MetricsCollector::snapshot` — not tracked by the accumulator
    /// itself, which only ever sees request completions/failures.
    pub cpu_utilization: f64,
    pub memory_utilization: f64,
    pub replicas: usize,
}

impl ServiceMetrics {
    fn from_accumulator(acc: &ServiceAccumulator) -> Self {
        let total = acc.completed + acc.failed;
        let error_rate = if total == 0 { 0.0 } else { acc.failed as f64 / total as f64 };

        let mut sorted = acc.latencies_ms.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mean = if sorted.is_empty() { 0.0 } else { sorted.iter().sum::<f64>() / sorted.len() as f64 };

        Self {
            completed: acc.completed,
            failed: acc.failed,
            mean_latency_ms: mean,
            p50_latency_ms: percentile(&sorted, 0.50),
            p95_latency_ms: percentile(&sorted, 0.95),
            p99_latency_ms: percentile(&sorted, 0.99),
            error_rate,
            ..Default::default()
        }
    }
}

/// Nearest-rank percentile over an already-sorted sample set.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p * sorted.len() as f64).ceil() as usize).saturating_sub(1);
    sorted[rank.min(sorted.len() - 1)]
}

/// Run-level metrics: per-service rolled-up `ServiceMetrics`, plus the
/// pooled totals computed over every request in the run (spec §3's
/// `RunMetrics` data-model row), not derived as "worst across services."
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunMetrics {
    pub per_service: std::collections::HashMap<String, ServiceMetrics>,
    /// Total requests (completed + failed) across every service.
    pub total: u64,
    pub failed: u64,
    pub successful: u64,
    pub mean_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    /// Completed requests per second over the whole run.
    pub throughput_rps: f64,
}

impl RunMetrics {
    pub fn overall_error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }

    pub fn overall_throughput(&self, run_duration_ms: u64) -> f64 {
        let _ = run_duration_ms;
        self.throughput_rps
    }

    /// Average CPU/memory utilization across every service, and the total
    /// replica count — the three terms `CostObjective` combines (§4.6).
    pub fn avg_cpu_utilization(&self) -> f64 {
        if self.per_service.is_empty() {
            return 0.0;
        }
        self.per_service.values().map(|m| m.cpu_utilization).sum::<f64>() / self.per_service.len() as f64
    }

    pub fn avg_memory_utilization(&self) -> f64 {
        if self.per_service.is_empty() {
            return 0.0;
        }
        self.per_service.values().map(|m| m.memory_utilization).sum::<f64>() / self.per_service.len() as f64
    }

    pub fn total_replicas(&self) -> usize {
        self.per_service.values().map(|m| m.replicas).sum()
    }
}
