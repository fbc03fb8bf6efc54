//! Optimization objectives (spec §4.8): a scalar, lower-is-better score
//! computed from a run's `RunMetrics`.
//!
//! Grounded on the teacher's `optimizer.rs::OptimizationStrategy`, a
//! tagged enum naming named strategies; generalized here into an
//! `Objective` trait with one implementation per named objective plus a
//! factory, since unlike the teacher's enum each objective needs its own
//! normalization rather than sharing one code path.

use crate::metrics::RunMetrics;
use crate::SimError;

/// Penalty score returned when the underlying metric is missing or zero
/// (§4.6), rather than erroring or rewarding an empty run as if it were
/// excellent.
const MISSING_METRIC_PENALTY: f64 = 1e9;

/// A scoring function over a run's metrics. Every implementation is
/// normalized so that a smaller score is always better — the optimizer
/// and selection strategies never need to know an objective's natural
/// direction.
pub trait Objective: Send + Sync {
    fn name(&self) -> &'static str;
    fn score(&self, metrics: &RunMetrics, run_duration_ms: u64) -> f64;

    /// `true` means lower scores are better. Every provided objective
    /// already normalizes its own score to be lower-is-better (§4.6), so
    /// this is always `true`; kept as part of the contract so a caller
    /// never has to special-case direction by objective name.
    fn direction(&self) -> bool {
        true
    }
}

macro_rules! latency_objective {
    ($name:ident, $field:ident, $label:expr) => {
        pub struct $name;
        impl Objective for $name {
            fn name(&self) -> &'static str {
                $label
            }
            fn score(&self, metrics: &RunMetrics, _run_duration_ms: u64) -> f64 {
                if metrics.total == 0 {
                    return MISSING_METRIC_PENALTY;
                }
                let value = metrics.$field;
                if value <= 0.0 {
                    MISSING_METRIC_PENALTY
                } else {
                    value
                }
            }
        }
    };
}

latency_objective!(P95LatencyObjective, p95_latency_ms, "p95_latency");
latency_objective!(P99LatencyObjective, p99_latency_ms, "p99_latency");
latency_objective!(MeanLatencyObjective, mean_latency_ms, "mean_latency");

/// Negated throughput, so that "maximize throughput" reads as "minimize
/// the objective" like every other score.
pub struct ThroughputObjective;
impl Objective for ThroughputObjective {
    fn name(&self) -> &'static str {
        "throughput"
    }
    fn score(&self, metrics: &RunMetrics, run_duration_ms: u64) -> f64 {
        let throughput = metrics.overall_throughput(run_duration_ms);
        if throughput <= 0.0 {
            MISSING_METRIC_PENALTY
        } else {
            -throughput
        }
    }
}

pub struct ErrorRateObjective;
impl Objective for ErrorRateObjective {
    fn name(&self) -> &'static str {
        "error_rate"
    }
    fn score(&self, metrics: &RunMetrics, _run_duration_ms: u64) -> f64 {
        metrics.overall_error_rate()
    }
}

/// `cost = 0.4*avg_cpu + 0.3*avg_mem + 0.3*total_replicas`, aggregated
/// over every service (§4.6) — the only objective that reads resource
/// utilization rather than request latencies/throughput.
pub struct CostObjective;
impl Objective for CostObjective {
    fn name(&self) -> &'static str {
        "cost"
    }
    fn score(&self, metrics: &RunMetrics, _run_duration_ms: u64) -> f64 {
        0.4 * metrics.avg_cpu_utilization() + 0.3 * metrics.avg_memory_utilization() + 0.3 * metrics.total_replicas() as f64
    }
}

/// Builds an `Objective` by name, the way a config-driven optimizer run
/// picks its scoring function (spec §4.8: named objectives).
pub struct ObjectiveFactory;

impl ObjectiveFactory {
    pub fn build(name: &str) -> Result<Box<dyn Objective>, SimError> {
        match name {
            "p95_latency" => Ok(Box::new(P95LatencyObjective)),
            "p99_latency" => Ok(Box::new(P99LatencyObjective)),
            "mean_latency" => Ok(Box::new(MeanLatencyObjective)),
            "throughput" => Ok(Box::new(ThroughputObjective)),
            "error_rate" => Ok(Box::new(ErrorRateObjective)),
            "cost" => Ok(Box::new(CostObjective)),
            other => Err(SimError::UnknownObjective(other.to_string())),
        }
    }
}
