//! Run and metrics comparison (spec §8 concrete scenarios): summarizes a
//! sequence of runs scored under one objective, and diffs two metric
//! snapshots term by term.
//!
//! Grounded on `optimizer.rs`'s `OptimizationStep` history — this reads
//! the same kind of score sequence the optimizer already accumulates,
//! just off to the side as a read-only reporting helper rather than
//! driving the hill-climb itself.

use crate::metrics::RunMetrics;
use crate::objectives::Objective;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Degrading,
    Flat,
}

#[derive(Debug, Clone, Copy)]
pub struct RunHistoryComparison {
    pub best_index: usize,
    pub worst_index: usize,
    pub trend: Trend,
    pub average_score: f64,
}

/// Scores every run in `history` under `objective` and summarizes the
/// sequence: which run is best/worst, whether the score trend from first
/// to last run is improving, degrading, or flat, and the mean score.
pub fn compare_run_history(objective: &dyn Objective, history: &[RunMetrics], run_duration_ms: u64) -> Option<RunHistoryComparison> {
    if history.is_empty() {
        return None;
    }

    let scores: Vec<f64> = history.iter().map(|m| objective.score(m, run_duration_ms)).collect();

    let (best_index, _) = scores
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .expect("history is non-empty");
    let (worst_index, _) = scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .expect("history is non-empty");

    let average_score = scores.iter().sum::<f64>() / scores.len() as f64;

    let trend = if scores.len() < 2 {
        Trend::Flat
    } else {
        let first = scores[0];
        let last = *scores.last().expect("history is non-empty");
        if last < first {
            Trend::Improving
        } else if last > first {
            Trend::Degrading
        } else {
            Trend::Flat
        }
    };

    Some(RunHistoryComparison { best_index, worst_index, trend, average_score })
}

/// Term-by-term diff between two metric snapshots, plus whether `after`
/// is an improvement under `objective`.
#[derive(Debug, Clone, Copy)]
pub struct MetricsComparison {
    pub improvement: bool,
    pub p95_diff: f64,
    pub throughput_diff: f64,
    pub error_rate_diff: f64,
    pub cpu_utilization_diff: f64,
    pub replica_diff: i64,
}

pub fn compare_metrics(objective: &dyn Objective, before: &RunMetrics, after: &RunMetrics, run_duration_ms: u64) -> MetricsComparison {
    let before_score = objective.score(before, run_duration_ms);
    let after_score = objective.score(after, run_duration_ms);

    MetricsComparison {
        improvement: after_score < before_score,
        p95_diff: after.p95_latency_ms - before.p95_latency_ms,
        throughput_diff: after.overall_throughput(run_duration_ms) - before.overall_throughput(run_duration_ms),
        error_rate_diff: after.overall_error_rate() - before.overall_error_rate(),
        cpu_utilization_diff: after.avg_cpu_utilization() - before.avg_cpu_utilization(),
        replica_diff: after.total_replicas() as i64 - before.total_replicas() as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ServiceMetrics;
    use crate::objectives::{P95LatencyObjective, ThroughputObjective};
    use std::collections::HashMap;

    fn p95_run(p95: f64) -> RunMetrics {
        let mut per_service = HashMap::new();
        per_service.insert("svc".to_string(), ServiceMetrics { completed: 100, p95_latency_ms: p95, ..Default::default() });
        RunMetrics { per_service, total: 100, successful: 100, p95_latency_ms: p95, ..Default::default() }
    }

    fn throughput_run(rps: f64) -> RunMetrics {
        let mut per_service = HashMap::new();
        per_service.insert("svc".to_string(), ServiceMetrics { completed: rps as u64, ..Default::default() });
        RunMetrics { per_service, total: rps as u64, successful: rps as u64, throughput_rps: rps, ..Default::default() }
    }

    #[test]
    fn p95_minimization_three_runs() {
        let history = vec![p95_run(100.0), p95_run(80.0), p95_run(60.0)];
        let cmp = compare_run_history(&P95LatencyObjective, &history, 1000).unwrap();
        assert_eq!(cmp.best_index, 2);
        assert_eq!(cmp.worst_index, 0);
        assert_eq!(cmp.trend, Trend::Improving);
        assert!((cmp.average_score - 80.0).abs() < 1e-9);
    }

    #[test]
    fn throughput_maximization_three_runs() {
        let history = vec![throughput_run(10.0), throughput_run(15.0), throughput_run(20.0)];
        let cmp = compare_run_history(&ThroughputObjective, &history, 1000).unwrap();
        assert_eq!(cmp.best_index, 2);
        assert_eq!(cmp.trend, Trend::Improving);
    }

    #[test]
    fn metrics_comparison_diffs_every_term() {
        // total=100 requests both runs; before has 5 failures, after 2 —
        // matching the error-rate-diff of -0.03 from the concrete scenario.
        let mut before_services = HashMap::new();
        before_services.insert(
            "svc".to_string(),
            ServiceMetrics { completed: 95, failed: 5, p95_latency_ms: 50.0, cpu_utilization: 0.5, replicas: 2, ..Default::default() },
        );
        let before = RunMetrics {
            per_service: before_services,
            total: 100,
            failed: 5,
            successful: 95,
            p95_latency_ms: 50.0,
            throughput_rps: 95.0,
            ..Default::default()
        };

        let mut after_services = HashMap::new();
        after_services.insert(
            "svc".to_string(),
            ServiceMetrics { completed: 98, failed: 2, p95_latency_ms: 40.0, cpu_utilization: 0.4, replicas: 3, ..Default::default() },
        );
        let after = RunMetrics {
            per_service: after_services,
            total: 100,
            failed: 2,
            successful: 98,
            p95_latency_ms: 40.0,
            throughput_rps: 98.0,
            ..Default::default()
        };

        let cmp = compare_metrics(&P95LatencyObjective, &before, &after, 1000);
        assert!(cmp.improvement);
        assert!((cmp.p95_diff - (-10.0)).abs() < 1e-9);
        assert!(cmp.throughput_diff > 0.0);
        assert!((cmp.error_rate_diff - (-0.03)).abs() < 1e-9);
        assert!((cmp.cpu_utilization_diff - (-0.1)).abs() < 1e-9);
        assert_eq!(cmp.replica_diff, 1);
    }
}
