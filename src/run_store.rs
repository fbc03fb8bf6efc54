//! Run persistence (spec §4.12): records one run per evaluated
//! configuration, its lifecycle status, and its final metrics once it
//! completes.
//!
//! Grounded on the teacher's `workflow.rs::WorkflowInstance`/
//! `WorkflowStatus` (id, status, created/started/completed timestamps);
//! `RunStatus`'s variants only carry a `reason`/`error` string where the
//! teacher's `WorkflowStatus` does, since a run's failure detail is a
//! plain message, not structured sub-state.

use crate::scenario::Scenario;
use crate::RunMetrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed { error: String },
    Cancelled { reason: String },
}

/// One run: the scenario it evaluated, its lifecycle status, and its
/// metrics once `Completed`.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: String,
    pub scenario: Scenario,
    pub status: RunStatus,
    pub metrics: Option<RunMetrics>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Persistence surface for runs. An `async_trait` the way the teacher's
/// execution engine talks to its own workflow store, so a future
/// database-backed implementation can replace `InMemoryRunStore` without
/// touching the orchestrator.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create(&self, run_id: String, scenario: Scenario) -> RunRecord;
    async fn mark_running(&self, run_id: &str);
    async fn complete(&self, run_id: &str, metrics: RunMetrics);
    async fn fail(&self, run_id: &str, error: String);
    async fn cancel(&self, run_id: &str, reason: String);
    async fn get(&self, run_id: &str) -> Option<RunRecord>;
    async fn list(&self) -> Vec<RunRecord>;
    /// Removes every `Completed`/`Failed`/`Cancelled` record, returning
    /// how many were removed (spec §4.12: `CleanupCompletedRuns`).
    async fn cleanup_completed(&self) -> usize;
}

/// In-process run store backed by `dashmap`, matching the teacher's
/// preference for lock-free concurrent maps over a mutex-guarded
/// `HashMap` on the hot path of "many runs updating their own status
/// concurrently."
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: DashMap<String, RunRecord>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self { runs: DashMap::new() }
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create(&self, run_id: String, scenario: Scenario) -> RunRecord {
        let record = RunRecord {
            id: run_id.clone(),
            scenario,
            status: RunStatus::Pending,
            metrics: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.runs.insert(run_id, record.clone());
        record
    }

    async fn mark_running(&self, run_id: &str) {
        if let Some(mut r) = self.runs.get_mut(run_id) {
            r.status = RunStatus::Running;
            r.started_at = Some(Utc::now());
        }
    }

    async fn complete(&self, run_id: &str, metrics: RunMetrics) {
        if let Some(mut r) = self.runs.get_mut(run_id) {
            r.status = RunStatus::Completed;
            r.metrics = Some(metrics);
            r.completed_at = Some(Utc::now());
        }
    }

    async fn fail(&self, run_id: &str, error: String) {
        if let Some(mut r) = self.runs.get_mut(run_id) {
            r.status = RunStatus::Failed { error };
            r.completed_at = Some(Utc::now());
        }
    }

    async fn cancel(&self, run_id: &str, reason: String) {
        if let Some(mut r) = self.runs.get_mut(run_id) {
            r.status = RunStatus::Cancelled { reason };
            r.completed_at = Some(Utc::now());
        }
    }

    async fn get(&self, run_id: &str) -> Option<RunRecord> {
        self.runs.get(run_id).map(|r| r.clone())
    }

    async fn list(&self) -> Vec<RunRecord> {
        self.runs.iter().map(|r| r.value().clone()).collect()
    }

    async fn cleanup_completed(&self) -> usize {
        let done: Vec<String> = self
            .runs
            .iter()
            .filter(|r| !matches!(r.status, RunStatus::Pending | RunStatus::Running))
            .map(|r| r.key().clone())
            .collect();
        for id in &done {
            self.runs.remove(id);
        }
        done.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{Host, Scenario};

    fn scenario() -> Scenario {
        Scenario { hosts: vec![Host { id: "h1".into(), cpu_cores: 1.0, memory_capacity_mb: 0.0 }], services: vec![], workload: vec![], policies: None }
    }

    #[tokio::test]
    async fn lifecycle_transitions_are_recorded() {
        let store = InMemoryRunStore::new();
        store.create("run-1".into(), scenario()).await;
        store.mark_running("run-1").await;
        assert_eq!(store.get("run-1").await.unwrap().status, RunStatus::Running);

        store.complete("run-1", RunMetrics::default()).await;
        let record = store.get("run-1").await.unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert!(record.metrics.is_some());
    }

    #[tokio::test]
    async fn cleanup_removes_only_terminal_runs() {
        let store = InMemoryRunStore::new();
        store.create("pending".into(), scenario()).await;
        store.create("done".into(), scenario()).await;
        store.complete("done", RunMetrics::default()).await;

        let removed = store.cleanup_completed().await;
        assert_eq!(removed, 1);
        assert!(store.get("pending").await.is_some());
        assert!(store.get("done").await.is_none());
    }

    #[tokio::test]
    async fn unknown_run_id_is_a_no_op_not_a_panic() {
        let store = InMemoryRunStore::new();
        store.mark_running("ghost").await;
        store.complete("ghost", RunMetrics::default()).await;
        assert!(store.get("ghost").await.is_none());
    }
}
