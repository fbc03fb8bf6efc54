//! Orchestrator (spec §4.12): binds the optimizer's candidates to a
//! `RunStore` and `RunExecutor`, evaluating many configurations in bounded
//! parallel with per-run deadlines and cooperative cancellation.
//!
//! Grounded on the teacher's `workflow.rs::WorkflowOrchestrator` (which
//! holds an `Arc<RwLock<HashMap<Uuid, WorkflowInstance>>>` of active runs
//! alongside an execution engine) and `enhanced_orchestrator.rs`'s
//! config/result pairing. `tokio::spawn` + `AbortHandle` stand in for the
//! teacher's task registry; `futures::future::join_all` fans the pending
//! runs back in.

use crate::optimizer::HillClimbOptimizer;
use crate::run_store::RunStore;
use crate::scenario::Scenario;
use crate::{RunMetrics, SimTime};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::AbortHandle;
use tracing::{info, warn};

use crate::executor::RunExecutor;

/// Tunables for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub run_timeout_ms: u64,
    pub horizon_ms: SimTime,
    pub seed: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { run_timeout_ms: 30_000, horizon_ms: 60_000, seed: 0 }
    }
}

/// One configuration submitted for evaluation.
#[derive(Debug, Clone)]
pub struct ConfigurationCandidate {
    pub id: String,
    pub scenario: Scenario,
}

/// The outcome of evaluating one `ConfigurationCandidate`.
#[derive(Debug, Clone)]
pub struct CandidateResult {
    pub candidate_id: String,
    pub metrics: Option<RunMetrics>,
    pub error: Option<String>,
}

/// The outcome of a full `run_experiment` optimization drive (spec §6's
/// `RunExperiment(ctx, initial_scenario, duration_ms) -> ExperimentResult`):
/// the best configuration found, its score and run id, every run's
/// metrics in order, and why the run stopped.
#[derive(Debug, Clone)]
pub struct ExperimentResult {
    pub best_config: Scenario,
    pub best_score: f64,
    pub best_run_id: String,
    pub runs: Vec<RunMetrics>,
    pub converged: bool,
    pub reason: String,
    pub duration: Duration,
}

/// Binds a `RunStore` and `RunExecutor` together and drives candidate
/// evaluation. Generic over both so a database-backed store or a
/// remote-worker executor can be swapped in without touching this type.
pub struct Orchestrator<S: RunStore + 'static, E: RunExecutor + 'static> {
    store: Arc<S>,
    executor: Arc<E>,
    config: OrchestratorConfig,
    active_runs: DashMap<String, AbortHandle>,
}

impl<S: RunStore + 'static, E: RunExecutor + 'static> Orchestrator<S, E> {
    pub fn new(store: Arc<S>, executor: Arc<E>, config: OrchestratorConfig) -> Self {
        Self { store, executor, config, active_runs: DashMap::new() }
    }

    /// Evaluates every candidate concurrently, each under its own
    /// deadline (`run_timeout_ms`); actual concurrency is bounded by the
    /// executor's own admission control (spec §4.12). Results are
    /// returned in the same order as `candidates`.
    pub async fn evaluate_configurations_parallel(&self, candidates: Vec<ConfigurationCandidate>) -> Vec<CandidateResult> {
        let mut handles = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let store = self.store.clone();
            let executor = self.executor.clone();
            let horizon_ms = self.config.horizon_ms;
            let seed = self.config.seed;
            let timeout = Duration::from_millis(self.config.run_timeout_ms);
            let candidate_id = candidate.id.clone();

            let join_handle = tokio::spawn(async move {
                store.create(candidate.id.clone(), candidate.scenario.clone()).await;
                store.mark_running(&candidate.id).await;

                let outcome = tokio::time::timeout(timeout, executor.execute(candidate.scenario, horizon_ms, seed)).await;

                match outcome {
                    Ok(Ok(metrics)) => {
                        store.complete(&candidate.id, metrics.clone()).await;
                        CandidateResult { candidate_id: candidate.id, metrics: Some(metrics), error: None }
                    }
                    Ok(Err(e)) => {
                        store.fail(&candidate.id, e.to_string()).await;
                        CandidateResult { candidate_id: candidate.id, metrics: None, error: Some(e.to_string()) }
                    }
                    Err(_) => {
                        let msg = format!("run timed out after {timeout:?}");
                        store.fail(&candidate.id, msg.clone()).await;
                        CandidateResult { candidate_id: candidate.id, metrics: None, error: Some(msg) }
                    }
                }
            });

            self.active_runs.insert(candidate_id.clone(), join_handle.abort_handle());
            handles.push((candidate_id, join_handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        let ids: Vec<String> = handles.iter().map(|(id, _)| id.clone()).collect();
        let joined = join_all(handles.into_iter().map(|(_, h)| h)).await;

        for (id, outcome) in ids.into_iter().zip(joined) {
            self.active_runs.remove(&id);
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(candidate_id = %id, error = %e, "run task was aborted or panicked");
                    results.push(CandidateResult { candidate_id: id, metrics: None, error: Some(e.to_string()) });
                }
            }
        }

        results
    }

    /// Drives a full hill-climb optimization experiment (spec §6's top-level
    /// `RunExperiment`): runs the optimizer to completion off the async
    /// runtime (each iteration blocks on its own discrete-event run), then
    /// replays every accepted step through this orchestrator's own
    /// `RunStore`/`RunExecutor` so the experiment's history is persisted
    /// the same way `evaluate_configurations_parallel`'s candidates are.
    pub async fn run_experiment(
        &self,
        optimizer: Arc<HillClimbOptimizer>,
        initial_scenario: Scenario,
    ) -> Result<ExperimentResult, crate::SimError> {
        let start = Instant::now();

        let optimized = tokio::task::spawn_blocking(move || optimizer.optimize(initial_scenario))
            .await
            .map_err(|e| crate::SimError::RunFailed(format!("optimizer task panicked: {e}")))??;

        let mut runs = Vec::with_capacity(optimized.history.len());
        let mut best_run_id = String::new();

        for step in &optimized.history {
            let run_id = format!("iter-{}", step.iteration);
            self.store.create(run_id.clone(), step.scenario.clone()).await;
            self.store.mark_running(&run_id).await;

            match self.executor.execute(step.scenario.clone(), self.config.horizon_ms, self.config.seed).await {
                Ok(metrics) => {
                    self.store.complete(&run_id, metrics.clone()).await;
                    if (step.score - optimized.best_score).abs() < f64::EPSILON && best_run_id.is_empty() {
                        best_run_id = run_id.clone();
                    }
                    runs.push(metrics);
                }
                Err(e) => {
                    self.store.fail(&run_id, e.to_string()).await;
                    warn!(run_id = %run_id, error = %e, "run_experiment: replay of an accepted step failed");
                }
            }
        }

        if best_run_id.is_empty() {
            best_run_id = "unknown".to_string();
        }

        info!(
            converged = optimized.converged,
            reason = %optimized.reason,
            runs = runs.len(),
            "optimization experiment finished"
        );

        Ok(ExperimentResult {
            best_config: optimized.best_scenario,
            best_score: optimized.best_score,
            best_run_id,
            runs,
            converged: optimized.converged,
            reason: optimized.reason,
            duration: start.elapsed(),
        })
    }

    /// Aborts every in-flight run and marks it cancelled in the store.
    pub async fn cancel_active_runs(&self) -> usize {
        let ids: Vec<String> = self.active_runs.iter().map(|e| e.key().clone()).collect();
        for id in &ids {
            if let Some((_, handle)) = self.active_runs.remove(id) {
                handle.abort();
                self.store.cancel(id, "cancelled by operator".to_string()).await;
            }
        }
        ids.len()
    }

    pub async fn cleanup_completed_runs(&self) -> usize {
        self.store.cleanup_completed().await
    }
}
